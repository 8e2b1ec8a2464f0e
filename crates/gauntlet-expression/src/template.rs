//! Scanning and partial evaluation of `{{ }}` blocks within strings.

use std::ops::Range;

use serde_json::Value;

use crate::error::ExpressionError;
use crate::eval::{display, evaluate, literal};
use crate::machine::{Machine, Resolution};

const KEYWORDS: &[&str] = &[
  "true", "false", "True", "False", "none", "None", "null", "and", "or", "not", "in", "is", "if",
  "else",
];

/// Simplify every `{{ }}` block of `text` against `machine`.
///
/// `location` names the value being processed and only appears in errors.
/// Text inserted by a substitution is never scanned again within the same
/// call. Expressions handed out by the machine are simplified against it
/// before they are inserted.
pub fn simplify_str(text: &str, machine: &Machine, location: &str) -> Result<String, ExpressionError> {
  if !text.contains("{{") {
    return Ok(text.to_string());
  }

  let mut out = String::with_capacity(text.len());
  let mut cursor = 0;
  for block in find_blocks(text) {
    out.push_str(&text[cursor..block.start]);
    match simplify_block(&text[block.inner.clone()], machine, location, 0)? {
      Some(Simplified::Value(value)) => out.push_str(&display(&value)),
      Some(Simplified::Expression(inner)) => {
        out.push_str("{{");
        out.push_str(&inner);
        out.push_str("}}");
      }
      None => out.push_str(&text[block.start..block.end]),
    }
    cursor = block.end;
  }
  out.push_str(&text[cursor..]);
  Ok(out)
}

/// The expression form of a template string, e.g. `"http://" ~ host` for
/// `http://{{host}}`.
///
/// A template made of a single block gives that block's body, so the value
/// keeps its type once evaluated. Text without blocks becomes a string
/// literal.
pub fn template_expression(text: &str) -> String {
  let blocks = find_blocks(text);
  if let [block] = blocks.as_slice()
    && block.start == 0
    && block.end == text.len()
  {
    return text[block.inner.clone()].trim().to_string();
  }

  let mut parts = Vec::with_capacity(blocks.len() * 2 + 1);
  let mut cursor = 0;
  for block in &blocks {
    if block.start > cursor {
      parts.push(literal(&Value::String(text[cursor..block.start].to_string())));
    }
    parts.push(wrap(&text[block.inner.clone()]));
    cursor = block.end;
  }
  if cursor < text.len() || parts.is_empty() {
    parts.push(literal(&Value::String(text[cursor..].to_string())));
  }
  parts.join(" ~ ")
}

/// Scope expressions referring to further expressions are followed at most
/// this deep.
const MAX_DEPTH: usize = 32;

enum Simplified {
  /// The block is gone, replaced by its value.
  Value(Value),
  /// The block stays, with a new body.
  Expression(String),
}

#[derive(Debug)]
struct Block {
  start: usize,
  inner: Range<usize>,
  end: usize,
}

/// Locate `{{ ... }}` blocks, ignoring braces inside string literals. An
/// unterminated block is treated as plain text.
fn find_blocks(text: &str) -> Vec<Block> {
  let bytes = text.as_bytes();
  let mut blocks = Vec::new();
  let mut i = 0;

  while i + 1 < bytes.len() {
    if bytes[i] != b'{' || bytes[i + 1] != b'{' {
      i += 1;
      continue;
    }

    let inner_start = i + 2;
    let mut j = inner_start;
    let mut quote = None;
    let mut close = None;
    while j < bytes.len() {
      let c = bytes[j];
      if let Some(q) = quote {
        if c == b'\\' {
          j += 2;
          continue;
        }
        if c == q {
          quote = None;
        }
      } else if c == b'"' || c == b'\'' {
        quote = Some(c);
      } else if c == b'}' && bytes.get(j + 1) == Some(&b'}') {
        close = Some(j);
        break;
      }
      j += 1;
    }

    let Some(close) = close else {
      break;
    };
    blocks.push(Block {
      start: i,
      inner: inner_start..close,
      end: close + 2,
    });
    i = close + 2;
  }

  blocks
}

#[derive(Debug, Clone, PartialEq)]
struct Reference {
  range: Range<usize>,
  name: String,
  call: bool,
}

fn skip_string(bytes: &[u8], mut i: usize) -> usize {
  let quote = bytes[i];
  i += 1;
  while i < bytes.len() {
    match bytes[i] {
      b'\\' => i += 2,
      c if c == quote => return i + 1,
      _ => i += 1,
    }
  }
  bytes.len()
}

/// Collect the variable and function references of an expression body.
///
/// Attribute accesses (`x().attr`), filter names (`| upper`), test names
/// (`is defined`), keywords and numbers are not references.
fn references(expression: &str) -> Vec<Reference> {
  let bytes = expression.as_bytes();
  let mut refs = Vec::new();
  let mut previous: Option<u8> = None;
  let mut after_is = false;
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];

    if c == b'"' || c == b'\'' {
      i = skip_string(bytes, i);
      previous = Some(c);
      continue;
    }

    if c.is_ascii_digit() {
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_') {
        i += 1;
      }
      previous = Some(b'0');
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.') {
        i += 1;
      }
      let mut end = i;
      while end > start && bytes[end - 1] == b'.' {
        end -= 1;
      }
      let name = &expression[start..end];

      let mut next = end;
      while next < bytes.len() && bytes[next].is_ascii_whitespace() {
        next += 1;
      }
      let call = bytes.get(next) == Some(&b'(');

      let keyword = KEYWORDS.contains(&name);
      let skipped = matches!(previous, Some(b'.') | Some(b'|')) || (after_is && !keyword);
      if !keyword && !skipped {
        refs.push(Reference {
          range: start..end,
          name: name.to_string(),
          call,
        });
      }
      if name == "is" {
        after_is = true;
      } else if !keyword {
        after_is = false;
      }
      previous = Some(b'a');
      continue;
    }

    if !c.is_ascii_whitespace() {
      previous = Some(c);
    }
    i += 1;
  }

  refs
}

/// Parse the literal argument list of a call, starting at the opening
/// parenthesis. Returns the arguments and the position right after the
/// closing parenthesis.
fn call_arguments(expression: &str, open: usize) -> Option<(Vec<Value>, usize)> {
  let bytes = expression.as_bytes();
  if bytes.get(open) != Some(&b'(') {
    return None;
  }

  let mut args = Vec::new();
  let mut i = open + 1;
  loop {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
      i += 1;
    }
    match bytes.get(i)? {
      b')' if args.is_empty() => return Some((args, i + 1)),
      b'"' | b'\'' => {
        let end = skip_string(bytes, i);
        args.push(string_literal(&expression[i..end])?);
        i = end;
      }
      _ => {
        let start = i;
        while i < bytes.len() && !matches!(bytes[i], b',' | b')') && !bytes[i].is_ascii_whitespace() {
          i += 1;
        }
        args.push(scalar_literal(&expression[start..i])?);
      }
    }

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
      i += 1;
    }
    match bytes.get(i)? {
      b',' => i += 1,
      b')' => return Some((args, i + 1)),
      _ => return None,
    }
  }
}

fn string_literal(raw: &str) -> Option<Value> {
  if raw.len() < 2 {
    return None;
  }
  let body = &raw[1..raw.len() - 1];
  if raw.starts_with('"') {
    return serde_json::from_str::<String>(raw).ok().map(Value::String);
  }
  let mut out = String::with_capacity(body.len());
  let mut chars = body.chars();
  while let Some(c) = chars.next() {
    if c == '\\' {
      out.push(chars.next()?);
    } else {
      out.push(c);
    }
  }
  Some(Value::String(out))
}

fn scalar_literal(raw: &str) -> Option<Value> {
  match raw {
    "true" | "True" => Some(Value::Bool(true)),
    "false" | "False" => Some(Value::Bool(false)),
    "none" | "None" | "null" => Some(Value::Null),
    _ => serde_json::from_str::<serde_json::Number>(raw).ok().map(Value::Number),
  }
}

/// Resolution of a single reference within a block.
enum Outcome {
  Unknown,
  Value(Value),
  Expression(String),
}

fn simplify_block(
  inner: &str,
  machine: &Machine,
  location: &str,
  depth: usize,
) -> Result<Option<Simplified>, ExpressionError> {
  let refs = references(inner);
  let mut outcomes: Vec<(Range<usize>, Outcome)> = Vec::with_capacity(refs.len());

  for reference in &refs {
    if reference.call {
      let open = inner[reference.range.end..]
        .find('(')
        .map(|offset| reference.range.end + offset);
      let Some((args, end)) = open.and_then(|open| call_arguments(inner, open)) else {
        outcomes.push((reference.range.clone(), Outcome::Unknown));
        continue;
      };
      let range = reference.range.start..end;
      let outcome = match machine.call(&reference.name, &args) {
        Some(Ok(resolution)) => follow(resolution, &reference.name, machine, location, depth)?,
        Some(Err(message)) => {
          return Err(ExpressionError::Function {
            name: reference.name.clone(),
            location: location.to_string(),
            message,
          });
        }
        None => Outcome::Unknown,
      };
      outcomes.push((range, outcome));
      continue;
    }

    let outcome = match machine.resolve(&reference.name) {
      Some(resolution) => follow(resolution, &reference.name, machine, location, depth)?,
      None if machine.is_required(&reference.name) => {
        return Err(ExpressionError::Unresolved {
          name: reference.name.clone(),
          location: location.to_string(),
        });
      }
      None => Outcome::Unknown,
    };
    outcomes.push((reference.range.clone(), outcome));
  }

  if outcomes.iter().all(|(_, outcome)| matches!(outcome, Outcome::Unknown)) {
    return Ok(None);
  }

  let leading = inner.len() - inner.trim_start().len();
  let trailing = inner.trim_end().len();

  // A block that is nothing but a single reference.
  if let [(range, outcome)] = outcomes.as_slice()
    && range.start == leading
    && range.end == trailing
  {
    return Ok(Some(match outcome {
      Outcome::Value(value) => Simplified::Value(value.clone()),
      Outcome::Expression(expression) => Simplified::Expression(format!(
        "{}{}{}",
        &inner[..leading],
        expression,
        &inner[trailing..]
      )),
      Outcome::Unknown => return Ok(None),
    }));
  }

  let mut body = inner.to_string();
  let mut resolved = true;
  for (range, outcome) in outcomes.iter().rev() {
    match outcome {
      Outcome::Value(value) => body.replace_range(range.clone(), &literal(value)),
      Outcome::Expression(expression) => {
        resolved = false;
        body.replace_range(range.clone(), &wrap(expression));
      }
      Outcome::Unknown => resolved = false,
    }
  }

  if resolved && let Some(value) = evaluate(&body) {
    return Ok(Some(Simplified::Value(value)));
  }
  Ok(Some(Simplified::Expression(body)))
}

/// Simplify an expression handed out for `name` against the same machine.
/// An expression without references is evaluated right away.
fn follow(
  resolution: Resolution,
  name: &str,
  machine: &Machine,
  location: &str,
  depth: usize,
) -> Result<Outcome, ExpressionError> {
  let expression = match resolution {
    Resolution::Value(value) => return Ok(Outcome::Value(value)),
    Resolution::Expression(expression) => expression,
  };
  if depth >= MAX_DEPTH {
    return Err(ExpressionError::Recursion {
      name: name.to_string(),
      location: location.to_string(),
    });
  }

  Ok(match simplify_block(&expression, machine, location, depth + 1)? {
    Some(Simplified::Value(value)) => Outcome::Value(value),
    Some(Simplified::Expression(body)) => Outcome::Expression(body.trim().to_string()),
    None if references(&expression).is_empty() => match evaluate(&expression) {
      Some(value) => Outcome::Value(value),
      None => Outcome::Expression(expression),
    },
    None => Outcome::Expression(expression),
  })
}

/// Parenthesize an expression unless it is a plain reference or a call.
fn wrap(expression: &str) -> String {
  let trimmed = expression.trim();
  let plain = !trimmed.is_empty()
    && trimmed
      .bytes()
      .all(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.');
  let call = references(trimmed).first().is_some_and(|reference| {
    reference.call
      && reference.range.start == 0
      && trimmed[reference.range.end..]
        .find('(')
        .and_then(|offset| call_arguments(trimmed, reference.range.end + offset))
        .is_some_and(|(_, end)| end == trimmed.len())
  });

  if plain || call {
    trimmed.to_string()
  } else {
    format!("({trimmed})")
  }
}
