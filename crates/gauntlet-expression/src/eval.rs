//! Evaluation of fully resolved expressions with minijinja.

use minijinja::Environment;
use serde_json::Value;
use tracing::debug;

/// Evaluate an expression that no longer references anything unknown.
///
/// Returns `None` when minijinja cannot evaluate it, in which case the caller
/// keeps the expression as is.
pub(crate) fn evaluate(expression: &str) -> Option<Value> {
  let env = Environment::new();
  let compiled = match env.compile_expression(expression) {
    Ok(compiled) => compiled,
    Err(e) => {
      debug!(expression, error = %e, "expression_not_compiled");
      return None;
    }
  };

  match compiled.eval(minijinja::context! {}) {
    Ok(value) if value.is_undefined() => None,
    Ok(value) => serde_json::to_value(&value).ok(),
    Err(e) => {
      debug!(expression, error = %e, "expression_not_evaluated");
      None
    }
  }
}

/// Render a value as an expression literal.
pub(crate) fn literal(value: &Value) -> String {
  match value {
    Value::Null => "none".to_string(),
    Value::String(s) => serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}")),
    other => other.to_string(),
  }
}

/// Render a value the way it appears once substituted into text.
pub(crate) fn display(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_evaluate_arithmetic() {
    assert_eq!(evaluate("30 + 12"), Some(json!(42)));
    assert_eq!(evaluate("\"a\" ~ \"b\""), Some(json!("ab")));
  }

  #[test]
  fn test_evaluate_filters() {
    assert_eq!(evaluate("\"test\" | upper"), Some(json!("TEST")));
  }

  #[test]
  fn test_evaluate_rejects_invalid() {
    assert_eq!(evaluate("1 +"), None);
  }

  #[test]
  fn test_literal() {
    assert_eq!(literal(&json!(null)), "none");
    assert_eq!(literal(&json!("a \"b\"")), "\"a \\\"b\\\"\"");
    assert_eq!(literal(&json!(1.5)), "1.5");
    assert_eq!(literal(&json!(true)), "true");
  }
}
