use std::collections::BTreeMap;

use serde_json::Value;

use crate::machine::{Resolution, Scope};

/// A fixed set of named values and expressions.
///
/// A reference that is not known by its full name is looked up through its
/// longest known prefix, e.g. `execution.tags.env` is served from an
/// `execution.tags` object.
#[derive(Debug, Clone, Default)]
pub struct MapScope {
  entries: BTreeMap<String, Resolution>,
}

impl MapScope {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert(name, Resolution::value(value));
    self
  }

  pub fn expression(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
    self.insert(name, Resolution::expression(expression));
    self
  }

  pub fn insert(&mut self, name: impl Into<String>, resolution: Resolution) {
    self.entries.insert(name.into(), resolution);
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl Scope for MapScope {
  fn resolve(&self, name: &str) -> Option<Resolution> {
    if let Some(resolution) = self.entries.get(name) {
      return Some(resolution.clone());
    }

    let mut end = name.len();
    while let Some(dot) = name[..end].rfind('.') {
      end = dot;
      if let Some(Resolution::Value(value)) = self.entries.get(&name[..end]) {
        return name[end + 1..]
          .split('.')
          .try_fold(value, |value, key| value.get(key))
          .cloned()
          .map(Resolution::Value);
      }
    }
    None
  }
}

/// Moves every reference under one prefix to another one, leaving it
/// unresolved, e.g. `config.foo` -> `_abc.foo`.
#[derive(Debug, Clone)]
pub struct RenamePrefixScope {
  from: String,
  to: String,
}

impl RenamePrefixScope {
  pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      to: to.into(),
    }
  }
}

impl Scope for RenamePrefixScope {
  fn resolve(&self, name: &str) -> Option<Resolution> {
    name
      .strip_prefix(self.from.as_str())
      .map(|rest| Resolution::Expression(format!("{}{}", self.to, rest)))
  }
}

type Function = dyn Fn(&[Value]) -> Result<Resolution, String> + Send + Sync;

/// Provides a single function callable with literal arguments.
pub struct FunctionScope {
  name: String,
  function: Box<Function>,
}

impl FunctionScope {
  pub fn new(
    name: impl Into<String>,
    function: impl Fn(&[Value]) -> Result<Resolution, String> + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      function: Box::new(function),
    }
  }
}

impl Scope for FunctionScope {
  fn resolve(&self, _name: &str) -> Option<Resolution> {
    None
  }

  fn call(&self, name: &str, args: &[Value]) -> Option<Result<Resolution, String>> {
    (name == self.name).then(|| (self.function)(args))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_map_scope_nested_lookup() {
    let scope = MapScope::new().value("execution.tags", json!({"env": "prod"}));

    assert_eq!(
      scope.resolve("execution.tags.env"),
      Some(Resolution::value("prod"))
    );
    assert_eq!(scope.resolve("execution.tags.missing"), None);
    assert_eq!(scope.resolve("execution.id"), None);
  }

  #[test]
  fn test_rename_prefix() {
    let scope = RenamePrefixScope::new("config.", "_abc.");
    assert_eq!(
      scope.resolve("config.foo"),
      Some(Resolution::expression("_abc.foo"))
    );
    assert_eq!(scope.resolve("env.foo"), None);
  }

  #[test]
  fn test_function_scope() {
    let scope = FunctionScope::new("double", |args| match args {
      [Value::Number(n)] => Ok(Resolution::value(n.as_i64().unwrap_or_default() * 2)),
      _ => Err("expected one number".to_string()),
    });

    assert_eq!(
      scope.call("double", &[json!(4)]),
      Some(Ok(Resolution::value(8)))
    );
    assert!(matches!(scope.call("double", &[]), Some(Err(_))));
    assert_eq!(scope.call("triple", &[json!(4)]), None);
  }
}
