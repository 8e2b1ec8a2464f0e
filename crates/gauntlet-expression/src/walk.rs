//! Simplification of whole definition trees.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ExpressionError;
use crate::machine::Machine;
use crate::template::simplify_str;

/// Simplify every string (and every map key) reachable from `target`.
///
/// The value is walked through its JSON form, so anything serializable can be
/// processed. Errors carry the path of the failing field, e.g.
/// `spec.steps[2].shell`.
pub fn simplify<T>(target: &mut T, machine: &Machine) -> Result<(), ExpressionError>
where
  T: Serialize + DeserializeOwned,
{
  let mut value = serde_json::to_value(&*target)?;
  simplify_value(&mut value, machine, "")?;
  *target = serde_json::from_value(value)?;
  Ok(())
}

/// Simplify a JSON value in place. `location` is the path of `value` itself.
pub fn simplify_value(value: &mut Value, machine: &Machine, location: &str) -> Result<(), ExpressionError> {
  match value {
    Value::String(text) => {
      if text.contains("{{") {
        *text = simplify_str(text, machine, location)?;
      }
    }
    Value::Array(items) => {
      for (index, item) in items.iter_mut().enumerate() {
        simplify_value(item, machine, &format!("{location}[{index}]"))?;
      }
    }
    Value::Object(map) => {
      let entries = std::mem::take(map);
      for (key, mut item) in entries {
        let path = if location.is_empty() {
          key.clone()
        } else {
          format!("{location}.{key}")
        };
        let key = if key.contains("{{") {
          simplify_str(&key, machine, &path)?
        } else {
          key
        };
        simplify_value(&mut item, machine, &path)?;
        map.insert(key, item);
      }
    }
    Value::Null | Value::Bool(_) | Value::Number(_) => {}
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use serde::Deserialize;
  use serde_json::json;

  use super::*;
  use crate::scope::MapScope;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Step {
    name: String,
    shell: Option<String>,
    env: std::collections::BTreeMap<String, String>,
  }

  fn machine() -> Machine {
    Machine::new()
      .with_scope(MapScope::new().value("config.foo", 30).value("config.key", "TOKEN"))
      .require_prefix("config.")
  }

  #[test]
  fn test_simplify_struct() {
    let mut step = Step {
      name: "run {{config.foo}}".to_string(),
      shell: Some("echo {{ env.HOME }}".to_string()),
      env: [("{{config.key}}".to_string(), "{{config.foo}}".to_string())].into(),
    };

    simplify(&mut step, &machine()).unwrap();

    assert_eq!(step.name, "run 30");
    assert_eq!(step.shell.as_deref(), Some("echo {{ env.HOME }}"));
    assert_eq!(step.env["TOKEN"], "30");
  }

  #[test]
  fn test_error_location() {
    let mut value = json!({"spec": {"steps": [{"shell": "ok"}, {"shell": "{{config.nope}}"}]}});
    let err = simplify_value(&mut value, &machine(), "").unwrap_err();
    assert_eq!(
      err.to_string(),
      "spec.steps[1].shell: error while accessing config.nope: unknown variable"
    );
  }

  #[test]
  fn test_non_strings_are_untouched() {
    let mut value = json!({"a": 1, "b": [true, null], "c": "plain"});
    let expected = value.clone();
    simplify_value(&mut value, &machine(), "").unwrap();
    assert_eq!(value, expected);
  }
}
