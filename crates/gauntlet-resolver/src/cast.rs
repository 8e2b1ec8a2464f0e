//! Casting of config values to their declared parameter types.

use gauntlet_config::{ConfigValue, ParameterType};
use serde_json::Value;

use crate::error::ResolveError;

/// Cast a config value to the JSON value its parameter type describes.
pub fn cast_config_value(
  key: &str,
  value: &ConfigValue,
  kind: ParameterType,
) -> Result<Value, ResolveError> {
  let cast_error = || ResolveError::ConfigCast {
    key: key.to_string(),
    value: value.to_string(),
    kind,
  };

  match (kind, value) {
    (ParameterType::String, value) => Ok(Value::String(value.to_string())),

    (ParameterType::Integer, ConfigValue::Int(i)) => Ok(Value::Number((*i).into())),
    (ParameterType::Integer, ConfigValue::String(s)) => s
      .trim()
      .parse::<i64>()
      .map(|n| Value::Number(n.into()))
      .map_err(|_| cast_error()),

    (ParameterType::Number, ConfigValue::Int(i)) => Ok(Value::Number((*i).into())),
    (ParameterType::Number, ConfigValue::String(s)) => s
      .trim()
      .parse::<f64>()
      .ok()
      .and_then(serde_json::Number::from_f64)
      .map(Value::Number)
      .ok_or_else(cast_error),

    (ParameterType::Boolean, ConfigValue::String(s)) => match s.trim().to_lowercase().as_str() {
      "true" => Ok(Value::Bool(true)),
      "false" => Ok(Value::Bool(false)),
      _ => Err(cast_error()),
    },
    (ParameterType::Boolean, ConfigValue::Int(_)) => Err(cast_error()),
  }
}
