use std::fmt;

use serde::{Deserialize, Serialize};

/// The declared type of a configuration parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
  #[default]
  String,
  Integer,
  Number,
  Boolean,
}

impl fmt::Display for ParameterType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ParameterType::String => "string",
      ParameterType::Integer => "integer",
      ParameterType::Number => "number",
      ParameterType::Boolean => "boolean",
    };
    f.write_str(name)
  }
}

/// Declaration of a single configuration parameter accepted by a workflow or
/// template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParameterSchema {
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(rename = "type")]
  pub kind: ParameterType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default: Option<ConfigValue>,
  /// Sensitive values never end up in the stored definition; they are
  /// replaced with a placeholder and persisted separately.
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub sensitive: bool,
}

/// A configuration value, either a plain integer or a string.
///
/// Strings may themselves contain `{{ }}` expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
  Int(i64),
  String(String),
}

impl ConfigValue {
  pub fn is_expression(&self) -> bool {
    matches!(self, ConfigValue::String(s) if s.contains("{{"))
  }
}

impl Default for ConfigValue {
  fn default() -> Self {
    ConfigValue::String(String::new())
  }
}

impl fmt::Display for ConfigValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigValue::Int(i) => write!(f, "{i}"),
      ConfigValue::String(s) => f.write_str(s),
    }
  }
}

impl From<&str> for ConfigValue {
  fn from(value: &str) -> Self {
    ConfigValue::String(value.to_string())
  }
}

impl From<String> for ConfigValue {
  fn from(value: String) -> Self {
    ConfigValue::String(value)
  }
}

impl From<i64> for ConfigValue {
  fn from(value: i64) -> Self {
    ConfigValue::Int(value)
  }
}
