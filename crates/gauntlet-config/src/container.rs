use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Container settings shared by workflows, templates, services and steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub working_dir: Option<String>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub image: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub image_pull_policy: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub env: Vec<EnvVar>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub env_from: Vec<EnvFromSource>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub command: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub args: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resources: Option<Resources>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub security_context: Option<SecurityContext>,
}

impl ContainerConfig {
  pub fn is_empty(&self) -> bool {
    *self == ContainerConfig::default()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvVar {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<String>,
}

impl EnvVar {
  pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      value: Some(value.into()),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvFromSource {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prefix: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub config_map: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resources {
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub limits: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub requests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityContext {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub run_as_user: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub run_as_group: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub privileged: Option<bool>,
}
