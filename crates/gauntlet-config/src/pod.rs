use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Pod level settings for the execution environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodConfig {
  #[serde(skip_serializing_if = "String::is_empty")]
  pub service_account_name: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub image_pull_secrets: Vec<String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub node_selector: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub annotations: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub volumes: Vec<String>,
}

/// Job level settings for the execution environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobConfig {
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub annotations: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub active_deadline_seconds: Option<i64>,
}
