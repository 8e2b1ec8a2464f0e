use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Execution level metadata attached to every run of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionSpec {
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub tags: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target: Option<ExecutionTarget>,
}

/// Runner selection for an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionTarget {
  #[serde(rename = "match", skip_serializing_if = "BTreeMap::is_empty")]
  pub r#match: BTreeMap<String, Vec<String>>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub not: BTreeMap<String, Vec<String>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub replicate: Vec<String>,
}

/// Limits how many executions of the same group may be active at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConcurrencyPolicy {
  /// Group key, may contain expressions. Defaults to the workflow name.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub group: Option<String>,
  /// Zero or less means unlimited.
  pub max: i32,
  /// When set, the oldest running executions of the group are aborted to
  /// make room instead of rejecting the new one.
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub cancel_in_progress: bool,
}

impl ConcurrencyPolicy {
  pub fn is_limited(&self) -> bool {
    self.max > 0
  }
}

/// Engine level behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pure_by_default: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub isolated_containers: Option<bool>,
}
