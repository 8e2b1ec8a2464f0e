use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::container::ContainerConfig;
use crate::content::Content;
use crate::pod::PodConfig;
use crate::step::TemplateRef;

/// A background service started alongside a step, as it appears in a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndependentServiceSpec {
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pod: Option<PodConfig>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub matrix: BTreeMap<String, String>,
  #[serde(flatten)]
  pub container: ContainerConfig,
}

/// A service as it appears in a workflow; it may pull in templates itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceSpec {
  #[serde(rename = "use", skip_serializing_if = "Vec::is_empty")]
  pub r#use: Vec<TemplateRef>,
  #[serde(flatten)]
  pub base: IndependentServiceSpec,
}

impl From<IndependentServiceSpec> for ServiceSpec {
  fn from(base: IndependentServiceSpec) -> Self {
    Self {
      r#use: Vec::new(),
      base,
    }
  }
}
