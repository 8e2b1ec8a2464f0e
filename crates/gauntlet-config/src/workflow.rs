use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::container::ContainerConfig;
use crate::content::Content;
use crate::execution::{ConcurrencyPolicy, ExecutionSpec, SystemConfig};
use crate::parameter::ParameterSchema;
use crate::pod::{JobConfig, PodConfig};
use crate::service::{IndependentServiceSpec, ServiceSpec};
use crate::step::{IndependentStep, Step, TemplateRef};

/// A complete test workflow definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Workflow {
  pub name: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub namespace: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  pub spec: WorkflowSpec,
}

impl Workflow {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowSpec {
  /// Templates to apply to the whole workflow.
  #[serde(rename = "use", skip_serializing_if = "Vec::is_empty")]
  pub r#use: Vec<TemplateRef>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub config: BTreeMap<String, ParameterSchema>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub container: Option<ContainerConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job: Option<JobConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pod: Option<PodConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub system: Option<SystemConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution: Option<ExecutionSpec>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub concurrency: Option<ConcurrencyPolicy>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub services: BTreeMap<String, ServiceSpec>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub setup: Vec<Step>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<Step>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub after: Vec<Step>,
}

/// A reusable fragment injected into workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Template {
  pub name: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub namespace: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub description: String,
  pub spec: TemplateSpec,
}

impl Template {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }
}

/// Template body. Same shape as [`WorkflowSpec`], except that it cannot pull
/// in other templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateSpec {
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub config: BTreeMap<String, ParameterSchema>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub container: Option<ContainerConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job: Option<JobConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pod: Option<PodConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub system: Option<SystemConfig>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution: Option<ExecutionSpec>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub concurrency: Option<ConcurrencyPolicy>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub services: BTreeMap<String, IndependentServiceSpec>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub setup: Vec<IndependentStep>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<IndependentStep>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub after: Vec<IndependentStep>,
}

impl From<TemplateSpec> for WorkflowSpec {
  fn from(spec: TemplateSpec) -> Self {
    Self {
      r#use: Vec::new(),
      config: spec.config,
      content: spec.content,
      container: spec.container,
      job: spec.job,
      pod: spec.pod,
      system: spec.system,
      execution: spec.execution,
      concurrency: spec.concurrency,
      services: spec
        .services
        .into_iter()
        .map(|(name, service)| (name, ServiceSpec::from(service)))
        .collect(),
      setup: spec.setup.into_iter().map(Step::from).collect(),
      steps: spec.steps.into_iter().map(Step::from).collect(),
      after: spec.after.into_iter().map(Step::from).collect(),
    }
  }
}
