use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::container::ContainerConfig;
use crate::content::Content;
use crate::parameter::ConfigValue;
use crate::service::{IndependentServiceSpec, ServiceSpec};
use crate::workflow::{TemplateSpec, WorkflowSpec};

/// Reference to a template, with the configuration values to apply to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateRef {
  /// Template name, e.g. "official/k6"
  pub name: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub config: BTreeMap<String, ConfigValue>,
}

impl TemplateRef {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      config: BTreeMap::new(),
    }
  }

  pub fn with_config(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
    self.config.insert(key.into(), value.into());
    self
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
  pub count: i32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub until: Option<String>,
}

/// Flow control flags of a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepControl {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub paused: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub negative: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub optional: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryPolicy>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepRun {
  #[serde(flatten)]
  pub container: ContainerConfig,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
}

/// Triggers other tests or workflows from within a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepExecute {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parallelism: Option<i32>,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub r#async: bool,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub workflows: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepArtifacts {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub working_dir: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub paths: Vec<String>,
}

/// What a step actually does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepOperations {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub delay: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub shell: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub run: Option<StepRun>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execute: Option<StepExecute>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub artifacts: Option<StepArtifacts>,
}

/// Fields shared between workflow steps and template steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepBase {
  #[serde(skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub condition: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pure: Option<bool>,
  #[serde(flatten)]
  pub control: StepControl,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub working_dir: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub container: Option<ContainerConfig>,
  #[serde(flatten)]
  pub operations: StepOperations,
}

/// A step of a workflow. Steps may pull in templates and nest other steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Step {
  #[serde(flatten)]
  pub base: StepBase,
  #[serde(rename = "use", skip_serializing_if = "Vec::is_empty")]
  pub r#use: Vec<TemplateRef>,
  /// Single template injected as an isolated child step.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub template: Option<TemplateRef>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub services: BTreeMap<String, ServiceSpec>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parallel: Option<Box<StepParallel>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub setup: Vec<Step>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<Step>,
}

impl Step {
  pub fn named(name: impl Into<String>) -> Self {
    let mut step = Step::default();
    step.base.name = name.into();
    step
  }

  /// A step that carries nothing but its children.
  pub fn is_wrapper(&self) -> bool {
    self.base == StepBase::default()
      && self.r#use.is_empty()
      && self.template.is_none()
      && self.services.is_empty()
      && self.parallel.is_none()
  }
}

/// A group of steps run side by side within a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepParallel {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parallelism: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub template: Option<TemplateRef>,
  #[serde(flatten)]
  pub control: StepControl,
  #[serde(flatten)]
  pub operations: StepOperations,
  #[serde(flatten)]
  pub spec: WorkflowSpec,
}

/// A step as it appears in a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndependentStep {
  #[serde(flatten)]
  pub base: StepBase,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub services: BTreeMap<String, IndependentServiceSpec>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parallel: Option<Box<IndependentParallel>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub setup: Vec<IndependentStep>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub steps: Vec<IndependentStep>,
}

/// A parallel group as it appears in a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndependentParallel {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parallelism: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count: Option<String>,
  #[serde(flatten)]
  pub control: StepControl,
  #[serde(flatten)]
  pub operations: StepOperations,
  #[serde(flatten)]
  pub spec: TemplateSpec,
}

impl From<IndependentStep> for Step {
  fn from(step: IndependentStep) -> Self {
    Self {
      base: step.base,
      r#use: Vec::new(),
      template: None,
      services: step
        .services
        .into_iter()
        .map(|(name, service)| (name, ServiceSpec::from(service)))
        .collect(),
      parallel: step.parallel.map(|parallel| Box::new(StepParallel::from(*parallel))),
      setup: step.setup.into_iter().map(Step::from).collect(),
      steps: step.steps.into_iter().map(Step::from).collect(),
    }
  }
}

impl From<IndependentParallel> for StepParallel {
  fn from(parallel: IndependentParallel) -> Self {
    Self {
      parallelism: parallel.parallelism,
      count: parallel.count,
      template: None,
      control: parallel.control,
      operations: parallel.operations,
      spec: WorkflowSpec::from(parallel.spec),
    }
  }
}
