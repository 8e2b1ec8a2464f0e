//! Per-execution state built up while a batch is scheduled.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use gauntlet_config::{ConcurrencyPolicy, ConfigValue, TemplateRef, Workflow, display_template_name};
use gauntlet_expression::{FunctionScope, Machine, MapScope, Resolution, simplify, simplify_str};
use gauntlet_resolver::{
  CONFIG_PREFIX, ResolveError, TemplateSet, add_global_template_ref, apply_templates,
  apply_workflow_config, list_templates, simplify_isolated,
};
use gauntlet_store::{ConfigParam, Execution, RunningContext};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SchedulerError;

/// Function standing in for a sensitive value until it is stored.
pub const SENSITIVE_DATA_FN: &str = "sensitiveData";

/// Function referencing a value of a secret object.
pub const SECRET_FN: &str = "secret";

/// A sensitive config value waiting to be moved to a secret object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveValue {
  /// Name of the config parameter the value was provided for.
  pub key: String,
  pub value: String,
}

/// Organization and environment the executions are scheduled in.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentIdentity {
  pub organization_id: String,
  pub organization_slug: String,
  pub environment_id: String,
  pub environment_slug: String,
}

/// State shared by every execution of a batch.
#[derive(Debug, Clone)]
pub struct ExecutionBase {
  execution: Execution,
  tags: BTreeMap<String, String>,
  templates: Vec<String>,
}

impl ExecutionBase {
  pub fn new(scheduled_at: DateTime<Utc>) -> Self {
    let mut execution = Execution {
      group_id: Uuid::now_v7().to_string(),
      scheduled_at,
      status_at: scheduled_at,
      ..Default::default()
    };
    execution.result.queued_at = Some(scheduled_at);
    execution.result.initialization.queued_at = Some(scheduled_at);
    Self {
      execution,
      tags: BTreeMap::new(),
      templates: Vec::new(),
    }
  }

  pub fn group_id(&self) -> &str {
    &self.execution.group_id
  }

  pub fn append_tags(&mut self, tags: &BTreeMap<String, String>) -> &mut Self {
    self
      .tags
      .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    self
  }

  pub fn set_disable_webhooks(&mut self, disabled: bool) -> &mut Self {
    self.execution.disable_webhooks = disabled;
    self
  }

  pub fn set_running_context(&mut self, context: Option<RunningContext>) -> &mut Self {
    self.execution.running_context = context;
    self
  }

  pub fn set_linked_object_name(&mut self, name: Option<String>) -> &mut Self {
    self.execution.linked_object_name = name;
    self
  }

  pub fn set_parent_execution_ids(&mut self, ids: Vec<String>) -> &mut Self {
    self.execution.parent_execution_ids = ids;
    self
  }

  /// Inject a template into every workflow instantiated from this base.
  /// Templates prepended later end up first.
  pub fn prepend_template(&mut self, name: &str) -> &mut Self {
    if !name.is_empty() {
      self.templates.push(name.to_string());
    }
    self
  }

  /// Start a new execution of `workflow` with a fresh id.
  pub fn instantiate(&self, workflow: &Workflow) -> IntermediateExecution {
    let mut execution = self.execution.clone();
    execution.id = Uuid::now_v7().to_string();
    execution.workflow = workflow.clone();

    let mut resolved = workflow.clone();
    for name in &self.templates {
      add_global_template_ref(&mut resolved, &TemplateRef::new(display_template_name(name)));
    }

    IntermediateExecution {
      workflow: resolved,
      dirty: true,
      execution,
      sensitive: BTreeMap::new(),
      tags: self.tags.clone(),
    }
  }
}

/// A single execution while it is being resolved.
///
/// Owns its copy of the workflow, which is mutated by config and template
/// application, and the execution record. Derived fields of the record are
/// recomputed lazily, after the workflow changed.
#[derive(Debug, Clone)]
pub struct IntermediateExecution {
  workflow: Workflow,
  dirty: bool,
  execution: Execution,
  sensitive: BTreeMap<String, SensitiveValue>,
  tags: BTreeMap<String, String>,
}

impl IntermediateExecution {
  pub fn id(&self) -> &str {
    &self.execution.id
  }

  pub fn group_id(&self) -> &str {
    &self.execution.group_id
  }

  /// Set the group id. An empty one makes the execution its own group.
  pub fn set_group_id(&mut self, group_id: &str) -> &mut Self {
    self.execution.group_id = if group_id.is_empty() {
      self.execution.id.clone()
    } else {
      group_id.to_string()
    };
    self
  }

  pub fn name(&self) -> &str {
    &self.execution.name
  }

  pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
    self.execution.name = name.into();
    self
  }

  pub fn workflow_name(&self) -> &str {
    &self.execution.workflow.name
  }

  pub fn sequence_number(&self) -> i32 {
    self.execution.number
  }

  pub fn set_sequence_number(&mut self, number: i32) -> &mut Self {
    self.execution.number = number;
    self
  }

  pub fn append_tags(&mut self, tags: &BTreeMap<String, String>) -> &mut Self {
    self.dirty = true;
    self
      .tags
      .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    self
  }

  pub fn sensitive_data(&self) -> &BTreeMap<String, SensitiveValue> {
    &self.sensitive
  }

  pub fn is_finished(&self) -> bool {
    self.execution.is_finished()
  }

  /// The concurrency policy of the resolved workflow, if it limits anything.
  pub fn concurrency(&self) -> Option<&ConcurrencyPolicy> {
    self
      .workflow
      .spec
      .concurrency
      .as_ref()
      .filter(|policy| policy.is_limited())
  }

  /// Key shared by the executions limited together: the policy's group, or
  /// the workflow name.
  pub fn concurrency_group(&self) -> String {
    self
      .workflow
      .spec
      .concurrency
      .as_ref()
      .and_then(|policy| policy.group.clone())
      .filter(|group| !group.is_empty())
      .unwrap_or_else(|| self.workflow.name.clone())
  }

  pub fn set_concurrency_group(&mut self, group: String) -> &mut Self {
    self.execution.concurrency_group = Some(group);
    self
  }

  /// Record the config values on the execution. Sensitive and undeclared
  /// values are left out.
  pub fn store_config(&mut self, values: &BTreeMap<String, ConfigValue>) -> &mut Self {
    let schema = &self.workflow.spec.config;
    self.execution.config_params = values
      .iter()
      .filter_map(|(key, value)| {
        let parameter = schema.get(key).filter(|parameter| !parameter.sensitive)?;
        Some((
          key.clone(),
          ConfigParam {
            value: value.to_string(),
            default_value: parameter.default.as_ref().map(ToString::to_string),
          },
        ))
      })
      .collect();
    self
  }

  /// Substitute the `config.*` references of the workflow. Sensitive values
  /// are replaced with [`SENSITIVE_DATA_FN`] calls.
  pub fn apply_config(&mut self, values: &BTreeMap<String, ConfigValue>) -> Result<(), SchedulerError> {
    self.dirty = true;
    let mut externalize = externalizer(&mut self.sensitive);
    self.workflow = apply_workflow_config(self.workflow.clone(), values, &mut externalize)?;
    drop(externalize);
    self.simplify_workflow()
  }

  /// Internal names of the templates the workflow still references.
  pub fn template_names(&self) -> BTreeSet<String> {
    list_templates(&self.workflow)
  }

  pub fn apply_templates(&mut self, templates: &TemplateSet) -> Result<(), SchedulerError> {
    self.dirty = true;
    let mut externalize = externalizer(&mut self.sensitive);
    self.workflow = apply_templates(self.workflow.clone(), templates, &mut externalize)?;
    drop(externalize);
    self.simplify_workflow()
  }

  fn workflow_machine(&self) -> Machine {
    let labels: serde_json::Map<String, Value> = self
      .workflow
      .labels
      .iter()
      .map(|(k, v)| (k.clone(), Value::String(v.clone())))
      .collect();
    Machine::new().with_scope(
      MapScope::new()
        .value("workflow.name", self.workflow.name.clone())
        .value("workflow.labels", Value::Object(labels)),
    )
  }

  fn simplify_workflow(&mut self) -> Result<(), SchedulerError> {
    let machine = self.workflow_machine();
    self.simplify_with(&machine)
  }

  fn simplify_with(&mut self, machine: &Machine) -> Result<(), SchedulerError> {
    self.dirty = true;
    simplify(&mut self.workflow, machine)?;
    self.simplify_sensitive(machine)
  }

  fn simplify_sensitive(&mut self, machine: &Machine) -> Result<(), SchedulerError> {
    for (id, sensitive) in self.sensitive.iter_mut() {
      sensitive.value = simplify_str(&sensitive.value, machine, id)?;
    }
    Ok(())
  }

  /// Resolve the identity expressions of the workflow (`workflow.*`,
  /// `resource.*`, `execution.*`, `organization.*`, `environment.*`).
  ///
  /// The execution needs its id, group, name and sequence number first.
  pub fn finalize(&mut self, identity: &EnvironmentIdentity) -> Result<(), SchedulerError> {
    let execution = &self.execution;
    let missing = if execution.id.is_empty() {
      Some("id")
    } else if execution.group_id.is_empty() {
      Some("group id")
    } else if execution.name.is_empty() {
      Some("name")
    } else if execution.number == 0 {
      Some("sequence number")
    } else {
      None
    };
    if let Some(missing) = missing {
      return Err(SchedulerError::NotReady { missing });
    }

    let resource = MapScope::new()
      .value("resource.id", execution.id.clone())
      .value("resource.rootId", execution.id.clone());
    let scope = MapScope::new()
      .value("execution.id", execution.id.clone())
      .value("execution.groupId", execution.group_id.clone())
      .value("execution.name", execution.name.clone())
      .value("execution.number", execution.number)
      .value(
        "execution.scheduledAt",
        execution
          .scheduled_at
          .to_rfc3339_opts(SecondsFormat::Millis, true),
      )
      .value("execution.disableWebhooks", execution.disable_webhooks)
      .value("execution.parentIds", execution.parent_execution_ids.join("/"))
      .value("organization.id", identity.organization_id.clone())
      .value("organization.slug", identity.organization_slug.clone())
      .value("environment.id", identity.environment_id.clone())
      .value("environment.slug", identity.environment_slug.clone());

    let machine = self
      .workflow_machine()
      .with_scope(resource)
      .with_scope(scope);

    // Whatever `config.*` is left by now has no value anywhere.
    self.dirty = true;
    simplify_isolated(&mut self.workflow, &machine.clone().require_prefix(CONFIG_PREFIX))?;
    self.simplify_sensitive(&machine)
  }

  /// Replace every [`SENSITIVE_DATA_FN`] call with the expression registered
  /// for its id.
  pub fn rewrite_sensitive_data(&mut self, replacements: HashMap<String, String>) -> Result<(), SchedulerError> {
    self.dirty = true;
    let machine = Machine::new().with_scope(FunctionScope::new(SENSITIVE_DATA_FN, move |args| {
      let [Value::String(id)] = args else {
        return Err(format!(
          "\"{SENSITIVE_DATA_FN}\" function expects 1 string argument, {} provided",
          args.len()
        ));
      };
      replacements
        .get(id)
        .cloned()
        .map(Resolution::Expression)
        .ok_or_else(|| format!("unknown sensitive data \"{id}\""))
    }));
    simplify(&mut self.workflow, &machine)?;
    Ok(())
  }

  /// Fail the execution, unless it already failed.
  pub fn set_error(&mut self, header: &str, err: &dyn fmt::Display) -> &mut Self {
    if !self.execution.is_finished() {
      let at = Utc::now();
      self.execution.status_at = at;
      self
        .execution
        .result
        .fail_initialization(format!("{header}: {err}"), at);
    }
    self
  }

  fn refresh(&mut self) {
    if !self.dirty {
      return;
    }
    self.dirty = false;

    let mut tags = self
      .workflow
      .spec
      .execution
      .as_ref()
      .map(|execution| execution.tags.clone())
      .unwrap_or_default();
    tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

    self.execution.resolved_workflow = Some(self.workflow.clone());
    self.execution.tags = tags;
  }

  /// The execution record, with derived fields brought up to date.
  pub fn execution(&mut self) -> &Execution {
    self.refresh();
    &self.execution
  }

  pub fn into_execution(mut self) -> Execution {
    self.refresh();
    self.execution
  }
}

/// Records sensitive values under fresh time-ordered ids and hands out
/// [`SENSITIVE_DATA_FN`] calls in their place.
fn externalizer(
  sensitive: &mut BTreeMap<String, SensitiveValue>,
) -> impl FnMut(&str, &str) -> Result<String, ResolveError> + '_ {
  |key, value| {
    let id = Uuid::now_v7().to_string();
    sensitive.insert(
      id.clone(),
      SensitiveValue {
        key: key.to_string(),
        value: value.to_string(),
      },
    );
    Ok(format!("{SENSITIVE_DATA_FN}(\"{id}\")"))
  }
}

#[cfg(test)]
mod tests {
  use gauntlet_config::Template;
  use serde_json::json;

  use super::*;

  fn workflow(value: serde_json::Value) -> Workflow {
    serde_json::from_value(value).unwrap()
  }

  fn base() -> ExecutionBase {
    ExecutionBase::new(Utc::now())
  }

  fn shell(execution: &mut IntermediateExecution, index: usize) -> String {
    execution.execution().resolved_workflow.as_ref().unwrap().spec.steps[index]
      .base
      .operations
      .shell
      .clone()
      .unwrap_or_default()
  }

  #[test]
  fn test_instantiate_gets_fresh_ids() {
    let base = base();
    let wf = Workflow::new("wf");
    let a = base.instantiate(&wf);
    let b = base.instantiate(&wf);

    assert_ne!(a.id(), b.id());
    assert_eq!(a.group_id(), base.group_id());
    assert_eq!(a.workflow_name(), "wf");
  }

  #[test]
  fn test_empty_group_id_falls_back_to_own_id() {
    let mut execution = base().instantiate(&Workflow::new("wf"));
    execution.set_group_id("");
    assert_eq!(execution.group_id(), execution.id().to_string());
  }

  #[test]
  fn test_prepended_templates_are_referenced() {
    let mut base = base();
    base.prepend_template("official--global");
    base.prepend_template("<inline>");
    let execution = base.instantiate(&Workflow::new("wf"));

    let names: Vec<String> = execution.template_names().into_iter().collect();
    assert_eq!(names, vec!["<inline>", "official--global"]);
  }

  #[test]
  fn test_sensitive_value_is_externalized() {
    let wf = workflow(json!({
      "name": "wf",
      "spec": {
        "config": {"password": {"type": "string", "sensitive": true}},
        "steps": [{"shell": "login {{config.password}}"}]
      }
    }));
    let mut execution = base().instantiate(&wf);
    let values = BTreeMap::from([("password".to_string(), ConfigValue::from("hunter2"))]);

    execution.apply_config(&values).unwrap();

    let (id, sensitive) = execution.sensitive_data().iter().next().unwrap();
    let id = id.clone();
    assert_eq!(sensitive.key, "password");
    assert_eq!(sensitive.value, "hunter2");
    assert_eq!(shell(&mut execution, 0), format!("login {{{{sensitiveData(\"{id}\")}}}}"));

    execution
      .rewrite_sensitive_data(HashMap::from([(id, "secret(\"twe-x\", \"password\")".to_string())]))
      .unwrap();
    assert_eq!(shell(&mut execution, 0), "login {{secret(\"twe-x\", \"password\")}}");
  }

  #[test]
  fn test_store_config_skips_sensitive_values() {
    let wf = workflow(json!({
      "name": "wf",
      "spec": {"config": {
        "user": {"type": "string", "default": "admin"},
        "password": {"type": "string", "sensitive": true}
      }}
    }));
    let mut execution = base().instantiate(&wf);
    execution.store_config(&BTreeMap::from([
      ("user".to_string(), ConfigValue::from("root")),
      ("password".to_string(), ConfigValue::from("hunter2")),
      ("unknown".to_string(), ConfigValue::from("x")),
    ]));

    let params = &execution.execution().config_params;
    assert_eq!(params.len(), 1);
    assert_eq!(params["user"].value, "root");
    assert_eq!(params["user"].default_value.as_deref(), Some("admin"));
  }

  #[test]
  fn test_templates_and_tags() {
    let wf = workflow(json!({
      "name": "wf",
      "spec": {"use": [{"name": "tagged"}], "execution": {"tags": {"a": "workflow", "b": "workflow"}}}
    }));
    let tpl: Template = serde_json::from_value(json!({
      "name": "tagged",
      "spec": {"execution": {"tags": {"c": "template"}}, "steps": [{"shell": "echo {{workflow.name}}"}]}
    }))
    .unwrap();

    let mut execution = base().instantiate(&wf);
    execution.append_tags(&BTreeMap::from([("b".to_string(), "request".to_string())]));
    execution
      .apply_templates(&TemplateSet::from([("tagged".to_string(), tpl)]))
      .unwrap();

    assert!(execution.template_names().is_empty());
    assert_eq!(shell(&mut execution, 0), "echo wf");
    let tags = &execution.execution().tags;
    assert_eq!(tags["a"], "workflow");
    assert_eq!(tags["b"], "request");
    assert_eq!(tags["c"], "template");
  }

  #[test]
  fn test_finalize_requires_identity() {
    let mut execution = base().instantiate(&Workflow::new("wf"));
    let err = execution
      .finalize(&EnvironmentIdentity::default())
      .unwrap_err();
    assert!(matches!(err, SchedulerError::NotReady { missing: "name" }));
  }

  #[test]
  fn test_finalize_resolves_identity() {
    let wf = workflow(json!({
      "name": "wf",
      "spec": {"steps": [
        {"shell": "{{execution.name}} #{{execution.number}} in {{environment.slug}}"},
        {"shell": "{{execution.id == resource.rootId}} {{runner.id}}"}
      ]}
    }));
    let mut execution = base().instantiate(&wf);
    execution.set_name("wf-7").set_sequence_number(7);

    execution
      .finalize(&EnvironmentIdentity {
        environment_slug: "prod".to_string(),
        ..Default::default()
      })
      .unwrap();

    assert_eq!(shell(&mut execution, 0), "wf-7 #7 in prod");
    assert_eq!(shell(&mut execution, 1), "true {{runner.id}}");
  }

  #[test]
  fn test_finalize_fails_on_leftover_config() {
    let wf = workflow(json!({
      "name": "wf",
      "spec": {"steps": [{"shell": "echo {{config.x}} in {{execution.name}}"}]}
    }));
    let mut execution = base().instantiate(&wf);
    execution.set_name("wf-1").set_sequence_number(1);

    let err = execution
      .finalize(&EnvironmentIdentity::default())
      .unwrap_err();
    assert!(matches!(
      err,
      SchedulerError::Resolve(ResolveError::ConfigUnresolved { ref key, .. }) if key == "x"
    ));
    assert!(err.to_string().contains("config.x"));
  }

  #[test]
  fn test_finalize_keeps_parallel_own_config() {
    let wf = workflow(json!({
      "name": "wf",
      "spec": {"steps": [{
        "name": "group",
        "parallel": {
          "config": {"inner": {"type": "string"}},
          "steps": [{"shell": "echo {{config.inner}} {{execution.number}}"}]
        }
      }]}
    }));
    let mut execution = base().instantiate(&wf);
    execution.set_name("wf-2").set_sequence_number(2);

    execution
      .finalize(&EnvironmentIdentity::default())
      .unwrap();
    let resolved = execution.execution().resolved_workflow.clone().unwrap();
    let parallel = resolved.spec.steps[0].parallel.as_ref().unwrap();
    assert_eq!(
      parallel.spec.steps[0].base.operations.shell.as_deref(),
      Some("echo {{config.inner}} 2")
    );
  }

  #[test]
  fn test_set_error_keeps_first() {
    let mut execution = base().instantiate(&Workflow::new("wf"));
    execution.set_error("First", &"one");
    execution.set_error("Second", &"two");

    assert!(execution.is_finished());
    assert_eq!(
      execution.execution().result.initialization.error_message.as_deref(),
      Some("First: one")
    );
  }
}
