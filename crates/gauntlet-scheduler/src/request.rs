//! Inbound schedule requests.

use std::collections::BTreeMap;

use gauntlet_config::{ConfigValue, Workflow};
use gauntlet_store::{ActorKind, InterfaceKind, RunningContext};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Picks workflows either by name or by labels, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceSelector {
  #[serde(skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,
}

impl ResourceSelector {
  pub fn name(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      labels: BTreeMap::new(),
    }
  }

  pub fn labels<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
  where
    K: Into<String>,
    V: Into<String>,
  {
    Self {
      name: String::new(),
      labels: labels
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    }
  }
}

/// One selector of a batch, with its own config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleExecution {
  pub selector: ResourceSelector,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub config: BTreeMap<String, ConfigValue>,
  /// Static execution name; generated when empty.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution_name: Option<String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub tags: BTreeMap<String, String>,
}

impl ScheduleExecution {
  pub fn new(selector: ResourceSelector) -> Self {
    Self {
      selector,
      ..Default::default()
    }
  }
}

/// Where the request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOrigin {
  Ui,
  Cli,
  Cicd,
  Cron,
  Trigger,
  /// A linked external object.
  Object,
  /// Another execution, listed last in the parent chain.
  Execution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
  pub origin: RequestOrigin,
  #[serde(default)]
  pub name: String,
}

/// A batch of executions to schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleRequest {
  pub executions: Vec<ScheduleExecution>,
  /// Tags applied to every execution of the batch.
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub tags: BTreeMap<String, String>,
  pub disable_webhooks: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub context: Option<RequestContext>,
  /// Ids of the executions that led to this request, outermost first.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub parent_execution_ids: Vec<String>,
  /// Name of the external object tied to the execution.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub linked_object_name: Option<String>,
  /// Workflow already resolved by the caller, used as is.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resolved_workflow: Option<Workflow>,
}

/// Check the selectors and the single-workflow constraints of a request.
pub fn validate_request(request: &ScheduleRequest) -> Result<(), SchedulerError> {
  let mut names = 0;
  let mut labels = 0;
  for (i, execution) in request.executions.iter().enumerate() {
    let selector = &execution.selector;
    match (selector.name.is_empty(), selector.labels.is_empty()) {
      (false, false) => {
        return Err(SchedulerError::InvalidSelector {
          message: format!("executions[{i}]: either name or labels can be used, not both"),
        });
      }
      (true, true) => {
        return Err(SchedulerError::InvalidSelector {
          message: format!("executions[{i}]: either name or labels must be provided"),
        });
      }
      (false, true) => names += 1,
      (true, false) => labels += 1,
    }
  }

  let single = (names, labels) == (1, 0);
  if request.linked_object_name.is_some() && !single {
    return Err(SchedulerError::InvalidRequest {
      message: "linked object can trigger only execution of a single named workflow".to_string(),
    });
  }
  if request.resolved_workflow.is_some() && !single {
    return Err(SchedulerError::InvalidRequest {
      message: "resolved workflow can be scheduled only for a single named workflow".to_string(),
    });
  }
  Ok(())
}

/// Running context recorded on every execution of the request.
pub fn running_context(request: &ScheduleRequest) -> Option<RunningContext> {
  let context = request.context.as_ref()?;
  let (interface, actor) = match context.origin {
    RequestOrigin::Ui => (InterfaceKind::Ui, ActorKind::User),
    RequestOrigin::Cli => (InterfaceKind::Cli, ActorKind::User),
    RequestOrigin::Cicd => (InterfaceKind::Cicd, ActorKind::User),
    RequestOrigin::Cron => (InterfaceKind::Internal, ActorKind::Cron),
    RequestOrigin::Trigger => (InterfaceKind::Internal, ActorKind::Trigger),
    RequestOrigin::Object => (InterfaceKind::Internal, ActorKind::Object),
    RequestOrigin::Execution => {
      let parent = request.parent_execution_ids.last()?;
      return Some(RunningContext {
        interface: InterfaceKind::Internal,
        interface_name: parent.clone(),
        actor: ActorKind::Execution,
        execution_id: parent.clone(),
        execution_path: request.parent_execution_ids.join("/"),
      });
    }
  };
  Some(RunningContext {
    interface,
    interface_name: context.name.clone(),
    actor,
    ..Default::default()
  })
}
