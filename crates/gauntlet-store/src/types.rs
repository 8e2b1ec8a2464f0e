use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gauntlet_config::Workflow;
use serde::{Deserialize, Serialize};

/// Status of an execution, or of one of its phases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  #[default]
  Queued,
  Running,
  Paused,
  Passed,
  Failed,
  Aborted,
}

impl ExecutionStatus {
  pub fn is_finished(self) -> bool {
    matches!(
      self,
      ExecutionStatus::Passed | ExecutionStatus::Failed | ExecutionStatus::Aborted
    )
  }
}

/// Result of the initialization phase, where scheduling errors end up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepResult {
  pub status: ExecutionStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub queued_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionResult {
  pub status: ExecutionStatus,
  pub predicted_status: ExecutionStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub queued_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub finished_at: Option<DateTime<Utc>>,
  /// Time between start and finish, in milliseconds.
  pub duration_ms: i64,
  /// Time between queueing and finish, in milliseconds.
  pub total_duration_ms: i64,
  pub initialization: StepResult,
}

impl Default for ExecutionResult {
  fn default() -> Self {
    Self {
      status: ExecutionStatus::Queued,
      predicted_status: ExecutionStatus::Passed,
      queued_at: None,
      started_at: None,
      finished_at: None,
      duration_ms: 0,
      total_duration_ms: 0,
      initialization: StepResult::default(),
    }
  }
}

impl ExecutionResult {
  pub fn is_finished(&self) -> bool {
    self.status.is_finished()
  }

  /// Mark the execution as failed before it ever started.
  pub fn fail_initialization(&mut self, message: String, at: DateTime<Utc>) {
    self.status = ExecutionStatus::Failed;
    self.predicted_status = ExecutionStatus::Failed;
    self.initialization.status = ExecutionStatus::Failed;
    self.initialization.error_message = Some(message);
    self.initialization.finished_at = Some(at);
    self.finish(at);
  }

  /// Mark the execution as aborted.
  pub fn abort(&mut self, at: DateTime<Utc>) {
    self.status = ExecutionStatus::Aborted;
    self.predicted_status = ExecutionStatus::Aborted;
    if !self.initialization.status.is_finished() {
      self.initialization.status = ExecutionStatus::Aborted;
      self.initialization.finished_at = Some(at);
    }
    self.finish(at);
  }

  fn finish(&mut self, at: DateTime<Utc>) {
    self.finished_at = Some(at);
    if let Some(started) = self.started_at {
      self.duration_ms = (at - started).num_milliseconds().max(0);
    }
    if let Some(queued) = self.queued_at {
      self.total_duration_ms = (at - queued).num_milliseconds().max(0);
    }
  }
}

/// A config value as recorded on the execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigParam {
  pub value: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_value: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
  Cli,
  Ui,
  Cicd,
  #[default]
  Internal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
  #[default]
  User,
  Cron,
  Trigger,
  /// A linked external object.
  Object,
  /// Another execution.
  Execution,
}

/// Who asked for the execution, and through which interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunningContext {
  pub interface: InterfaceKind,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub interface_name: String,
  pub actor: ActorKind,
  /// Execution that spawned this one.
  #[serde(skip_serializing_if = "String::is_empty")]
  pub execution_id: String,
  /// Ids of every ancestor execution, joined by `/`.
  #[serde(skip_serializing_if = "String::is_empty")]
  pub execution_path: String,
}

/// An execution record as persisted and handed to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Execution {
  pub id: String,
  pub group_id: String,
  pub name: String,
  pub number: i32,
  pub scheduled_at: DateTime<Utc>,
  pub status_at: DateTime<Utc>,
  /// The workflow as it was stored.
  pub workflow: Workflow,
  /// The workflow with templates, config and identity substituted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub resolved_workflow: Option<Workflow>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub tags: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub config_params: BTreeMap<String, ConfigParam>,
  pub disable_webhooks: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub running_context: Option<RunningContext>,
  /// Name of the external object this execution is tied to.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub linked_object_name: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub parent_execution_ids: Vec<String>,
  /// Key shared by executions limited by the same concurrency policy.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub concurrency_group: Option<String>,
  pub result: ExecutionResult,
}

impl Execution {
  pub fn is_finished(&self) -> bool {
    self.result.is_finished()
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  #[test]
  fn test_new_result_is_queued() {
    let result = ExecutionResult::default();
    assert_eq!(result.status, ExecutionStatus::Queued);
    assert_eq!(result.predicted_status, ExecutionStatus::Passed);
    assert!(!result.is_finished());
  }

  #[test]
  fn test_fail_initialization() {
    let queued = Utc::now();
    let mut result = ExecutionResult {
      queued_at: Some(queued),
      ..Default::default()
    };

    result.fail_initialization("boom".to_string(), queued + Duration::milliseconds(250));

    assert!(result.is_finished());
    assert_eq!(result.predicted_status, ExecutionStatus::Failed);
    assert_eq!(result.initialization.status, ExecutionStatus::Failed);
    assert_eq!(result.initialization.error_message.as_deref(), Some("boom"));
    assert_eq!(result.total_duration_ms, 250);
    assert_eq!(result.duration_ms, 0);
  }

  #[test]
  fn test_abort_keeps_initialization_error() {
    let now = Utc::now();
    let mut result = ExecutionResult::default();
    result.fail_initialization("first".to_string(), now);
    result.abort(now);

    assert_eq!(result.status, ExecutionStatus::Aborted);
    assert_eq!(result.initialization.status, ExecutionStatus::Failed);
  }

  #[test]
  fn test_status_serialization() {
    let json = serde_json::to_string(&ExecutionStatus::Queued).unwrap();
    assert_eq!(json, "\"queued\"");
  }
}
