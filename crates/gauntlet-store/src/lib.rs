//! Gauntlet Store
//!
//! This crate provides the execution record types and the storage traits the
//! scheduler talks to. Backends live elsewhere; [`memory`] holds in-memory
//! implementations of every trait.
//!
//! The traits cover:
//! - Reading workflow and template definitions
//! - Inserting, updating and querying execution records
//! - Saving execution logs
//! - Creating and deleting secret objects

pub mod memory;
mod secret;
mod types;

pub use secret::{DEFAULT_MAX_OBJECT_SIZE, SecretBatch, SecretObject, SecretRef};
pub use types::{
  ActorKind, ConfigParam, Execution, ExecutionResult, ExecutionStatus, InterfaceKind,
  RunningContext, StepResult,
};

use std::collections::BTreeMap;

use async_trait::async_trait;
use gauntlet_config::{Template, Workflow};
use tracing::warn;

/// Error type for storage operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record with the same identity already exists.
  #[error("already exists: {0}")]
  Conflict(String),

  /// The backend failed to process the request.
  #[error("backend error: {0}")]
  Backend(String),
}

/// Read access to workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
  /// Get a workflow by name.
  async fn get(&self, environment_id: &str, name: &str) -> Result<Workflow, StoreError>;

  /// List workflows carrying every given label.
  async fn list(
    &self,
    environment_id: &str,
    labels: &BTreeMap<String, String>,
  ) -> Result<Vec<Workflow>, StoreError>;
}

/// Read access to template definitions.
#[async_trait]
pub trait TemplateStore: Send + Sync {
  /// Get a template by name, in either display (`a/b`) or internal (`a--b`)
  /// spelling.
  async fn get(&self, environment_id: &str, name: &str) -> Result<Template, StoreError>;
}

/// Storage for execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
  async fn insert(&self, execution: &Execution) -> Result<(), StoreError>;

  async fn update(&self, execution: &Execution) -> Result<(), StoreError>;

  async fn get(&self, id: &str) -> Result<Execution, StoreError>;

  /// Find the execution of a workflow with the given name.
  async fn get_by_name_and_workflow(
    &self,
    name: &str,
    workflow: &str,
  ) -> Result<Option<Execution>, StoreError>;

  /// Reserve the next sequence number for a workflow.
  async fn next_execution_number(&self, workflow: &str) -> Result<i32, StoreError>;

  /// Unfinished executions of a concurrency group, oldest first.
  async fn get_running(&self, group: &str) -> Result<Vec<Execution>, StoreError>;
}

/// Storage for execution logs.
#[async_trait]
pub trait OutputStore: Send + Sync {
  async fn save_log(
    &self,
    execution_id: &str,
    workflow_name: &str,
    content: &[u8],
  ) -> Result<(), StoreError>;
}

/// Storage for secret objects.
#[async_trait]
pub trait SecretStore: Send + Sync {
  async fn create(&self, object: &SecretObject) -> Result<(), StoreError>;

  async fn delete(&self, name: &str) -> Result<(), StoreError>;

  /// Create every object of the batch. When one fails, the objects created
  /// so far are deleted again.
  async fn insert_batch(&self, batch: &SecretBatch) -> Result<(), StoreError> {
    let mut created: Vec<&str> = Vec::new();
    for object in batch.objects() {
      if let Err(err) = self.create(object).await {
        for name in created {
          if let Err(cleanup) = self.delete(name).await {
            warn!(secret = %name, error = %cleanup, "obsolete_secret_not_deleted");
          }
        }
        return Err(err);
      }
      created.push(&object.name);
    }
    Ok(())
  }
}
