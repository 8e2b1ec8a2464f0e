//! In-memory implementations of the storage traits.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use gauntlet_config::{Template, Workflow, internal_template_name};
use parking_lot::{Mutex, RwLock};

use crate::{
  Execution, ExecutionStore, OutputStore, SecretObject, SecretStore, StoreError, TemplateStore,
  WorkflowStore,
};

/// Workflows keyed by environment and name.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
  workflows: RwLock<BTreeMap<(String, String), Workflow>>,
}

impl MemoryWorkflowStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, environment_id: &str, workflow: Workflow) {
    self
      .workflows
      .write()
      .insert((environment_id.to_string(), workflow.name.clone()), workflow);
  }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
  async fn get(&self, environment_id: &str, name: &str) -> Result<Workflow, StoreError> {
    self
      .workflows
      .read()
      .get(&(environment_id.to_string(), name.to_string()))
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("workflow {name}")))
  }

  async fn list(
    &self,
    environment_id: &str,
    labels: &BTreeMap<String, String>,
  ) -> Result<Vec<Workflow>, StoreError> {
    let workflows = self.workflows.read();
    Ok(
      workflows
        .iter()
        .filter(|((env, _), _)| env == environment_id)
        .map(|(_, workflow)| workflow)
        .filter(|workflow| {
          labels
            .iter()
            .all(|(key, value)| workflow.labels.get(key) == Some(value))
        })
        .cloned()
        .collect(),
    )
  }
}

/// Templates keyed by environment and internal name.
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
  templates: RwLock<BTreeMap<(String, String), Template>>,
}

impl MemoryTemplateStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, environment_id: &str, template: Template) {
    let key = (environment_id.to_string(), internal_template_name(&template.name));
    self.templates.write().insert(key, template);
  }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
  async fn get(&self, environment_id: &str, name: &str) -> Result<Template, StoreError> {
    self
      .templates
      .read()
      .get(&(environment_id.to_string(), internal_template_name(name)))
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("template {name}")))
  }
}

/// Execution records in insertion order, with per-workflow counters.
#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
  executions: RwLock<Vec<Execution>>,
  counters: Mutex<HashMap<String, i32>>,
}

impl MemoryExecutionStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every stored execution, oldest first.
  pub fn all(&self) -> Vec<Execution> {
    self.executions.read().clone()
  }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
  async fn insert(&self, execution: &Execution) -> Result<(), StoreError> {
    let mut executions = self.executions.write();
    if executions.iter().any(|existing| existing.id == execution.id) {
      return Err(StoreError::Conflict(format!("execution {}", execution.id)));
    }
    executions.push(execution.clone());
    Ok(())
  }

  async fn update(&self, execution: &Execution) -> Result<(), StoreError> {
    let mut executions = self.executions.write();
    let existing = executions
      .iter_mut()
      .find(|existing| existing.id == execution.id)
      .ok_or_else(|| StoreError::NotFound(format!("execution {}", execution.id)))?;
    *existing = execution.clone();
    Ok(())
  }

  async fn get(&self, id: &str) -> Result<Execution, StoreError> {
    self
      .executions
      .read()
      .iter()
      .find(|execution| execution.id == id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("execution {id}")))
  }

  async fn get_by_name_and_workflow(
    &self,
    name: &str,
    workflow: &str,
  ) -> Result<Option<Execution>, StoreError> {
    Ok(
      self
        .executions
        .read()
        .iter()
        .find(|execution| execution.name == name && execution.workflow.name == workflow)
        .cloned(),
    )
  }

  async fn next_execution_number(&self, workflow: &str) -> Result<i32, StoreError> {
    let mut counters = self.counters.lock();
    let counter = counters.entry(workflow.to_string()).or_insert(0);
    *counter += 1;
    Ok(*counter)
  }

  async fn get_running(&self, group: &str) -> Result<Vec<Execution>, StoreError> {
    let mut running: Vec<Execution> = self
      .executions
      .read()
      .iter()
      .filter(|execution| execution.concurrency_group.as_deref() == Some(group))
      .filter(|execution| !execution.is_finished())
      .cloned()
      .collect();
    running.sort_by_key(|execution| execution.scheduled_at);
    Ok(running)
  }
}

/// Logs keyed by execution id.
#[derive(Debug, Default)]
pub struct MemoryOutputStore {
  logs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryOutputStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, execution_id: &str) -> Option<Vec<u8>> {
    self.logs.read().get(execution_id).cloned()
  }
}

#[async_trait]
impl OutputStore for MemoryOutputStore {
  async fn save_log(
    &self,
    execution_id: &str,
    _workflow_name: &str,
    content: &[u8],
  ) -> Result<(), StoreError> {
    self
      .logs
      .write()
      .insert(execution_id.to_string(), content.to_vec());
    Ok(())
  }
}

/// Secret objects keyed by name.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
  objects: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemorySecretStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<BTreeMap<String, String>> {
    self.objects.read().get(name).cloned()
  }

  pub fn names(&self) -> Vec<String> {
    self.objects.read().keys().cloned().collect()
  }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
  async fn create(&self, object: &SecretObject) -> Result<(), StoreError> {
    let mut objects = self.objects.write();
    if objects.contains_key(&object.name) {
      return Err(StoreError::Conflict(format!("secret {}", object.name)));
    }
    objects.insert(object.name.clone(), object.data.clone());
    Ok(())
  }

  async fn delete(&self, name: &str) -> Result<(), StoreError> {
    self
      .objects
      .write()
      .remove(name)
      .map(|_| ())
      .ok_or_else(|| StoreError::NotFound(format!("secret {name}")))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use crate::{ExecutionStatus, SecretBatch};

  use super::*;

  fn labeled(name: &str, labels: &[(&str, &str)]) -> Workflow {
    let mut workflow = Workflow::new(name);
    workflow.labels = labels
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    workflow
  }

  #[tokio::test]
  async fn test_workflow_list_by_labels() {
    let store = MemoryWorkflowStore::new();
    store.insert("env", labeled("a", &[("team", "core"), ("tier", "1")]));
    store.insert("env", labeled("b", &[("team", "core")]));
    store.insert("other", labeled("c", &[("team", "core")]));

    let selector = BTreeMap::from([("team".to_string(), "core".to_string())]);
    let names: Vec<String> = store
      .list("env", &selector)
      .await
      .unwrap()
      .into_iter()
      .map(|workflow| workflow.name)
      .collect();
    assert_eq!(names, vec!["a", "b"]);

    assert!(store.get("other", "a").await.is_err());
  }

  #[tokio::test]
  async fn test_template_get_by_either_spelling() {
    let store = MemoryTemplateStore::new();
    store.insert("env", Template::new("official/base"));

    assert_eq!(store.get("env", "official/base").await.unwrap().name, "official/base");
    assert_eq!(store.get("env", "official--base").await.unwrap().name, "official/base");
    assert!(matches!(
      store.get("env", "missing").await,
      Err(StoreError::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_execution_numbers_are_per_workflow() {
    let store = MemoryExecutionStore::new();
    assert_eq!(store.next_execution_number("a").await.unwrap(), 1);
    assert_eq!(store.next_execution_number("a").await.unwrap(), 2);
    assert_eq!(store.next_execution_number("b").await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_get_running_skips_finished() {
    let store = MemoryExecutionStore::new();
    let mut running = Execution {
      id: "1".to_string(),
      concurrency_group: Some("g".to_string()),
      ..Default::default()
    };
    running.result.status = ExecutionStatus::Running;
    let mut done = running.clone();
    done.id = "2".to_string();
    done.result.status = ExecutionStatus::Passed;

    store.insert(&running).await.unwrap();
    store.insert(&done).await.unwrap();

    let ids: Vec<String> = store
      .get_running("g")
      .await
      .unwrap()
      .into_iter()
      .map(|execution| execution.id)
      .collect();
    assert_eq!(ids, vec!["1"]);
    assert!(store.get_running("other").await.unwrap().is_empty());
    assert!(matches!(store.insert(&running).await, Err(StoreError::Conflict(_))));
  }

  /// Fails every creation after the first `limit` ones.
  struct FlakySecretStore {
    inner: MemorySecretStore,
    limit: usize,
    created: AtomicUsize,
  }

  #[async_trait]
  impl SecretStore for FlakySecretStore {
    async fn create(&self, object: &SecretObject) -> Result<(), StoreError> {
      if self.created.fetch_add(1, Ordering::SeqCst) >= self.limit {
        return Err(StoreError::Backend("quota exceeded".to_string()));
      }
      self.inner.create(object).await
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
      self.inner.delete(name).await
    }
  }

  #[tokio::test]
  async fn test_insert_batch_cleans_up_on_failure() {
    let mut batch = SecretBatch::new("twe-", "abc").with_max_object_size(8);
    batch.append("a", "1234567");
    batch.append("b", "1234567");
    batch.append("c", "1234567");

    let store = FlakySecretStore {
      inner: MemorySecretStore::new(),
      limit: 2,
      created: AtomicUsize::new(0),
    };

    let err = store.insert_batch(&batch).await.unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
    assert!(store.inner.names().is_empty());
  }

  #[tokio::test]
  async fn test_insert_batch() {
    let mut batch = SecretBatch::new("twe-", "abc");
    let reference = batch.append("password", "hunter2");

    let store = MemorySecretStore::new();
    store.insert_batch(&batch).await.unwrap();

    assert_eq!(store.get(&reference.name).unwrap()[&reference.key], "hunter2");
  }
}
