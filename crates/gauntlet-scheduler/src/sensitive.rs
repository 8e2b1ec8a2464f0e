//! Moving sensitive config values out of the execution record.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gauntlet_store::{SecretBatch, SecretStore};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::SecretHandlerConfig;
use crate::error::SchedulerError;
use crate::intermediate::{IntermediateExecution, SECRET_FN};

/// Stores the sensitive values of an execution before it is persisted.
#[async_trait]
pub trait SensitiveDataHandler: Send + Sync {
  /// Store the sensitive values of the execution and rewrite their
  /// placeholders to point at the stored copies.
  async fn process(&self, execution: &mut IntermediateExecution) -> Result<(), SchedulerError>;

  /// Remove whatever [`process`](Self::process) stored for an execution.
  async fn rollback(&self, execution_id: &str);
}

/// Keeps sensitive values in secret objects named after the execution.
pub struct SecretSensitiveDataHandler {
  store: Arc<dyn SecretStore>,
  config: SecretHandlerConfig,
  created: Mutex<HashMap<String, Vec<String>>>,
}

impl SecretSensitiveDataHandler {
  pub fn new(store: Arc<dyn SecretStore>, config: SecretHandlerConfig) -> Self {
    Self {
      store,
      config,
      created: Mutex::new(HashMap::new()),
    }
  }
}

#[async_trait]
impl SensitiveDataHandler for SecretSensitiveDataHandler {
  async fn process(&self, execution: &mut IntermediateExecution) -> Result<(), SchedulerError> {
    if execution.sensitive_data().is_empty() {
      return Ok(());
    }

    let execution_id = execution.id().to_string();
    let mut batch = SecretBatch::new(self.config.prefix.as_str(), execution_id.as_str())
      .with_max_object_size(self.config.max_object_size);
    let replacements: HashMap<String, String> = execution
      .sensitive_data()
      .iter()
      .map(|(id, sensitive)| {
        let reference = batch.append(&sensitive.key, &sensitive.value);
        (
          id.clone(),
          format!("{SECRET_FN}(\"{}\", \"{}\")", reference.name, reference.key),
        )
      })
      .collect();

    self
      .store
      .insert_batch(&batch)
      .await
      .map_err(|e| SchedulerError::SensitiveData {
        message: e.to_string(),
      })?;
    self.created.lock().insert(execution_id.clone(), batch.names());
    debug!(
      execution_id = %execution_id,
      objects = batch.objects().len(),
      "sensitive_data_stored"
    );

    if let Err(err) = execution.rewrite_sensitive_data(replacements) {
      self.rollback(&execution_id).await;
      return Err(err);
    }
    Ok(())
  }

  async fn rollback(&self, execution_id: &str) {
    let names = self.created.lock().remove(execution_id).unwrap_or_default();
    for name in names {
      if let Err(err) = self.store.delete(&name).await {
        warn!(execution_id = %execution_id, secret = %name, error = %err, "secret_rollback_failed");
      }
    }
  }
}
