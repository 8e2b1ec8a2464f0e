//! Scheduler configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use gauntlet_config::TemplateSpec;
use gauntlet_store::DEFAULT_MAX_OBJECT_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Configuration for the [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
  /// Environment used when a request does not name one.
  pub default_environment_id: String,
  pub organization_id: String,
  pub organization_slug: String,
  /// Environment slugs keyed by environment id.
  pub environment_slugs: BTreeMap<String, String>,
  /// Template injected into every scheduled workflow.
  pub global_template_name: Option<String>,
  /// Template spec injected into every scheduled workflow, without storing it.
  pub global_template_inline: Option<TemplateSpec>,
  /// Upper bound of concurrent definition fetches.
  pub prefetch_concurrency: usize,
  pub save_retry_attempts: u32,
  /// Delay before the first retry; each next one waits this much longer.
  pub save_retry_base_delay_ms: u64,
  /// Config values are recorded on the execution only below this size, in bytes.
  pub config_size_limit: usize,
  /// Capacity of the stream of scheduled executions.
  pub result_buffer: usize,
  pub secrets: SecretHandlerConfig,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      default_environment_id: String::new(),
      organization_id: String::new(),
      organization_slug: String::new(),
      environment_slugs: BTreeMap::new(),
      global_template_name: None,
      global_template_inline: None,
      prefetch_concurrency: 10,
      save_retry_attempts: 100,
      save_retry_base_delay_ms: 300,
      config_size_limit: 100 * 1024,
      result_buffer: 1,
      secrets: SecretHandlerConfig::default(),
    }
  }
}

impl SchedulerConfig {
  /// Parse and validate a JSON document. Missing fields take their defaults.
  pub fn from_json(json: &str) -> Result<Self, SchedulerError> {
    let config: SchedulerConfig =
      serde_json::from_str(json).map_err(|e| SchedulerError::Config {
        message: e.to_string(),
      })?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), SchedulerError> {
    if self.prefetch_concurrency == 0 {
      return Err(SchedulerError::Config {
        message: "prefetchConcurrency must be at least 1".to_string(),
      });
    }
    if self.result_buffer == 0 {
      return Err(SchedulerError::Config {
        message: "resultBuffer must be at least 1".to_string(),
      });
    }
    if self.save_retry_attempts == 0 {
      return Err(SchedulerError::Config {
        message: "saveRetryAttempts must be at least 1".to_string(),
      });
    }
    if self.secrets.max_object_size == 0 {
      return Err(SchedulerError::Config {
        message: "secrets.maxObjectSize must be at least 1".to_string(),
      });
    }
    Ok(())
  }

  pub fn save_retry_base_delay(&self) -> Duration {
    Duration::from_millis(self.save_retry_base_delay_ms)
  }

  /// Slug of an environment, empty when unknown.
  pub fn environment_slug(&self, environment_id: &str) -> &str {
    self
      .environment_slugs
      .get(environment_id)
      .map(String::as_str)
      .unwrap_or_default()
  }
}

/// How sensitive values are turned into secret objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretHandlerConfig {
  /// Prepended to the execution id to name the secret objects.
  pub prefix: String,
  /// Upper bound for the data held by one secret object, in bytes.
  pub max_object_size: usize,
}

impl Default for SecretHandlerConfig {
  fn default() -> Self {
    Self {
      prefix: "twe-".to_string(),
      max_object_size: DEFAULT_MAX_OBJECT_SIZE,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = SchedulerConfig::from_json("{}").unwrap();
    assert_eq!(config, SchedulerConfig::default());
    assert_eq!(config.prefetch_concurrency, 10);
    assert_eq!(config.save_retry_attempts, 100);
    assert_eq!(config.save_retry_base_delay(), Duration::from_millis(300));
    assert_eq!(config.config_size_limit, 102400);
    assert_eq!(config.secrets.prefix, "twe-");
    assert_eq!(config.secrets.max_object_size, 768000);
  }

  #[test]
  fn test_from_json() {
    let config = SchedulerConfig::from_json(
      r#"{
        "defaultEnvironmentId": "env-1",
        "environmentSlugs": {"env-1": "production"},
        "globalTemplateName": "official/global",
        "globalTemplateInline": {"pod": {"labels": {"managed": "yes"}}},
        "saveRetryAttempts": 3,
        "secrets": {"prefix": "sec-"}
      }"#,
    )
    .unwrap();

    assert_eq!(config.default_environment_id, "env-1");
    assert_eq!(config.environment_slug("env-1"), "production");
    assert_eq!(config.environment_slug("env-2"), "");
    assert_eq!(config.global_template_name.as_deref(), Some("official/global"));
    assert!(config.global_template_inline.unwrap().pod.is_some());
    assert_eq!(config.save_retry_attempts, 3);
    assert_eq!(config.secrets.prefix, "sec-");
    assert_eq!(config.secrets.max_object_size, 768000);
  }

  #[test]
  fn test_rejects_zero_buffer() {
    let err = SchedulerConfig::from_json(r#"{"resultBuffer": 0}"#).unwrap_err();
    assert!(matches!(err, SchedulerError::Config { .. }));
  }
}
