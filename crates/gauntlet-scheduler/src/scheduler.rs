//! Batch scheduling of workflow executions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use gauntlet_config::{ConcurrencyPolicy, ConfigValue, Template, internal_template_name};
use gauntlet_store::{Execution, ExecutionStore, OutputStore, StoreError, TemplateStore, WorkflowStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::fetcher::{TemplateFetcher, WorkflowFetcher};
use crate::intermediate::{EnvironmentIdentity, ExecutionBase, IntermediateExecution};
use crate::request::{ScheduleRequest, running_context, validate_request};
use crate::retry::RetryPolicy;
use crate::sensitive::SensitiveDataHandler;

/// Name the inline global template is cached under.
pub const INLINE_GLOBAL_TEMPLATE: &str = "<inline-global-template>";

/// Turns schedule requests into persisted executions.
///
/// Each call to [`schedule`](Scheduler::schedule) resolves a batch, then
/// persists it in the background, streaming every saved execution to the
/// caller as soon as it is stored.
pub struct Scheduler {
  workflows: Arc<dyn WorkflowStore>,
  templates: Arc<dyn TemplateStore>,
  results: Arc<dyn ExecutionStore>,
  persister: Persister,
  config: SchedulerConfig,
}

impl Scheduler {
  pub fn new(
    workflows: Arc<dyn WorkflowStore>,
    templates: Arc<dyn TemplateStore>,
    results: Arc<dyn ExecutionStore>,
    output: Arc<dyn OutputStore>,
    config: SchedulerConfig,
  ) -> Self {
    let persister = Persister {
      results: results.clone(),
      output,
      retry: RetryPolicy::new(config.save_retry_attempts, config.save_retry_base_delay()),
    };
    Self {
      workflows,
      templates,
      results,
      persister,
      config,
    }
  }

  pub fn config(&self) -> &SchedulerConfig {
    &self.config
  }

  /// Schedule a batch of executions.
  ///
  /// Errors returned here reject the whole batch before anything is stored.
  /// Problems of a single execution are recorded on it instead, and it is
  /// streamed as failed. The returned stream is closed once every execution
  /// of the batch was handled.
  ///
  /// `cancel` is only observed until the executions are named; from then on
  /// the batch is completed regardless.
  #[instrument(
    name = "schedule",
    skip(self, sensitive, environment_id, request, cancel),
    fields(
      environment_id = %environment_id,
      selectors = request.executions.len(),
    )
  )]
  pub async fn schedule(
    &self,
    sensitive: Arc<dyn SensitiveDataHandler>,
    environment_id: &str,
    request: ScheduleRequest,
    cancel: CancellationToken,
  ) -> Result<mpsc::Receiver<Execution>, SchedulerError> {
    let environment_id = if environment_id.is_empty() {
      self.config.default_environment_id.as_str()
    } else {
      environment_id
    };

    // Validate the request before touching anything
    validate_request(&request)?;
    let (sender, receiver) = mpsc::channel(self.config.result_buffer.max(1));
    if request.executions.is_empty() {
      return Ok(receiver);
    }

    // Prepare the state shared by the whole batch
    let mut base = ExecutionBase::new(Utc::now());
    base
      .append_tags(&request.tags)
      .set_disable_webhooks(request.disable_webhooks)
      .set_running_context(running_context(&request))
      .set_linked_object_name(request.linked_object_name.clone())
      .set_parent_execution_ids(request.parent_execution_ids.clone());

    info!(group_id = %base.group_id(), "schedule_started");

    let workflows = WorkflowFetcher::new(
      self.workflows.clone(),
      environment_id,
      self.config.prefetch_concurrency,
    );
    let templates = TemplateFetcher::new(
      self.templates.clone(),
      environment_id,
      self.config.prefetch_concurrency,
    );

    if request.resolved_workflow.is_none() {
      if let Some(name) = self.config.global_template_name.as_deref() {
        base.prepend_template(&internal_template_name(name));
      }
      if let Some(spec) = &self.config.global_template_inline {
        let mut template = Template::new(INLINE_GLOBAL_TEMPLATE);
        template.spec = spec.clone();
        templates.set_cache(INLINE_GLOBAL_TEMPLATE, template);
        base.prepend_template(INLINE_GLOBAL_TEMPLATE);
      }

      // Load the definitions; missing templates only fail their executions
      let selectors: Vec<_> = request
        .executions
        .iter()
        .map(|execution| execution.selector.clone())
        .collect();
      workflows.prefetch_many(&selectors).await?;

      let mut names = workflows.template_names();
      if let Some(name) = self.config.global_template_name.as_deref() {
        names.insert(internal_template_name(name));
      }
      if let Err(err) = templates.prefetch_many(&names).await {
        debug!(error = %err, "template_prefetch_incomplete");
      }
    }

    // Resolve every selected workflow, one at a time
    let mut executions = Vec::new();
    for item in &request.executions {
      let selected = match &request.resolved_workflow {
        Some(workflow) => vec![workflow.clone()],
        None => workflows.get(&item.selector).await?,
      };

      for workflow in &selected {
        let mut execution = base.instantiate(workflow);
        if let Some(name) = item.execution_name.as_deref().filter(|name| !name.is_empty()) {
          execution.set_name(name);
        }
        execution.append_tags(&item.tags);
        if config_size(&item.config) < self.config.config_size_limit {
          execution.store_config(&item.config);
        }
        if request.resolved_workflow.is_none() {
          self.resolve(&mut execution, &item.config, &templates).await;
        }
        executions.push(execution);
      }
    }

    if let [execution] = executions.as_mut_slice() {
      execution.set_group_id("");
    }

    // Reject the batch when names collide
    check_duplicate_names(&executions)?;
    for execution in executions.iter().filter(|execution| !execution.name().is_empty()) {
      let existing = self
        .results
        .get_by_name_and_workflow(execution.name(), execution.workflow_name())
        .await?;
      if existing.is_some() {
        return Err(SchedulerError::ExecutionNameTaken {
          name: execution.name().to_string(),
          workflow: execution.workflow_name().to_string(),
        });
      }
    }

    if cancel.is_cancelled() {
      warn!(group_id = %base.group_id(), "schedule_cancelled");
      return Err(SchedulerError::Cancelled);
    }

    // Number and name the executions
    for execution in &mut executions {
      let number = self
        .results
        .next_execution_number(execution.workflow_name())
        .await?;
      execution.set_sequence_number(number);
      if execution.name().is_empty() {
        let name = format!("{}-{number}", execution.workflow_name());
        execution.set_name(name);
      }
    }
    check_duplicate_names(&executions)?;

    // Bind the identity of every execution
    let identity = EnvironmentIdentity {
      organization_id: self.config.organization_id.clone(),
      organization_slug: self.config.organization_slug.clone(),
      environment_id: environment_id.to_string(),
      environment_slug: self.config.environment_slug(environment_id).to_string(),
    };
    for execution in &mut executions {
      if let Err(err) = execution.finalize(&identity) {
        execution.set_error("Cannot process workflow specification", &err);
      }
    }

    let admitted = self.apply_concurrency(executions).await;

    info!(
      group_id = %base.group_id(),
      executions = admitted.len(),
      "schedule_resolved"
    );

    // Persist in the background, streaming each execution once saved
    let persister = self.persister.clone();
    tokio::spawn(persister.publish(admitted, sensitive, sender).in_current_span());

    Ok(receiver)
  }

  /// Apply the config and the templates to one execution, recording the
  /// first failure on it.
  async fn resolve(
    &self,
    execution: &mut IntermediateExecution,
    config: &BTreeMap<String, ConfigValue>,
    templates: &TemplateFetcher,
  ) {
    if let Err(err) = execution.apply_config(config) {
      execution.set_error("Cannot inline workflow configuration", &err);
      return;
    }

    let required = match templates.get_many(&execution.template_names()).await {
      Ok(required) => required,
      Err(err) => {
        execution.set_error("Cannot fetch required workflow templates", &err);
        return;
      }
    };

    if let Err(err) = execution.apply_templates(&required) {
      execution.set_error("Cannot inline workflow templates", &err);
    }
  }

  /// Drop the executions their concurrency policy does not allow, making
  /// room first when the policy cancels the ones in progress.
  async fn apply_concurrency(
    &self,
    executions: Vec<IntermediateExecution>,
  ) -> Vec<IntermediateExecution> {
    let mut in_batch: HashMap<String, usize> = HashMap::new();
    let mut admitted = Vec::with_capacity(executions.len());

    for mut execution in executions {
      if execution.is_finished() {
        admitted.push(execution);
        continue;
      }
      let Some(policy) = execution.concurrency().cloned() else {
        admitted.push(execution);
        continue;
      };

      let group = execution.concurrency_group();
      execution.set_concurrency_group(group.clone());
      let count = in_batch.get(&group).copied().unwrap_or_default();

      match self.make_room(&group, &policy, count).await {
        Ok(()) => {
          *in_batch.entry(group).or_default() += 1;
          admitted.push(execution);
        }
        Err(err @ SchedulerError::ConcurrencyForbidden { .. }) => {
          warn!(
            execution_id = %execution.id(),
            workflow = %execution.workflow_name(),
            group = %group,
            error = %err,
            "execution_rejected"
          );
        }
        Err(err) => {
          execution.set_error("Cannot apply the concurrency policy", &err);
          admitted.push(execution);
        }
      }
    }

    admitted
  }

  /// Make sure one more execution fits into a concurrency group.
  /// `in_batch` counts the executions of the group admitted earlier in the
  /// same batch.
  async fn make_room(
    &self,
    group: &str,
    policy: &ConcurrencyPolicy,
    in_batch: usize,
  ) -> Result<(), SchedulerError> {
    let limit = usize::try_from(policy.max).unwrap_or_default();
    let running = self.results.get_running(group).await?;
    let busy = running.len() + in_batch;
    if busy < limit {
      return Ok(());
    }

    let forbidden = SchedulerError::ConcurrencyForbidden {
      group: group.to_string(),
      running: busy,
      max: policy.max,
    };
    let excess = busy + 1 - limit;
    if !policy.cancel_in_progress || excess > running.len() {
      return Err(forbidden);
    }

    for mut execution in running.into_iter().take(excess) {
      let at = Utc::now();
      execution.status_at = at;
      execution.result.abort(at);
      self
        .persister
        .write(&execution, Write::Update)
        .await
        .map_err(|source| SchedulerError::Persistence {
          execution_id: execution.id.clone(),
          source,
        })?;
      info!(execution_id = %execution.id, group = %group, "execution_cancelled_in_progress");
    }
    Ok(())
  }

  /// Fail an execution that was already stored.
  #[instrument(name = "critical_error", skip(self, execution, err), fields(execution_id = %execution.id))]
  pub async fn critical_error(
    &self,
    execution: &mut Execution,
    header: &str,
    err: &(dyn fmt::Display + Sync),
  ) -> Result<(), SchedulerError> {
    let at = Utc::now();
    execution.status_at = at;
    execution
      .result
      .fail_initialization(format!("{header}: {err}"), at);

    self.persister.save_empty_log(execution).await;
    self
      .persister
      .write(execution, Write::Update)
      .await
      .map_err(|source| SchedulerError::Persistence {
        execution_id: execution.id.clone(),
        source,
      })
  }
}

/// Fail when two executions of a batch share a name within one workflow.
fn check_duplicate_names(executions: &[IntermediateExecution]) -> Result<(), SchedulerError> {
  let mut seen = HashSet::new();
  for execution in executions.iter().filter(|execution| !execution.name().is_empty()) {
    if !seen.insert((execution.workflow_name(), execution.name())) {
      return Err(SchedulerError::DuplicateExecutionName {
        name: execution.name().to_string(),
        workflow: execution.workflow_name().to_string(),
      });
    }
  }
  Ok(())
}

/// Size of the config values as stored on the execution, in bytes.
fn config_size(config: &BTreeMap<String, ConfigValue>) -> usize {
  config
    .iter()
    .map(|(key, value)| key.len() + value.to_string().len())
    .sum()
}

#[derive(Debug, Clone, Copy)]
enum Write {
  Insert,
  Update,
}

/// Saves execution records and their logs, retrying failed writes.
#[derive(Clone)]
struct Persister {
  results: Arc<dyn ExecutionStore>,
  output: Arc<dyn OutputStore>,
  retry: RetryPolicy,
}

impl Persister {
  async fn write(&self, execution: &Execution, write: Write) -> Result<(), StoreError> {
    let result = self
      .retry
      .run(move |attempt| async move {
        let result = match write {
          Write::Insert => self.results.insert(execution).await,
          Write::Update => self.results.update(execution).await,
        };
        if let Err(err) = &result {
          warn!(
            execution_id = %execution.id,
            attempt,
            error = %err,
            recoverable = true,
            "execution_save_failed"
          );
        }
        result
      })
      .await;

    if let Err(err) = &result {
      error!(
        execution_id = %execution.id,
        attempts = self.retry.attempts,
        error = %err,
        recoverable = false,
        "execution_save_failed"
      );
    }
    result
  }

  /// Store an empty log, so readers of a finished execution do not wait
  /// for output that never comes.
  async fn save_empty_log(&self, execution: &Execution) {
    if let Err(err) = self
      .output
      .save_log(&execution.id, &execution.workflow.name, &[])
      .await
    {
      warn!(execution_id = %execution.id, error = %err, "empty_log_not_saved");
    }
  }

  async fn publish(
    self,
    executions: Vec<IntermediateExecution>,
    sensitive: Arc<dyn SensitiveDataHandler>,
    sender: mpsc::Sender<Execution>,
  ) {
    for mut execution in executions {
      if let Err(err) = sensitive.process(&mut execution).await {
        execution.set_error("Cannot store the sensitive data", &err);
      }

      let execution = execution.into_execution();
      if execution.is_finished() {
        self.save_empty_log(&execution).await;
      }

      if self.write(&execution, Write::Insert).await.is_err() {
        sensitive.rollback(&execution.id).await;
        continue;
      }

      info!(
        execution_id = %execution.id,
        workflow = %execution.workflow.name,
        name = %execution.name,
        status = ?execution.result.status,
        "execution_scheduled"
      );
      if sender.send(execution).await.is_err() {
        debug!("schedule_receiver_dropped");
      }
    }
  }
}
