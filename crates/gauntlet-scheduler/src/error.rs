use gauntlet_expression::ExpressionError;
use gauntlet_resolver::ResolveError;
use gauntlet_store::StoreError;
use thiserror::Error;

/// Errors that can occur while scheduling executions.
#[derive(Debug, Error)]
pub enum SchedulerError {
  /// A selector does not target workflows the way it has to.
  #[error("invalid selector: {message}")]
  InvalidSelector { message: String },

  /// The request as a whole cannot be scheduled.
  #[error("invalid request: {message}")]
  InvalidRequest { message: String },

  /// Template injection or config application failed.
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  /// Expression substitution failed.
  #[error(transparent)]
  Expression(#[from] ExpressionError),

  /// A storage backend failed.
  #[error(transparent)]
  Store(#[from] StoreError),

  /// Two executions of the batch got the same name.
  #[error("duplicated execution name: \"{name}\" for workflow \"{workflow}\"")]
  DuplicateExecutionName { name: String, workflow: String },

  /// An execution with this name already exists.
  #[error("execution name already exists: \"{name}\" for workflow \"{workflow}\"")]
  ExecutionNameTaken { name: String, workflow: String },

  /// The concurrency policy does not allow another execution.
  #[error("concurrency group \"{group}\" already has {running} running execution(s), limit is {max}")]
  ConcurrencyForbidden {
    group: String,
    running: usize,
    max: i32,
  },

  /// The execution could not be saved, even after retrying.
  #[error("persisting execution {execution_id}: {source}")]
  Persistence {
    execution_id: String,
    #[source]
    source: StoreError,
  },

  /// The sensitive data could not be stored.
  #[error("storing sensitive data: {message}")]
  SensitiveData { message: String },

  /// The execution lacks the identity needed to finish resolving it.
  #[error("execution is not ready yet: missing {missing}")]
  NotReady { missing: &'static str },

  /// The caller gave up before the executions were admitted.
  #[error("scheduling cancelled")]
  Cancelled,

  /// The scheduler configuration cannot be used.
  #[error("invalid scheduler config: {message}")]
  Config { message: String },
}
