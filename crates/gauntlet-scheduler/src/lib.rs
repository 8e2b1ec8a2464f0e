//! Gauntlet Scheduler
//!
//! Turns a [`ScheduleRequest`] into persisted executions:
//! 1. The selectors are validated and the selected workflows and their
//!    templates are fetched with bounded parallelism
//! 2. Every selected workflow becomes an [`IntermediateExecution`] with the
//!    request config and templates applied. Failures stay on that execution
//! 3. The executions are named, numbered and bound to their identity
//! 4. Concurrency policies decide which executions are admitted
//! 5. In the background, sensitive values are moved to secret objects and
//!    every execution is saved and streamed to the caller
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────────┐   ┌────────────┐
//! │ Fetchers  │──▶│ Intermediate │──▶│  Concurrency  │──▶│  Persist   │──▶ stream
//! │ (prefetch)│   │  Execution   │   │     gate      │   │ (retried)  │
//! └───────────┘   └──────────────┘   └───────────────┘   └────────────┘
//! ```

mod config;
mod error;
mod fetcher;
mod intermediate;
mod request;
mod retry;
mod scheduler;
mod sensitive;

pub use config::{SchedulerConfig, SecretHandlerConfig};
pub use error::SchedulerError;
pub use fetcher::{TemplateFetcher, WorkflowFetcher};
pub use intermediate::{
  EnvironmentIdentity, ExecutionBase, IntermediateExecution, SECRET_FN, SENSITIVE_DATA_FN,
  SensitiveValue,
};
pub use request::{
  RequestContext, RequestOrigin, ResourceSelector, ScheduleExecution, ScheduleRequest,
  running_context, validate_request,
};
pub use retry::RetryPolicy;
pub use scheduler::{INLINE_GLOBAL_TEMPLATE, Scheduler};
pub use sensitive::{SecretSensitiveDataHandler, SensitiveDataHandler};
