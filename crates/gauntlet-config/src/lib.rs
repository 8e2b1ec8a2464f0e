//! Gauntlet Config
//!
//! This crate contains the serializable definition types for Gauntlet test
//! workflows and the reusable templates they pull in. These types represent
//! definitions as they are stored, before templates are injected and before
//! any `{{ }}` expression is resolved.
//!
//! Definitions are loaded from:
//! - JSON documents (as stored by the definition stores)
//! - Inline payloads attached to a schedule request
//!
//! The resolver takes these types, injects referenced templates, substitutes
//! configuration values and flattens the step tree. The scheduler then turns
//! the resolved definition into a queued execution record.

mod container;
mod content;
mod execution;
mod names;
mod parameter;
mod pod;
mod service;
mod step;
mod workflow;

pub use container::{ContainerConfig, EnvFromSource, EnvVar, Resources, SecurityContext};
pub use content::{Content, ContentFile, ContentGit};
pub use execution::{ConcurrencyPolicy, ExecutionSpec, ExecutionTarget, SystemConfig};
pub use names::{display_template_name, internal_template_name};
pub use parameter::{ConfigValue, ParameterSchema, ParameterType};
pub use pod::{JobConfig, PodConfig};
pub use service::{IndependentServiceSpec, ServiceSpec};
pub use step::{
  IndependentParallel, IndependentStep, RetryPolicy, Step, StepArtifacts, StepBase, StepControl,
  StepExecute, StepOperations, StepParallel, StepRun, TemplateRef,
};
pub use workflow::{Template, TemplateSpec, Workflow, WorkflowSpec};
