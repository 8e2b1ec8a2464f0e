//! Gauntlet Resolver
//!
//! Turns a stored workflow into the tree the runner executes:
//! 1. [`apply_workflow_config`] substitutes `config.*` references, casting
//!    values per the declared parameter types and externalizing sensitive ones
//! 2. [`apply_templates`] injects every referenced template (each configured
//!    independently via [`apply_template_config`]) and flattens wrapper steps
//! 3. [`list_templates`] tells the caller which templates to fetch beforehand
//!
//! Every operation works on its own copy of the workflow; callers keep their
//! original untouched.

mod apply;
mod cast;
mod config;
mod discover;
mod error;
mod flatten;
mod merge;

use std::collections::BTreeMap;

use gauntlet_config::Template;

pub use apply::{add_global_template_ref, apply_templates};
pub use cast::cast_config_value;
pub use config::{apply_template_config, apply_workflow_config, simplify_isolated};
pub use discover::list_templates;
pub use error::ResolveError;
pub use flatten::flatten_steps;
pub use gauntlet_config::{display_template_name, internal_template_name};
pub use merge::dedupe_env;

/// Namespace of the workflow and template parameters.
pub const CONFIG_PREFIX: &str = "config.";

/// Templates available for injection, keyed by internal name.
pub type TemplateSet = BTreeMap<String, Template>;

/// Callback that moves a sensitive config value out of the definition.
///
/// Receives the parameter name and its raw value and returns the expression
/// that stands in for the value, e.g. `sensitiveData("0191...")`.
pub type Externalize<'a> = dyn FnMut(&str, &str) -> Result<String, ResolveError> + 'a;

/// Random reference prefix used to hide `config.*` references during a pass.
pub(crate) fn isolation_prefix() -> String {
  let id = uuid::Uuid::new_v4().simple().to_string();
  format!("_{}", &id[..10])
}
