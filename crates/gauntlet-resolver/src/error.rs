use gauntlet_config::ParameterType;
use gauntlet_expression::ExpressionError;
use thiserror::Error;

/// Errors that can occur during workflow resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// A referenced template does not exist.
  #[error("template \"{name}\" not found")]
  TemplateNotFound { name: String },

  /// A template was referenced somewhere it cannot be applied.
  #[error("template \"{name}\" cannot be used here: {reason}")]
  TemplateMisuse { name: String, reason: String },

  /// A config value could not be cast to its declared type.
  #[error("config.{key}: could not cast \"{value}\" to {kind}")]
  ConfigCast {
    key: String,
    value: String,
    kind: ParameterType,
  },

  /// A `config.*` reference has neither a provided value nor a default.
  #[error("{location}: config.{key} is not set and has no default")]
  ConfigUnresolved { key: String, location: String },

  /// Two templates applied together declare different execution targets.
  #[error("execution target is declared by both \"{first}\" and \"{second}\" templates")]
  DuplicateTarget { first: String, second: String },

  /// The sensitive value could not be externalized.
  #[error("config.{key}: failed to externalize sensitive value: {message}")]
  Externalize { key: String, message: String },

  /// Expression substitution failed.
  #[error(transparent)]
  Expression(#[from] ExpressionError),

  /// An error with the path of the definition part that caused it.
  #[error("{path}{}{source}", separator(.source))]
  Context {
    path: String,
    #[source]
    source: Box<ResolveError>,
  },
}

/// Nested paths starting with `.` continue the outer one, e.g.
/// `spec.steps[3]` + `.use[0]` reads `spec.steps[3].use[0]`.
fn separator(source: &ResolveError) -> &'static str {
  match source {
    ResolveError::Context { path, .. } if path.starts_with('.') => "",
    _ => ": ",
  }
}

impl ResolveError {
  /// Prefix the error with the path of the part being resolved.
  pub fn context(self, path: impl Into<String>) -> Self {
    ResolveError::Context {
      path: path.into(),
      source: Box::new(self),
    }
  }

  /// The innermost error, with every path stripped.
  pub fn root(&self) -> &ResolveError {
    match self {
      ResolveError::Context { source, .. } => source.root(),
      other => other,
    }
  }
}
