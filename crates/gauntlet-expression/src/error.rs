//! Expression error types.

/// Errors that can occur while simplifying expressions.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
  /// A reference that must be known at this stage has no value.
  #[error("{location}: error while accessing {name}: unknown variable")]
  Unresolved { name: String, location: String },

  /// Expressions handed out by the scopes keep referring to each other.
  #[error("{location}: error while accessing {name}: expressions nested too deeply")]
  Recursion { name: String, location: String },

  /// A function provided by a scope rejected its arguments.
  #[error("{location}: error while calling {name}: {message}")]
  Function {
    name: String,
    location: String,
    message: String,
  },

  /// The value could not be converted to or from its JSON form.
  #[error("failed to convert value: {0}")]
  Conversion(#[from] serde_json::Error),
}

impl ExpressionError {
  /// The reference or function that failed, if any.
  pub fn name(&self) -> Option<&str> {
    match self {
      ExpressionError::Unresolved { name, .. }
      | ExpressionError::Recursion { name, .. }
      | ExpressionError::Function { name, .. } => {
        Some(name.as_str())
      }
      ExpressionError::Conversion(_) => None,
    }
  }
}
