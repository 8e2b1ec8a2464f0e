use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// What a scope knows about a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
  /// A concrete value; it is substituted as a literal.
  Value(Value),
  /// Another expression; it replaces the reference and stays unevaluated.
  Expression(String),
}

impl Resolution {
  pub fn value(value: impl Into<Value>) -> Self {
    Resolution::Value(value.into())
  }

  pub fn expression(expression: impl Into<String>) -> Self {
    Resolution::Expression(expression.into())
  }
}

/// A source of values for references and functions.
pub trait Scope: Send + Sync {
  /// Resolve a dotted reference such as `config.foo`.
  fn resolve(&self, name: &str) -> Option<Resolution>;

  /// Call a function with literal arguments.
  ///
  /// `None` means the scope does not provide the function.
  fn call(&self, _name: &str, _args: &[Value]) -> Option<Result<Resolution, String>> {
    None
  }
}

/// An ordered set of scopes. The first scope that knows a reference wins.
#[derive(Clone, Default)]
pub struct Machine {
  scopes: Vec<Arc<dyn Scope>>,
  required: Vec<String>,
}

impl Machine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_scope(mut self, scope: impl Scope + 'static) -> Self {
    self.scopes.push(Arc::new(scope));
    self
  }

  /// References starting with `prefix` must be resolved, otherwise
  /// simplification fails.
  pub fn require_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.required.push(prefix.into());
    self
  }

  /// Append the scopes and requirements of another machine.
  pub fn chain(mut self, other: &Machine) -> Self {
    self.scopes.extend(other.scopes.iter().cloned());
    self.required.extend(other.required.iter().cloned());
    self
  }

  pub fn resolve(&self, name: &str) -> Option<Resolution> {
    self.scopes.iter().find_map(|scope| scope.resolve(name))
  }

  pub fn call(&self, name: &str, args: &[Value]) -> Option<Result<Resolution, String>> {
    self.scopes.iter().find_map(|scope| scope.call(name, args))
  }

  pub fn is_required(&self, name: &str) -> bool {
    self
      .required
      .iter()
      .any(|prefix| name.starts_with(prefix.as_str()))
  }
}

impl fmt::Debug for Machine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Machine")
      .field("scopes", &self.scopes.len())
      .field("required", &self.required)
      .finish()
  }
}
