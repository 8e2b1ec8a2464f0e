//! Substitution of `config.*` references.

use std::collections::BTreeMap;

use gauntlet_config::{ConfigValue, ParameterSchema, Template, Workflow};
use gauntlet_expression::{
  ExpressionError, MapScope, Machine, RenamePrefixScope, Resolution, simplify_value, template_expression,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::cast::cast_config_value;
use crate::error::ResolveError;
use crate::{CONFIG_PREFIX, Externalize, isolation_prefix};

/// Substitute every `config.<name>` reference of a workflow.
///
/// Values come from `values`, falling back to the parameter's default. They
/// are cast per the declared type, except for values that embed expressions,
/// which are inserted as expressions: `http://{{config.host}}` stands for
/// `"http://" ~ config.host` and resolves along with the other values.
/// Sensitive values go through `externalize`
/// and only their placeholder ends up in the workflow. A reference with
/// neither a value nor a default fails the call.
///
/// Parallel groups declaring their own `config` keep their references.
pub fn apply_workflow_config(
  workflow: Workflow,
  values: &BTreeMap<String, ConfigValue>,
  externalize: &mut Externalize<'_>,
) -> Result<Workflow, ResolveError> {
  let machine = config_machine(&workflow.spec.config, values, externalize)?;
  let mut workflow = workflow;
  simplify_isolated(&mut workflow, &machine)?;
  Ok(workflow)
}

/// Substitute the `config.<name>` references of a template before it is
/// injected. Each inclusion is configured on its own copy.
pub fn apply_template_config(
  template: &Template,
  values: &BTreeMap<String, ConfigValue>,
  externalize: &mut Externalize<'_>,
) -> Result<Template, ResolveError> {
  let machine = config_machine(&template.spec.config, values, externalize)?;
  let mut template = template.clone();
  simplify_isolated(&mut template, &machine)?;
  Ok(template)
}

fn config_machine(
  schema: &BTreeMap<String, ParameterSchema>,
  values: &BTreeMap<String, ConfigValue>,
  externalize: &mut Externalize<'_>,
) -> Result<Machine, ResolveError> {
  let mut scope = MapScope::new();
  for (key, parameter) in schema {
    let Some(value) = values.get(key).or(parameter.default.as_ref()) else {
      continue;
    };

    let resolution = if parameter.sensitive {
      Resolution::Expression(externalize(key, &value.to_string())?)
    } else if value.is_expression() {
      Resolution::Expression(template_expression(&value.to_string()))
    } else {
      Resolution::Value(cast_config_value(key, value, parameter.kind)?)
    };
    scope.insert(format!("{CONFIG_PREFIX}{key}"), resolution);
  }

  for key in values.keys().filter(|key| !schema.contains_key(*key)) {
    debug!(key = %key, "config_value_not_declared");
  }

  Ok(Machine::new().with_scope(scope).require_prefix(CONFIG_PREFIX))
}

/// Simplify `target` against `machine`, leaving alone the `config.*`
/// references of parallel groups that declare their own parameters.
///
/// A required `config.*` reference without a value fails with
/// [`ResolveError::ConfigUnresolved`].
pub fn simplify_isolated<T>(target: &mut T, machine: &Machine) -> Result<(), ResolveError>
where
  T: Serialize + DeserializeOwned,
{
  let mut value = serde_json::to_value(&*target).map_err(ExpressionError::from)?;

  let prefix = isolation_prefix();
  let hide = Machine::new().with_scope(RenamePrefixScope::new(CONFIG_PREFIX, format!("{prefix}.")));
  let hidden = hide_nested_config(&mut value, &hide)?;

  simplify_value(&mut value, machine, "").map_err(unresolved_config)?;

  if hidden {
    let show = Machine::new().with_scope(RenamePrefixScope::new(format!("{prefix}."), CONFIG_PREFIX));
    simplify_value(&mut value, &show, "")?;
  }

  *target = serde_json::from_value(value).map_err(ExpressionError::from)?;
  Ok(())
}

fn unresolved_config(err: ExpressionError) -> ResolveError {
  match err {
    ExpressionError::Unresolved { name, location } if name.starts_with(CONFIG_PREFIX) => {
      ResolveError::ConfigUnresolved {
        key: name[CONFIG_PREFIX.len()..].to_string(),
        location,
      }
    }
    other => other.into(),
  }
}

/// Rename the `config.*` references of parallel groups that declare their
/// own parameters. Returns whether anything was hidden.
fn hide_nested_config(value: &mut Value, hide: &Machine) -> Result<bool, ResolveError> {
  let mut hidden = false;
  match value {
    Value::Object(map) => {
      for (key, item) in map.iter_mut() {
        let own_config = key == "parallel"
          && item
            .get("config")
            .and_then(Value::as_object)
            .is_some_and(|config| !config.is_empty());
        if own_config {
          simplify_value(item, hide, key)?;
          hidden = true;
        } else {
          hidden |= hide_nested_config(item, hide)?;
        }
      }
    }
    Value::Array(items) => {
      for item in items {
        hidden |= hide_nested_config(item, hide)?;
      }
    }
    _ => {}
  }
  Ok(hidden)
}

#[cfg(test)]
mod tests {
  use gauntlet_config::{ParameterType, Step};

  use super::*;

  fn no_externalize() -> impl FnMut(&str, &str) -> Result<String, ResolveError> {
    |key, _| {
      Err(ResolveError::Externalize {
        key: key.to_string(),
        message: "unexpected".to_string(),
      })
    }
  }

  fn workflow(shell: &str) -> Workflow {
    let mut workflow = Workflow::new("wf");
    workflow.spec.config.insert(
      "foo".to_string(),
      ParameterSchema {
        kind: ParameterType::Integer,
        ..Default::default()
      },
    );
    let mut step = Step::named("step");
    step.base.operations.shell = Some(shell.to_string());
    workflow.spec.steps.push(step);
    workflow
  }

  fn shell(workflow: &Workflow) -> &str {
    workflow.spec.steps[0].base.operations.shell.as_deref().unwrap_or_default()
  }

  #[test]
  fn test_apply_workflow_config() {
    let values = [("foo".to_string(), ConfigValue::Int(30))].into();
    let resolved = apply_workflow_config(workflow("abra {{config.foo}}"), &values, &mut no_externalize()).unwrap();
    assert_eq!(shell(&resolved), "abra 30");
  }

  #[test]
  fn test_unknown_function_passes_through() {
    let values = [("foo".to_string(), ConfigValue::Int(30))].into();
    let resolved =
      apply_workflow_config(workflow("some {{ unknown(300) }} value"), &values, &mut no_externalize()).unwrap();
    assert_eq!(shell(&resolved), "some {{ unknown(300) }} value");
  }

  #[test]
  fn test_missing_value_fails() {
    let err = apply_workflow_config(workflow("{{config.foo}}"), &BTreeMap::new(), &mut no_externalize()).unwrap_err();
    assert!(matches!(err.root(), ResolveError::ConfigUnresolved { key, .. } if key == "foo"));
    assert_eq!(
      err.to_string(),
      "spec.steps[0].shell: config.foo is not set and has no default"
    );
  }

  #[test]
  fn test_default_is_used_and_cast() {
    let mut wf = workflow("{{ config.foo + 1 }}");
    wf.spec.config.get_mut("foo").unwrap().default = Some(ConfigValue::from("41"));
    let resolved = apply_workflow_config(wf, &BTreeMap::new(), &mut no_externalize()).unwrap();
    assert_eq!(shell(&resolved), "42");
  }

  #[test]
  fn test_cast_failure() {
    let values = [("foo".to_string(), ConfigValue::from("abc"))].into();
    let err = apply_workflow_config(workflow("{{config.foo}}"), &values, &mut no_externalize()).unwrap_err();
    assert!(matches!(err, ResolveError::ConfigCast { ref key, .. } if key == "foo"));
  }

  #[test]
  fn test_expression_value_is_not_cast() {
    let values = [("foo".to_string(), ConfigValue::from("{{ env.COUNT }}"))].into();
    let resolved = apply_workflow_config(workflow("n={{config.foo}}"), &values, &mut no_externalize()).unwrap();
    assert_eq!(shell(&resolved), "n={{env.COUNT}}");
  }

  fn string_parameter(default: Option<&str>) -> ParameterSchema {
    ParameterSchema {
      kind: ParameterType::String,
      default: default.map(ConfigValue::from),
      ..Default::default()
    }
  }

  #[test]
  fn test_expression_value_resolves_other_config() {
    let mut wf = workflow("curl {{config.url}}");
    wf.spec.config.insert("host".to_string(), string_parameter(Some("db")));
    wf.spec.config.insert("url".to_string(), string_parameter(None));
    let values = [("url".to_string(), ConfigValue::from("http://{{config.host}}:5432"))].into();

    let resolved = apply_workflow_config(wf, &values, &mut no_externalize()).unwrap();
    assert_eq!(shell(&resolved), "curl http://db:5432");
  }

  #[test]
  fn test_expression_value_composes_in_arithmetic() {
    let values = [("foo".to_string(), ConfigValue::from("{{ 40 + 1 }}"))].into();
    let resolved = apply_workflow_config(workflow("{{ config.foo + 1 }}"), &values, &mut no_externalize()).unwrap();
    assert_eq!(shell(&resolved), "42");
  }

  #[test]
  fn test_expression_value_with_missing_reference_fails() {
    let mut wf = workflow("echo {{config.url}}");
    wf.spec.config.insert("host".to_string(), string_parameter(None));
    wf.spec.config.insert("url".to_string(), string_parameter(None));
    let values = [("url".to_string(), ConfigValue::from("x-{{config.host}}"))].into();

    let err = apply_workflow_config(wf, &values, &mut no_externalize()).unwrap_err();
    assert!(matches!(err.root(), ResolveError::ConfigUnresolved { key, .. } if key == "host"));
  }

  #[test]
  fn test_sensitive_value_is_externalized() {
    let mut wf = workflow("login {{config.token}}");
    wf.spec.config.insert(
      "token".to_string(),
      ParameterSchema {
        sensitive: true,
        ..Default::default()
      },
    );
    let values = [("token".to_string(), ConfigValue::from("hunter2"))].into();

    let mut seen = Vec::new();
    let mut externalize = |key: &str, value: &str| {
      seen.push((key.to_string(), value.to_string()));
      Ok::<_, ResolveError>("sensitiveData(\"id-1\")".to_string())
    };
    let resolved = apply_workflow_config(wf, &values, &mut externalize).unwrap();

    assert_eq!(shell(&resolved), "login {{sensitiveData(\"id-1\")}}");
    assert_eq!(seen, vec![("token".to_string(), "hunter2".to_string())]);
    let json = serde_json::to_string(&resolved).unwrap();
    assert!(!json.contains("hunter2"));
  }

  #[test]
  fn test_parallel_with_own_config_is_isolated() {
    let json = serde_json::json!({
      "name": "wf",
      "spec": {
        "config": {"foo": {"type": "integer"}},
        "steps": [{
          "name": "outer {{config.foo}}",
          "parallel": {
            "config": {"inner": {"type": "string"}},
            "steps": [{"shell": "echo {{config.inner}}"}]
          }
        }]
      }
    });
    let wf: Workflow = serde_json::from_value(json).unwrap();
    let values = [("foo".to_string(), ConfigValue::Int(1))].into();

    let resolved = apply_workflow_config(wf, &values, &mut no_externalize()).unwrap();
    let step = &resolved.spec.steps[0];
    assert_eq!(step.base.name, "outer 1");
    let parallel = step.parallel.as_ref().unwrap();
    assert_eq!(
      parallel.spec.steps[0].base.operations.shell.as_deref(),
      Some("echo {{config.inner}}")
    );
  }
}
