use std::collections::BTreeMap;

use gauntlet_config::{ConfigValue, Template, Workflow};
use gauntlet_resolver::{
  ResolveError, TemplateSet, apply_templates, apply_workflow_config, flatten_steps,
  internal_template_name, list_templates,
};
use serde_json::json;

fn template(value: serde_json::Value) -> Template {
  serde_json::from_value(value).unwrap()
}

fn workflow(value: serde_json::Value) -> Workflow {
  serde_json::from_value(value).unwrap()
}

fn templates(list: Vec<Template>) -> TemplateSet {
  list
    .into_iter()
    .map(|template| (internal_template_name(&template.name), template))
    .collect()
}

fn no_secrets(key: &str, _: &str) -> Result<String, ResolveError> {
  Err(ResolveError::Externalize {
    key: key.to_string(),
    message: "no sensitive values expected".to_string(),
  })
}

fn shells(steps: &[gauntlet_config::Step]) -> Vec<String> {
  steps
    .iter()
    .map(|step| step.base.operations.shell.clone().unwrap_or_default())
    .collect()
}

#[test]
fn test_use_order_precedence() {
  let tpls = templates(vec![
    template(json!({
      "name": "top",
      "spec": {"pod": {"labels": {"label1": "a", "label2": "a", "label3": "a"}}}
    })),
    template(json!({
      "name": "middle",
      "spec": {"pod": {"labels": {"label1": "b", "label2": "b"}}}
    })),
  ]);
  let wf = workflow(json!({
    "name": "wf",
    "spec": {
      "pod": {"labels": {"label1": "c"}},
      "use": [{"name": "top"}, {"name": "middle"}],
      "steps": [{"shell": "exit 0"}]
    }
  }));

  let resolved = apply_templates(wf, &tpls, &mut no_secrets).unwrap();

  let labels = &resolved.spec.pod.as_ref().unwrap().labels;
  let expected: BTreeMap<String, String> = [("label1", "c"), ("label2", "b"), ("label3", "a")]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
  assert_eq!(labels, &expected);
  assert!(resolved.spec.r#use.is_empty());
  assert_eq!(shells(&resolved.spec.steps), vec!["exit 0"]);
}

#[test]
fn test_use_list_matches_manual_inlining() {
  let tpls = templates(vec![
    template(json!({"name": "a", "spec": {"steps": [{"shell": "from a"}], "container": {"image": "a:1"}}})),
    template(json!({"name": "b", "spec": {"steps": [{"shell": "from b"}], "container": {"image": "b:1"}}})),
  ]);

  let combined = workflow(json!({
    "name": "wf",
    "spec": {"use": [{"name": "a"}, {"name": "b"}], "steps": [{"shell": "own"}]}
  }));
  let combined = apply_templates(combined, &tpls, &mut no_secrets).unwrap();

  let manual = workflow(json!({"name": "wf", "spec": {"use": [{"name": "b"}], "steps": [{"shell": "own"}]}}));
  let mut manual = apply_templates(manual, &tpls, &mut no_secrets).unwrap();
  manual.spec.r#use.push(gauntlet_config::TemplateRef::new("a"));
  let manual = apply_templates(manual, &tpls, &mut no_secrets).unwrap();

  assert_eq!(combined, manual);
  assert_eq!(shells(&combined.spec.steps), vec!["from a", "from b", "own"]);
  assert_eq!(combined.spec.container.unwrap().image, "b:1");
}

#[test]
fn test_root_setup_and_after_wrap_existing() {
  let tpls = templates(vec![template(json!({
    "name": "wrap",
    "spec": {
      "setup": [{"shell": "tpl setup"}],
      "steps": [{"shell": "tpl step"}],
      "after": [{"shell": "tpl after"}]
    }
  }))]);
  let wf = workflow(json!({
    "name": "wf",
    "spec": {
      "use": [{"name": "wrap"}],
      "setup": [{"shell": "own setup"}],
      "steps": [{"shell": "own step"}],
      "after": [{"shell": "own after"}]
    }
  }));

  let resolved = apply_templates(wf, &tpls, &mut no_secrets).unwrap();

  assert_eq!(shells(&resolved.spec.setup), vec!["tpl setup", "own setup"]);
  assert_eq!(shells(&resolved.spec.steps), vec!["tpl step", "own step"]);
  assert_eq!(shells(&resolved.spec.after), vec!["own after", "tpl after"]);
}

#[test]
fn test_template_config_is_applied_per_reference() {
  let tpls = templates(vec![template(json!({
    "name": "official/echo",
    "spec": {
      "config": {"word": {"type": "string", "default": "default"}},
      "steps": [{"shell": "echo {{config.word}}"}]
    }
  }))]);
  let wf = workflow(json!({
    "name": "wf",
    "spec": {
      "steps": [
        {"name": "first", "use": [{"name": "official/echo", "config": {"word": "one"}}]},
        {"name": "second", "use": [{"name": "official--echo"}]}
      ]
    }
  }));

  let resolved = apply_templates(wf, &tpls, &mut no_secrets).unwrap();

  assert_eq!(shells(&resolved.spec.steps[0].steps), vec!["echo one"]);
  assert_eq!(shells(&resolved.spec.steps[1].steps), vec!["echo default"]);
}

#[test]
fn test_host_config_survives_template_injection() {
  let tpls = templates(vec![template(json!({
    "name": "base",
    "spec": {"steps": [{"shell": "template step"}]}
  }))]);
  let wf = workflow(json!({
    "name": "wf",
    "spec": {
      "config": {"foo": {"type": "integer"}},
      "use": [{"name": "base"}],
      "steps": [{"shell": "abra {{config.foo}}"}]
    }
  }));

  let resolved = apply_templates(wf, &tpls, &mut no_secrets).unwrap();
  assert_eq!(shells(&resolved.spec.steps), vec!["template step", "abra {{config.foo}}"]);

  let values = BTreeMap::from([("foo".to_string(), ConfigValue::Int(30))]);
  let configured = apply_workflow_config(resolved, &values, &mut no_secrets).unwrap();
  assert_eq!(shells(&configured.spec.steps), vec!["template step", "abra 30"]);
}

#[test]
fn test_missing_template_reports_path() {
  let wf = workflow(json!({
    "name": "wf",
    "spec": {"steps": [{"shell": "a"}, {"steps": [{"use": [{"name": "ghost"}]}]}]}
  }));

  let err = apply_templates(wf, &TemplateSet::new(), &mut no_secrets).unwrap_err();

  assert_eq!(
    err.to_string(),
    "spec.steps[1].steps[0].use[0]: resolving template: template \"ghost\" not found"
  );
  assert!(matches!(err.root(), ResolveError::TemplateNotFound { name } if name == "ghost"));
}

#[test]
fn test_missing_root_template_reports_path() {
  let wf = workflow(json!({"name": "wf", "spec": {"use": [{"name": "ok"}, {"name": "ghost"}]}}));
  let tpls = templates(vec![template(json!({"name": "ok"}))]);

  let err = apply_templates(wf, &tpls, &mut no_secrets).unwrap_err();
  assert_eq!(
    err.to_string(),
    "spec.use[1]: resolving template: template \"ghost\" not found"
  );
}

#[test]
fn test_parallel_templates_are_resolved() {
  let tpls = templates(vec![
    template(json!({"name": "inner", "spec": {"steps": [{"shell": "inner step"}]}})),
    template(json!({"name": "alias", "spec": {"steps": [{"shell": "alias step"}]}})),
  ]);
  let wf = workflow(json!({
    "name": "wf",
    "spec": {
      "steps": [{
        "name": "group",
        "parallel": {
          "parallelism": 2,
          "template": {"name": "alias"},
          "optional": true,
          "use": [{"name": "inner"}],
          "steps": [{"shell": "own"}]
        }
      }]
    }
  }));

  let resolved = apply_templates(wf, &tpls, &mut no_secrets).unwrap();

  let parallel = resolved.spec.steps[0].parallel.as_ref().unwrap();
  assert!(parallel.template.is_none());
  assert!(parallel.spec.r#use.is_empty());
  assert_eq!(parallel.control.optional, None);
  let lead = &parallel.spec.steps[1];
  assert_eq!(lead.base.control.optional, Some(true));
  assert_eq!(shells(&lead.steps), vec!["alias step"]);
  assert_eq!(parallel.spec.steps[0].base.operations.shell.as_deref(), Some("inner step"));
  assert_eq!(parallel.spec.steps[2].base.operations.shell.as_deref(), Some("own"));
}

#[test]
fn test_duplicate_target_between_templates() {
  let tpls = templates(vec![
    template(json!({"name": "x", "spec": {"execution": {"target": {"match": {"zone": ["a"]}}}}})),
    template(json!({"name": "y", "spec": {"execution": {"target": {"match": {"zone": ["b"]}}}}})),
  ]);
  let wf = workflow(json!({"name": "wf", "spec": {"use": [{"name": "x"}, {"name": "y"}]}}));

  let err = apply_templates(wf, &tpls, &mut no_secrets).unwrap_err();
  assert!(matches!(err.root(), ResolveError::DuplicateTarget { .. }));
}

#[test]
fn test_host_target_wins() {
  let tpls = templates(vec![template(
    json!({"name": "x", "spec": {"execution": {"target": {"match": {"zone": ["a"]}}, "tags": {"t": "x"}}}}),
  )]);
  let wf = workflow(json!({
    "name": "wf",
    "spec": {"use": [{"name": "x"}], "execution": {"target": {"match": {"zone": ["host"]}}}}
  }));

  let resolved = apply_templates(wf, &tpls, &mut no_secrets).unwrap();
  let execution = resolved.spec.execution.unwrap();
  assert_eq!(execution.target.unwrap().r#match["zone"], vec!["host"]);
  assert_eq!(execution.tags["t"], "x");
}

#[test]
fn test_resolved_tree_is_flat_and_stable() {
  let tpls = templates(vec![template(json!({"name": "multi", "spec": {"steps": [{"shell": "a"}, {"shell": "b"}]}}))]);
  let wf = workflow(json!({
    "name": "wf",
    "spec": {"steps": [{"template": {"name": "multi"}}, {"shell": "c"}]}
  }));

  let resolved = apply_templates(wf, &tpls, &mut no_secrets).unwrap();
  assert_eq!(shells(&resolved.spec.steps), vec!["a", "b", "c"]);
  assert_eq!(flatten_steps(resolved.spec.steps.clone()), resolved.spec.steps);

  let again = apply_templates(resolved.clone(), &tpls, &mut no_secrets).unwrap();
  assert_eq!(again, resolved);
  assert!(list_templates(&resolved).is_empty());
}
