use std::collections::BTreeSet;

use gauntlet_config::{ServiceSpec, Step, TemplateRef, Workflow, WorkflowSpec, internal_template_name};

/// Every template a workflow references, by internal name.
///
/// `a/b` and `a--b` count as the same template.
pub fn list_templates(workflow: &Workflow) -> BTreeSet<String> {
  let mut names = BTreeSet::new();
  collect_spec(&workflow.spec, &mut names);
  names
}

fn add(names: &mut BTreeSet<String>, references: &[TemplateRef]) {
  names.extend(
    references
      .iter()
      .map(|reference| internal_template_name(&reference.name)),
  );
}

fn collect_services<'a>(services: impl Iterator<Item = &'a ServiceSpec>, names: &mut BTreeSet<String>) {
  for service in services {
    add(names, &service.r#use);
  }
}

fn collect_spec(spec: &WorkflowSpec, names: &mut BTreeSet<String>) {
  add(names, &spec.r#use);
  collect_services(spec.services.values(), names);
  for step in spec.setup.iter().chain(&spec.steps).chain(&spec.after) {
    collect_step(step, names);
  }
}

fn collect_step(step: &Step, names: &mut BTreeSet<String>) {
  add(names, &step.r#use);
  if let Some(template) = &step.template {
    add(names, std::slice::from_ref(template));
  }
  collect_services(step.services.values(), names);
  if let Some(parallel) = &step.parallel {
    if let Some(template) = &parallel.template {
      add(names, std::slice::from_ref(template));
    }
    collect_spec(&parallel.spec, names);
  }
  for child in step.setup.iter().chain(&step.steps) {
    collect_step(child, names);
  }
}
