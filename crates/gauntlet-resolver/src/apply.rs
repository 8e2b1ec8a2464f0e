//! Injection of templates into workflows, steps and services.

use std::collections::BTreeMap;
use std::mem;

use gauntlet_config::{
  ExecutionTarget, ServiceSpec, Step, StepBase, Template, TemplateRef, Workflow, WorkflowSpec,
  display_template_name, internal_template_name,
};
use gauntlet_expression::{Machine, RenamePrefixScope, simplify};
use tracing::debug;

use crate::config::apply_template_config;
use crate::error::ResolveError;
use crate::flatten::flatten_steps;
use crate::merge::{
  merge_concurrency, merge_container, merge_container_config, merge_content, merge_execution,
  merge_job, merge_pod, merge_system, prepend,
};
use crate::{CONFIG_PREFIX, Externalize, TemplateSet, isolation_prefix};

/// Inject every template referenced by the workflow.
///
/// `use` lists are applied from last to first with the host winning every
/// merge, so earlier entries take precedence over later ones. Each reference
/// is configured on its own copy of the template. Wrapper steps left behind
/// are flattened.
pub fn apply_templates(
  workflow: Workflow,
  templates: &TemplateSet,
  externalize: &mut Externalize<'_>,
) -> Result<Workflow, ResolveError> {
  let mut workflow = workflow;
  apply_templates_to_spec(&mut workflow.spec, templates, externalize)?;
  debug!(workflow = %workflow.name, "templates_applied");
  Ok(workflow)
}

/// Put `reference` in front of the root `use` list and of the `use` list of
/// every parallel group.
pub fn add_global_template_ref(workflow: &mut Workflow, reference: &TemplateRef) {
  add_global_template_ref_to_spec(&mut workflow.spec, reference);
}

fn add_global_template_ref_to_spec(spec: &mut WorkflowSpec, reference: &TemplateRef) {
  spec.r#use.insert(0, reference.clone());
  for step in spec
    .setup
    .iter_mut()
    .chain(spec.steps.iter_mut())
    .chain(spec.after.iter_mut())
  {
    add_global_template_ref_to_step(step, reference);
  }
}

fn add_global_template_ref_to_step(step: &mut Step, reference: &TemplateRef) {
  if let Some(parallel) = step.parallel.as_mut() {
    add_global_template_ref_to_spec(&mut parallel.spec, reference);
  }
  for child in step.setup.iter_mut().chain(step.steps.iter_mut()) {
    add_global_template_ref_to_step(child, reference);
  }
}

fn get_template<'a>(name: &str, templates: &'a TemplateSet) -> Result<&'a Template, ResolveError> {
  let internal = internal_template_name(name);
  templates
    .get(&internal)
    .or_else(|| templates.get(&display_template_name(&internal)))
    .ok_or_else(|| ResolveError::TemplateNotFound {
      name: name.to_string(),
    })
}

fn configured_template(
  reference: &TemplateRef,
  templates: &TemplateSet,
  externalize: &mut Externalize<'_>,
) -> Result<Template, ResolveError> {
  let template = get_template(&reference.name, templates)?;
  apply_template_config(template, &reference.config, externalize)
}

fn into_steps(steps: Vec<gauntlet_config::IndependentStep>) -> Vec<Step> {
  steps.into_iter().map(Step::from).collect()
}

fn merge_services(
  template: BTreeMap<String, gauntlet_config::IndependentServiceSpec>,
  existing: BTreeMap<String, ServiceSpec>,
) -> BTreeMap<String, ServiceSpec> {
  let mut result: BTreeMap<String, ServiceSpec> = template
    .into_iter()
    .map(|(name, service)| (name, ServiceSpec::from(service)))
    .collect();
  result.extend(existing);
  result
}

fn inject_template_to_spec(spec: &mut WorkflowSpec, template: Template) {
  let tpl = template.spec;

  spec.pod = merge_pod(tpl.pod, spec.pod.take());
  spec.job = merge_job(tpl.job, spec.job.take());
  spec.execution = merge_execution(tpl.execution, spec.execution.take());
  spec.concurrency = merge_concurrency(tpl.concurrency, spec.concurrency.take());

  spec.content = merge_content(tpl.content, spec.content.take());
  spec.services = merge_services(tpl.services, mem::take(&mut spec.services));
  spec.container = merge_container(tpl.container, spec.container.take());
  spec.system = merge_system(tpl.system, spec.system.take());

  spec.setup = prepend(into_steps(tpl.setup), mem::take(&mut spec.setup));
  spec.steps = prepend(into_steps(tpl.steps), mem::take(&mut spec.steps));
  spec.after.extend(into_steps(tpl.after));
}

/// Merge a template into a single step. The template's steps run before the
/// step's own children, its `after` steps after them.
pub(crate) fn inject_step_template(step: &mut Step, template: Template) {
  let tpl = template.spec;

  step.base.content = merge_content(tpl.content, step.base.content.take());
  step.services = merge_services(tpl.services, mem::take(&mut step.services));
  step.base.container = merge_container(tpl.container, step.base.container.take());

  let pure_by_default = tpl
    .system
    .as_ref()
    .and_then(|system| system.pure_by_default)
    .unwrap_or(false);
  if pure_by_default && step.base.pure.is_none() {
    step.base.pure = Some(true);
  }

  if tpl.setup.is_empty() && tpl.steps.is_empty() && tpl.after.is_empty() {
    return;
  }

  step.setup = prepend(into_steps(tpl.setup), mem::take(&mut step.setup));
  let mut steps = into_steps(tpl.steps);
  steps.append(&mut step.steps);
  steps.extend(into_steps(tpl.after));
  step.steps = steps;
}

fn inject_service_template(service: &mut ServiceSpec, template: Template) {
  let tpl = template.spec;
  service.base.pod = merge_pod(tpl.pod, service.base.pod.take());
  service.base.content = merge_content(tpl.content, service.base.content.take());
  if let Some(container) = tpl.container {
    service.base.container = merge_container_config(container, mem::take(&mut service.base.container));
  }
}

fn apply_templates_to_services(
  services: &mut BTreeMap<String, ServiceSpec>,
  templates: &TemplateSet,
  externalize: &mut Externalize<'_>,
) -> Result<(), ResolveError> {
  for (name, service) in services.iter_mut() {
    let uses = mem::take(&mut service.r#use);
    for (i, reference) in uses.iter().enumerate().rev() {
      let path = format!("services[{name}].use[{i}]");
      let template = configured_template(reference, templates, externalize)
        .map_err(|e| e.context(format!("{path}: resolving template")))?;

      let misuse = |reason: &str| {
        ResolveError::TemplateMisuse {
          name: reference.name.clone(),
          reason: reason.to_string(),
        }
        .context(path.clone())
      };
      let spec = &template.spec;
      if !spec.setup.is_empty() || !spec.steps.is_empty() || !spec.after.is_empty() {
        return Err(misuse("steps in template used for the service are not supported"));
      }
      if !spec.services.is_empty() {
        return Err(misuse(
          "additional services in template used for the service are not supported",
        ));
      }

      inject_service_template(service, template);
    }
  }
  Ok(())
}

/// Check that the templates of one `use` pass agree on the execution target.
fn check_target(
  owner: &mut Option<(String, ExecutionTarget)>,
  reference: &TemplateRef,
  template: &Template,
) -> Result<(), ResolveError> {
  let Some(target) = template
    .spec
    .execution
    .as_ref()
    .and_then(|execution| execution.target.as_ref())
  else {
    return Ok(());
  };

  match owner {
    Some((first, existing)) if existing != target => Err(ResolveError::DuplicateTarget {
      first: first.clone(),
      second: reference.name.clone(),
    }),
    Some(_) => Ok(()),
    None => {
      *owner = Some((reference.name.clone(), target.clone()));
      Ok(())
    }
  }
}

fn apply_templates_to_spec(
  spec: &mut WorkflowSpec,
  templates: &TemplateSet,
  externalize: &mut Externalize<'_>,
) -> Result<(), ResolveError> {
  // Hide the host's own config references while templates are merged in.
  let prefix = format!("{}.", isolation_prefix());
  simplify(spec, &Machine::new().with_scope(RenamePrefixScope::new(CONFIG_PREFIX, prefix.as_str())))?;

  let result = apply_templates_to_isolated_spec(spec, templates, externalize);

  simplify(spec, &Machine::new().with_scope(RenamePrefixScope::new(prefix.as_str(), CONFIG_PREFIX)))?;
  result
}

fn apply_templates_to_isolated_spec(
  spec: &mut WorkflowSpec,
  templates: &TemplateSet,
  externalize: &mut Externalize<'_>,
) -> Result<(), ResolveError> {
  let uses = mem::take(&mut spec.r#use);
  let mut target_owner = None;
  for (i, reference) in uses.iter().enumerate().rev() {
    let template = configured_template(reference, templates, externalize)
      .map_err(|e| e.context(format!("spec.use[{i}]: resolving template")))?;
    check_target(&mut target_owner, reference, &template)
      .map_err(|e| e.context(format!("spec.use[{i}]: injecting template")))?;
    inject_template_to_spec(spec, template);
  }

  apply_templates_to_services(&mut spec.services, templates, externalize)?;

  for (kind, steps) in [
    ("setup", &mut spec.setup),
    ("steps", &mut spec.steps),
    ("after", &mut spec.after),
  ] {
    for (i, step) in steps.iter_mut().enumerate() {
      apply_templates_to_step(step, templates, externalize)
        .map_err(|e| e.context(format!("spec.{kind}[{i}]")))?;
    }
  }

  spec.setup = flatten_steps(mem::take(&mut spec.setup));
  spec.steps = flatten_steps(mem::take(&mut spec.steps));
  spec.after = flatten_steps(mem::take(&mut spec.after));
  Ok(())
}

fn apply_templates_to_step(
  step: &mut Step,
  templates: &TemplateSet,
  externalize: &mut Externalize<'_>,
) -> Result<(), ResolveError> {
  let uses = mem::take(&mut step.r#use);
  for (i, reference) in uses.iter().enumerate().rev() {
    let template = configured_template(reference, templates, externalize)
      .map_err(|e| e.context(format!(".use[{i}]: resolving template")))?;
    inject_step_template(step, template);
  }

  if let Some(reference) = step.template.take() {
    let template = configured_template(&reference, templates, externalize)
      .map_err(|e| e.context(".template: resolving template"))?;
    let mut isolate = Step::default();
    inject_step_template(&mut isolate, template);

    if !isolate.setup.is_empty() || !isolate.steps.is_empty() {
      let bare = isolate.base.container.is_none()
        && isolate.base.content.is_none()
        && isolate.base.working_dir.is_none()
        && isolate.services.is_empty();
      if bare {
        let mut children = mem::take(&mut isolate.setup);
        children.append(&mut isolate.steps);
        children.append(&mut step.steps);
        step.steps = children;
      } else {
        step.steps.insert(0, isolate);
      }
    }
  }

  apply_templates_to_services(&mut step.services, templates, externalize)?;

  if let Some(parallel) = step.parallel.as_mut() {
    // Move the template alias into a leading step, along with the
    // operations it applies to.
    if let Some(template) = parallel.template.take() {
      let lead = Step {
        base: StepBase {
          control: mem::take(&mut parallel.control),
          operations: mem::take(&mut parallel.operations),
          ..Default::default()
        },
        template: Some(template),
        ..Default::default()
      };
      parallel.spec.steps.insert(0, lead);
    }

    apply_templates_to_spec(&mut parallel.spec, templates, externalize)
      .map_err(|e| e.context(".parallel"))?;
  }

  for (i, child) in step.setup.iter_mut().enumerate() {
    apply_templates_to_step(child, templates, externalize).map_err(|e| e.context(format!(".setup[{i}]")))?;
  }
  for (i, child) in step.steps.iter_mut().enumerate() {
    apply_templates_to_step(child, templates, externalize).map_err(|e| e.context(format!(".steps[{i}]")))?;
  }

  step.setup = flatten_steps(mem::take(&mut step.setup));
  step.steps = flatten_steps(mem::take(&mut step.steps));
  Ok(())
}
