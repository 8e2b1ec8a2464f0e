//! Field level merge rules used when a template is injected into a host.
//!
//! Every function takes the template's part first and the host's (existing)
//! part second. The host wins on conflicts; list-like fields get the
//! template's entries first.

use std::collections::BTreeMap;

use gauntlet_config::{
  ConcurrencyPolicy, ContainerConfig, Content, EnvVar, ExecutionSpec, JobConfig, PodConfig,
  Resources, SystemConfig,
};

fn merge_option<T>(
  template: Option<T>,
  existing: Option<T>,
  merge: impl FnOnce(T, T) -> T,
) -> Option<T> {
  match (template, existing) {
    (Some(template), Some(existing)) => Some(merge(template, existing)),
    (template, existing) => existing.or(template),
  }
}

fn merge_map<V>(template: BTreeMap<String, V>, existing: BTreeMap<String, V>) -> BTreeMap<String, V> {
  let mut result = template;
  result.extend(existing);
  result
}

pub(crate) fn prepend<T>(template: Vec<T>, existing: Vec<T>) -> Vec<T> {
  let mut result = template;
  result.extend(existing);
  result
}

fn non_empty_or(existing: String, template: String) -> String {
  if existing.is_empty() { template } else { existing }
}

/// Remove repeated variables by name. The last value wins, at the position of
/// the first occurrence.
pub fn dedupe_env(env: Vec<EnvVar>) -> Vec<EnvVar> {
  let mut positions: BTreeMap<String, usize> = BTreeMap::new();
  let mut result: Vec<EnvVar> = Vec::with_capacity(env.len());
  for var in env {
    match positions.get(&var.name) {
      Some(&index) => result[index] = var,
      None => {
        positions.insert(var.name.clone(), result.len());
        result.push(var);
      }
    }
  }
  result
}

pub(crate) fn merge_pod(template: Option<PodConfig>, existing: Option<PodConfig>) -> Option<PodConfig> {
  merge_option(template, existing, |template, existing| PodConfig {
    service_account_name: non_empty_or(existing.service_account_name, template.service_account_name),
    image_pull_secrets: prepend(template.image_pull_secrets, existing.image_pull_secrets),
    node_selector: merge_map(template.node_selector, existing.node_selector),
    labels: merge_map(template.labels, existing.labels),
    annotations: merge_map(template.annotations, existing.annotations),
    volumes: prepend(template.volumes, existing.volumes),
  })
}

pub(crate) fn merge_job(template: Option<JobConfig>, existing: Option<JobConfig>) -> Option<JobConfig> {
  merge_option(template, existing, |template, existing| JobConfig {
    labels: merge_map(template.labels, existing.labels),
    annotations: merge_map(template.annotations, existing.annotations),
    active_deadline_seconds: existing.active_deadline_seconds.or(template.active_deadline_seconds),
  })
}

pub(crate) fn merge_content(template: Option<Content>, existing: Option<Content>) -> Option<Content> {
  merge_option(template, existing, |template, existing| Content {
    git: existing.git.or(template.git),
    files: prepend(template.files, existing.files),
    tarball: existing.tarball.or(template.tarball),
  })
}

pub(crate) fn merge_container_config(template: ContainerConfig, existing: ContainerConfig) -> ContainerConfig {
  let mut command = template.command;
  let mut args = template.args;
  if !existing.image.is_empty() {
    command = None;
    args = None;
  }
  if existing.command.is_some() {
    args = None;
  }

  ContainerConfig {
    working_dir: existing.working_dir.or(template.working_dir),
    image: non_empty_or(existing.image, template.image),
    image_pull_policy: non_empty_or(existing.image_pull_policy, template.image_pull_policy),
    env: dedupe_env(prepend(template.env, existing.env)),
    env_from: prepend(template.env_from, existing.env_from),
    command: existing.command.or(command),
    args: existing.args.or(args),
    resources: merge_option(template.resources, existing.resources, |template, existing| Resources {
      limits: merge_map(template.limits, existing.limits),
      requests: merge_map(template.requests, existing.requests),
    }),
    security_context: existing.security_context.or(template.security_context),
  }
}

pub(crate) fn merge_container(
  template: Option<ContainerConfig>,
  existing: Option<ContainerConfig>,
) -> Option<ContainerConfig> {
  merge_option(template, existing, merge_container_config)
}

pub(crate) fn merge_system(template: Option<SystemConfig>, existing: Option<SystemConfig>) -> Option<SystemConfig> {
  merge_option(template, existing, |template, existing| SystemConfig {
    pure_by_default: existing.pure_by_default.or(template.pure_by_default),
    isolated_containers: existing.isolated_containers.or(template.isolated_containers),
  })
}

pub(crate) fn merge_execution(
  template: Option<ExecutionSpec>,
  existing: Option<ExecutionSpec>,
) -> Option<ExecutionSpec> {
  merge_option(template, existing, |template, existing| ExecutionSpec {
    tags: merge_map(template.tags, existing.tags),
    target: existing.target.or(template.target),
  })
}

pub(crate) fn merge_concurrency(
  template: Option<ConcurrencyPolicy>,
  existing: Option<ConcurrencyPolicy>,
) -> Option<ConcurrencyPolicy> {
  existing.or(template)
}
