//! Cached, bounded-parallel loading of workflow and template definitions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use gauntlet_config::{Template, Workflow, internal_template_name};
use gauntlet_resolver::{ResolveError, TemplateSet, display_template_name, list_templates};
use gauntlet_store::{StoreError, TemplateStore, WorkflowStore};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::request::ResourceSelector;

/// Loads the workflows a batch selects, once per name or label set.
pub struct WorkflowFetcher {
  store: Arc<dyn WorkflowStore>,
  environment_id: String,
  concurrency: usize,
  by_name: RwLock<HashMap<String, Workflow>>,
  /// Workflow names matched by each label set.
  by_labels: RwLock<Vec<(BTreeMap<String, String>, Vec<String>)>>,
}

impl WorkflowFetcher {
  pub fn new(store: Arc<dyn WorkflowStore>, environment_id: impl Into<String>, concurrency: usize) -> Self {
    Self {
      store,
      environment_id: environment_id.into(),
      concurrency: concurrency.max(1),
      by_name: RwLock::new(HashMap::new()),
      by_labels: RwLock::new(Vec::new()),
    }
  }

  fn is_cached(&self, selector: &ResourceSelector) -> bool {
    if selector.name.is_empty() {
      self
        .by_labels
        .read()
        .iter()
        .any(|(labels, _)| labels == &selector.labels)
    } else {
      self.by_name.read().contains_key(&selector.name)
    }
  }

  /// Load the workflows of a single selector, unless already cached.
  pub async fn prefetch(&self, selector: &ResourceSelector) -> Result<(), StoreError> {
    if self.is_cached(selector) {
      return Ok(());
    }

    if !selector.name.is_empty() {
      let workflow = self.store.get(&self.environment_id, &selector.name).await?;
      self.by_name.write().insert(selector.name.clone(), workflow);
      return Ok(());
    }

    let workflows = self.store.list(&self.environment_id, &selector.labels).await?;
    let names = workflows.iter().map(|workflow| workflow.name.clone()).collect();
    {
      let mut by_name = self.by_name.write();
      for workflow in workflows {
        by_name.insert(workflow.name.clone(), workflow);
      }
    }
    self.by_labels.write().push((selector.labels.clone(), names));
    Ok(())
  }

  /// Load the workflows of every selector. The first failure is returned.
  pub async fn prefetch_many(&self, selectors: &[ResourceSelector]) -> Result<(), StoreError> {
    let mut unique: Vec<&ResourceSelector> = Vec::new();
    for selector in selectors {
      if !unique.contains(&selector) {
        unique.push(selector);
      }
    }

    stream::iter(unique.into_iter().map(Ok::<_, StoreError>))
      .try_for_each_concurrent(self.concurrency, |selector| self.prefetch(selector))
      .await
  }

  /// Workflows matched by a selector, sorted by name for label selectors.
  pub async fn get(&self, selector: &ResourceSelector) -> Result<Vec<Workflow>, StoreError> {
    self.prefetch(selector).await?;

    let by_name = self.by_name.read();
    if !selector.name.is_empty() {
      return by_name
        .get(&selector.name)
        .cloned()
        .map(|workflow| vec![workflow])
        .ok_or_else(|| StoreError::NotFound(format!("workflow {}", selector.name)));
    }

    let by_labels = self.by_labels.read();
    let mut names = by_labels
      .iter()
      .find(|(labels, _)| labels == &selector.labels)
      .map(|(_, names)| names.clone())
      .unwrap_or_default();
    names.sort();
    Ok(
      names
        .iter()
        .filter_map(|name| by_name.get(name).cloned())
        .collect(),
    )
  }

  /// Internal names of every template referenced by a loaded workflow.
  pub fn template_names(&self) -> BTreeSet<String> {
    self
      .by_name
      .read()
      .values()
      .flat_map(list_templates)
      .collect()
  }
}

/// Loads templates by name, accepting both display and internal spelling.
pub struct TemplateFetcher {
  store: Arc<dyn TemplateStore>,
  environment_id: String,
  concurrency: usize,
  cache: RwLock<HashMap<String, Template>>,
}

impl TemplateFetcher {
  pub fn new(store: Arc<dyn TemplateStore>, environment_id: impl Into<String>, concurrency: usize) -> Self {
    Self {
      store,
      environment_id: environment_id.into(),
      concurrency: concurrency.max(1),
      cache: RwLock::new(HashMap::new()),
    }
  }

  /// Register a template that does not come from the store.
  pub fn set_cache(&self, name: &str, template: Template) {
    self.cache.write().insert(internal_template_name(name), template);
  }

  pub async fn prefetch(&self, name: &str) -> Result<(), StoreError> {
    let key = internal_template_name(name);
    if self.cache.read().contains_key(&key) {
      return Ok(());
    }
    let template = self
      .store
      .get(&self.environment_id, &display_template_name(&key))
      .await?;
    self.cache.write().insert(key, template);
    Ok(())
  }

  /// Load every template. Failures do not stop the other loads; the first
  /// one is returned once all are done.
  pub async fn prefetch_many(&self, names: &BTreeSet<String>) -> Result<(), StoreError> {
    let first_error = Mutex::new(None);
    stream::iter(names)
      .for_each_concurrent(self.concurrency, |name| {
        let first_error = &first_error;
        async move {
          if let Err(err) = self.prefetch(name).await {
            debug!(template = %name, error = %err, "template_prefetch_failed");
            first_error.lock().get_or_insert(err);
          }
        }
      })
      .await;

    match first_error.into_inner() {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  /// Templates by internal name, loading the ones not cached yet.
  pub async fn get_many(&self, names: &BTreeSet<String>) -> Result<TemplateSet, SchedulerError> {
    let mut templates = TemplateSet::new();
    for name in names {
      let key = internal_template_name(name);
      match self.prefetch(&key).await {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => {
          return Err(
            ResolveError::TemplateNotFound {
              name: display_template_name(&key),
            }
            .into(),
          );
        }
        Err(err) => {
          warn!(template = %name, error = %err, "template_fetch_failed");
          return Err(err.into());
        }
      }
      if let Some(template) = self.cache.read().get(&key) {
        templates.insert(key, template.clone());
      }
    }
    Ok(templates)
  }
}
