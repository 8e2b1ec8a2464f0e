use std::collections::{BTreeMap, BTreeSet};

/// Default upper bound for the data held by a single secret object.
pub const DEFAULT_MAX_OBJECT_SIZE: usize = 750 * 1024;

/// A single secret object ready to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretObject {
  pub name: String,
  pub data: BTreeMap<String, String>,
}

impl SecretObject {
  fn size(&self) -> usize {
    self.data.iter().map(|(key, value)| key.len() + value.len()).sum()
  }
}

/// Where a value appended to a [`SecretBatch`] ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
  pub name: String,
  pub key: String,
}

/// Accumulates values for one owner into size-capped secret objects.
///
/// The first object is named `<prefix><name>`, the following ones get a
/// `-<n>` suffix. Keys are sanitized and made unique across the batch.
#[derive(Debug, Clone)]
pub struct SecretBatch {
  prefix: String,
  name: String,
  max_object_size: usize,
  objects: Vec<SecretObject>,
  keys: BTreeSet<String>,
}

impl SecretBatch {
  pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      name: name.into(),
      max_object_size: DEFAULT_MAX_OBJECT_SIZE,
      objects: Vec::new(),
      keys: BTreeSet::new(),
    }
  }

  pub fn with_max_object_size(mut self, size: usize) -> Self {
    self.max_object_size = size;
    self
  }

  /// Store `value` under a key derived from `key`.
  pub fn append(&mut self, key: &str, value: &str) -> SecretRef {
    let key = self.unique_key(key);
    let size = key.len() + value.len();

    let index = match self.objects.last() {
      Some(object) if object.size() + size <= self.max_object_size => self.objects.len() - 1,
      _ => {
        let name = match self.objects.len() {
          0 => format!("{}{}", self.prefix, self.name),
          n => format!("{}{}-{}", self.prefix, self.name, n),
        };
        self.objects.push(SecretObject {
          name,
          data: BTreeMap::new(),
        });
        self.objects.len() - 1
      }
    };

    let object = &mut self.objects[index];
    object.data.insert(key.clone(), value.to_string());

    SecretRef {
      name: object.name.clone(),
      key,
    }
  }

  fn unique_key(&mut self, key: &str) -> String {
    let base: String = key
      .chars()
      .map(|c| match c {
        'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
        _ => '_',
      })
      .collect();
    let base = if base.is_empty() { "value".to_string() } else { base };

    let mut candidate = base.clone();
    let mut suffix = 1;
    while self.keys.contains(&candidate) {
      candidate = format!("{base}-{suffix}");
      suffix += 1;
    }
    self.keys.insert(candidate.clone());
    candidate
  }

  pub fn objects(&self) -> &[SecretObject] {
    &self.objects
  }

  pub fn names(&self) -> Vec<String> {
    self.objects.iter().map(|object| object.name.clone()).collect()
  }
}
