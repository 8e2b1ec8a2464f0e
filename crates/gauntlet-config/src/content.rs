use serde::{Deserialize, Serialize};

/// Files and repositories made available to a workflow, service or step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Content {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub git: Option<ContentGit>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub files: Vec<ContentFile>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tarball: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentGit {
  pub uri: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub revision: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentFile {
  pub path: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mode: Option<u32>,
}
