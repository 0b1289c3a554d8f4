//! Named title/description templates persisted as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use validator::Validate;

use shortsmith_models::MetadataTemplate;

#[derive(Debug, Error)]
pub enum TemplateStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A saved template pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NamedTemplate {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 1000))]
    pub title: String,
    #[validate(length(max = 20000))]
    pub description: String,
}

impl NamedTemplate {
    pub fn template(&self) -> MetadataTemplate {
        MetadataTemplate::new(&self.title, &self.description)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    templates: Vec<NamedTemplate>,
}

/// Template library backed by a single JSON file.
pub struct TemplateStore {
    path: PathBuf,
    templates: RwLock<Vec<NamedTemplate>>,
}

impl TemplateStore {
    /// Load the library. A missing or unreadable file yields an empty one.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let templates = match read_file(&path).await {
            Ok(file) => {
                info!("Loaded {} templates from {}", file.templates.len(), path.display());
                file.templates
            }
            Err(TemplateStoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Vec::new()
            }
            Err(e) => {
                warn!("Ignoring template file {}: {}", path.display(), e);
                Vec::new()
            }
        };

        Self {
            path,
            templates: RwLock::new(templates),
        }
    }

    pub async fn list(&self) -> Vec<NamedTemplate> {
        self.templates.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<NamedTemplate> {
        self.templates
            .read()
            .await
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Insert or replace by name. Memory only changes once the file is written.
    pub async fn upsert(&self, template: NamedTemplate) -> Result<(), TemplateStoreError> {
        let mut templates = self.templates.write().await;
        let mut updated = templates.clone();
        match updated.iter_mut().find(|t| t.name == template.name) {
            Some(existing) => *existing = template,
            None => updated.push(template),
        }
        self.persist(&updated).await?;
        *templates = updated;
        Ok(())
    }

    /// Remove by name; `false` when no template had that name.
    pub async fn remove(&self, name: &str) -> Result<bool, TemplateStoreError> {
        let mut templates = self.templates.write().await;
        let updated: Vec<NamedTemplate> = templates
            .iter()
            .filter(|t| t.name != name)
            .cloned()
            .collect();
        if updated.len() == templates.len() {
            return Ok(false);
        }
        self.persist(&updated).await?;
        *templates = updated;
        Ok(true)
    }

    /// Write through a sibling temp file so a crash never leaves half a file.
    async fn persist(&self, templates: &[NamedTemplate]) -> Result<(), TemplateStoreError> {
        let file = TemplateFile {
            templates: templates.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

async fn read_file(path: &Path) -> Result<TemplateFile, TemplateStoreError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, title: &str) -> NamedTemplate {
        NamedTemplate {
            name: name.to_string(),
            title: title.to_string(),
            description: "{topic}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::load(dir.path().join("templates.json")).await;
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        std::fs::write(&path, "not json").unwrap();

        let store = TemplateStore::load(&path).await;
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_persists_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");

        let store = TemplateStore::load(&path).await;
        store.upsert(named("daily", "Day #{number}")).await.unwrap();
        store.upsert(named("weekly", "Week #{number}")).await.unwrap();
        store.upsert(named("daily", "Daily {topic}")).await.unwrap();

        let reloaded = TemplateStore::load(&path).await;
        let list = reloaded.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].title, "Daily {topic}");
        assert_eq!(list[1].name, "weekly");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::load(dir.path().join("templates.json")).await;
        store.upsert(named("daily", "Day #{number}")).await.unwrap();

        assert!(store.remove("daily").await.unwrap());
        assert!(!store.remove("daily").await.unwrap());
        assert!(store.get("daily").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_library_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("library");
        let store = TemplateStore::load(parent.join("templates.json")).await;
        store.upsert(named("daily", "Day #{number}")).await.unwrap();

        // A plain file where the directory was makes every write fail
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, b"").unwrap();

        assert!(store.upsert(named("weekly", "Week #{number}")).await.is_err());
        assert!(store.upsert(named("daily", "Changed")).await.is_err());
        assert!(store.remove("daily").await.is_err());

        let list = store.list().await;
        assert_eq!(list, vec![named("daily", "Day #{number}")]);
    }

    #[test]
    fn test_validation() {
        assert!(named("daily", "Day").validate().is_ok());
        assert!(named("", "Day").validate().is_err());
        assert!(named("daily", "").validate().is_err());
    }
}
