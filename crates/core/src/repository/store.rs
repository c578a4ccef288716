//! Repository persistent store

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Error;
use crate::Result;

use super::model::{CreateRepositoryRequest, Repository};

/// File-backed registry of local repositories.
///
/// The whole map is persisted as a single JSON document, rewritten on every
/// mutation. Reads are served from memory.
#[derive(Clone)]
pub struct RepositoryStore {
    repositories: Arc<RwLock<HashMap<Uuid, Repository>>>,
    file_path: PathBuf,
}

impl RepositoryStore {
    pub async fn new(file_path: PathBuf) -> Result<Self> {
        let repositories = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .map_err(|e| Error::Storage(format!("Failed to read repositories file: {}", e)))?;

            serde_json::from_str(&content)
                .map_err(|e| Error::Storage(format!("Failed to parse repositories file: {}", e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            repositories: Arc::new(RwLock::new(repositories)),
            file_path,
        })
    }

    pub async fn register(&self, request: CreateRepositoryRequest) -> Result<Repository> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Repository name cannot be empty".to_string(),
            ));
        }

        let path = PathBuf::from(request.path.trim());
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidInput(
                "Repository path cannot be empty".to_string(),
            ));
        }

        let default_branch = request
            .default_branch
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("main")
            .to_string();

        let repository = Repository::new(name, path, default_branch);

        let mut repositories = self.repositories.write().await;
        if repositories
            .values()
            .any(|existing| existing.path == repository.path)
        {
            return Err(Error::InvalidInput(format!(
                "Repository path {:?} is already registered",
                repository.path
            )));
        }

        repositories.insert(repository.id, repository.clone());
        self.persist(&repositories).await?;

        Ok(repository)
    }

    pub async fn get(&self, id: Uuid) -> Result<Repository> {
        let repositories = self.repositories.read().await;
        repositories
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::RepositoryNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<Repository> {
        let repositories = self.repositories.read().await;
        let mut list: Vec<_> = repositories.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut repositories = self.repositories.write().await;
        if repositories.remove(&id).is_none() {
            return Err(Error::RepositoryNotFound(id.to_string()));
        }
        self.persist(&repositories).await
    }

    async fn persist(&self, repositories: &HashMap<Uuid, Repository>) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create data dir: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(repositories)
            .map_err(|e| Error::Storage(format!("Failed to serialize repositories: {}", e)))?;

        tokio::fs::write(&self.file_path, content)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write repositories file: {}", e)))?;

        Ok(())
    }
}
