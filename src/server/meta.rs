use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    fs::{create_dir_all, read_dir, read_to_string, remove_file, rename, write},
    sync::Mutex,
};

use crate::{
    fs::CodiumFsError,
    model::{CommitRecord, NewRepository, Repository, UserId},
    CodiumError,
};

/// Repository metadata documents, the system of record for commit history.
///
/// Every mutation is a read-modify-write of the persisted document; nothing
/// keeps `commits` cached between calls.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn create(&self, owner: &UserId, new: NewRepository) -> Result<Repository, CodiumError>;

    async fn get(&self, id: &str) -> Result<Option<Repository>, CodiumError>;

    /// Appends `record` as the latest commit. Existing records never change;
    /// appending a record identical to a registered one is a no-op.
    async fn append_commit(
        &self,
        id: &str,
        record: CommitRecord,
    ) -> Result<Repository, CodiumError>;

    /// Flips `visibility` in one locked read-modify-write.
    async fn toggle_visibility(&self, id: &str) -> Result<Repository, CodiumError>;

    async fn delete(&self, id: &str) -> Result<bool, CodiumError>;
}

/// `FileRepositoryStore` keeps one JSON document per repository in a directory.
///
/// Writes go to a temp file that is renamed over the document, and all
/// mutations are serialized by a single lock, so each append is one atomic
/// document update.
#[derive(Debug)]
pub struct FileRepositoryStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileRepositoryStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CodiumError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).await.map_err(CodiumFsError::Os)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn document(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{}.json", id)))
    }

    async fn load(&self, id: &str) -> Result<Option<Repository>, CodiumError> {
        let Some(path) = self.document(id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let raw = read_to_string(path).await.map_err(CodiumFsError::Os)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, repository: &Repository) -> Result<(), CodiumError> {
        let path = self
            .document(&repository.id)
            .ok_or_else(|| CodiumError::Validation(format!("invalid id {}", repository.id)))?;
        let temp = self.dir.join(format!(".{}.tmp", repository.id));
        write(&temp, serde_json::to_vec_pretty(repository)?)
            .await
            .map_err(CodiumFsError::Os)?;
        rename(temp, path).await.map_err(CodiumFsError::Os)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Repository>, CodiumError> {
        let mut repositories = Vec::new();
        let mut entries = read_dir(&self.dir).await.map_err(CodiumFsError::Os)?;
        while let Some(entry) = entries.next_entry().await.map_err(CodiumFsError::Os)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            let raw = read_to_string(entry.path())
                .await
                .map_err(CodiumFsError::Os)?;
            repositories.push(serde_json::from_str(&raw)?);
        }
        Ok(repositories)
    }
}

#[async_trait]
impl RepositoryStore for FileRepositoryStore {
    async fn create(&self, owner: &UserId, new: NewRepository) -> Result<Repository, CodiumError> {
        let name = new.name.trim().to_owned();
        if name.is_empty() {
            return Err(CodiumError::Validation(
                "repository name is required".to_owned(),
            ));
        }
        let _guard = self.lock.lock().await;
        if self.all().await?.iter().any(|r| r.name == name) {
            return Err(CodiumError::Validation(format!(
                "repository name {} is already taken",
                name
            )));
        }
        let now = Utc::now();
        let repository = Repository {
            id: nanoid::nanoid!(),
            name,
            description: new.description,
            visibility: new.visibility,
            owner: owner.clone(),
            commits: Vec::new(),
            star_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.save(&repository).await?;
        tracing::info!("created repository {} ({})", repository.name, repository.id);
        Ok(repository)
    }

    async fn get(&self, id: &str) -> Result<Option<Repository>, CodiumError> {
        self.load(id).await
    }

    async fn append_commit(
        &self,
        id: &str,
        record: CommitRecord,
    ) -> Result<Repository, CodiumError> {
        let _guard = self.lock.lock().await;
        let mut repository = self
            .load(id)
            .await?
            .ok_or_else(|| CodiumError::RepositoryNotFound(id.to_owned()))?;
        if let Some(existing) = repository
            .commits
            .iter()
            .find(|c| c.commit_id == record.commit_id)
        {
            // a retried registration whose first response was lost
            if existing == &record {
                return Ok(repository);
            }
            return Err(CodiumError::Validation(format!(
                "commit {} is already registered",
                record.commit_id
            )));
        }
        repository.commits.push(record);
        repository.version += 1;
        repository.updated_at = Utc::now();
        self.save(&repository).await?;
        Ok(repository)
    }

    async fn toggle_visibility(&self, id: &str) -> Result<Repository, CodiumError> {
        let _guard = self.lock.lock().await;
        let mut repository = self
            .load(id)
            .await?
            .ok_or_else(|| CodiumError::RepositoryNotFound(id.to_owned()))?;
        repository.visibility = !repository.visibility;
        repository.version += 1;
        repository.updated_at = Utc::now();
        self.save(&repository).await?;
        tracing::info!("repository {} visibility set to {}", id, repository.visibility);
        Ok(repository)
    }

    async fn delete(&self, id: &str) -> Result<bool, CodiumError> {
        let _guard = self.lock.lock().await;
        let Some(path) = self.document(id) else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        remove_file(path).await.map_err(CodiumFsError::Os)?;
        Ok(true)
    }
}
