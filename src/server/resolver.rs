use std::{
    io::{self, Write},
    sync::Arc,
};

use bytes::Bytes;
use chrono::Utc;
use futures::{stream::BoxStream, StreamExt};
use tokio::runtime::Handle;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use super::meta::RepositoryStore;
use crate::{
    fs::{is_reserved_path, CodiumFsError, COMMIT_META_FILE},
    model::{
        is_valid_commit_id, new_commit_id, CommitRecord, ContentEntry, EntryKind, Repository,
        RepositoryContents, UserId,
    },
    storage::{file_name, join, SnapshotStore},
    CodiumError,
};

pub const DEFAULT_UPLOAD_MESSAGE: &str = "Uploaded via web";
const ZIP_PIPE_BUFFER: usize = 64 * 1024;

/// Body of a zip download.
pub type ZipStream = BoxStream<'static, io::Result<Bytes>>;

/// A file received by the web upload path.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    /// `/` separated path relative to the commit root
    pub path: String,
    pub data: Bytes,
}

/// `TreeResolver` answers tree, file and archive queries against object
/// storage and the repository metadata store. It never touches a checkout.
#[derive(Clone)]
pub struct TreeResolver {
    repositories: Arc<dyn RepositoryStore>,
    store: SnapshotStore,
}

impl TreeResolver {
    pub fn new(repositories: Arc<dyn RepositoryStore>, store: SnapshotStore) -> Self {
        Self {
            repositories,
            store,
        }
    }

    pub fn repositories(&self) -> &Arc<dyn RepositoryStore> {
        &self.repositories
    }

    pub async fn repository(&self, repository_id: &str) -> Result<Repository, CodiumError> {
        self.repositories
            .get(repository_id)
            .await?
            .ok_or_else(|| CodiumError::RepositoryNotFound(repository_id.to_owned()))
    }

    fn ensure_owner(repository: &Repository, user: &UserId) -> Result<(), CodiumError> {
        if &repository.owner != user {
            return Err(CodiumError::PermissionDenied(format!(
                "only the owner can change repository {}",
                repository.name
            )));
        }
        Ok(())
    }

    /// Lists the direct children of `sub_path` in the latest commit.
    ///
    /// A repository without commits yields an empty listing. Folders come
    /// first, then files, each sorted by name.
    pub async fn list_contents(
        &self,
        repository_id: &str,
        sub_path: &str,
    ) -> Result<RepositoryContents, CodiumError> {
        let repository = self.repository(repository_id).await?;
        let Some(latest) = repository.latest_commit() else {
            return Ok(RepositoryContents {
                repository,
                contents: Vec::new(),
            });
        };
        let prefix = join(
            &SnapshotStore::commit_prefix(&repository.id, &latest.commit_id),
            sub_path,
        );
        let listing = self.store.list_dir(&prefix).await?;

        let mut folders = listing
            .folders
            .iter()
            .filter_map(|path| {
                let name = file_name(path)?;
                Some(ContentEntry {
                    name,
                    kind: EntryKind::Folder,
                    key: format!("{}/", path),
                    size: None,
                })
            })
            .filter(|entry| !entry.name.is_empty())
            .collect::<Vec<_>>();
        let mut files = listing
            .files
            .iter()
            .filter_map(|meta| {
                let name = file_name(&meta.location)?;
                Some(ContentEntry {
                    name,
                    kind: EntryKind::File,
                    key: meta.location.to_string(),
                    size: Some(meta.size),
                })
            })
            .filter(|entry| !entry.name.is_empty())
            .collect::<Vec<_>>();
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));
        folders.extend(files);

        Ok(RepositoryContents {
            repository,
            contents: folders,
        })
    }

    /// Raw bytes of one file; a key that was never written is `FileNotFound`.
    pub async fn get_file_content(
        &self,
        repository_id: &str,
        commit_id: &str,
        file_path: &str,
    ) -> Result<Bytes, CodiumError> {
        if !is_valid_commit_id(commit_id) || file_path.trim_matches('/').is_empty() {
            return Err(CodiumError::FileNotFound(format!(
                "{}/{}",
                commit_id, file_path
            )));
        }
        let key = SnapshotStore::object_key(repository_id, commit_id, file_path);
        self.store.get(&key).await
    }

    /// Streams a zip of one commit with entries relative to the commit root.
    ///
    /// Objects are fetched one at a time on a blocking thread and written
    /// through a bounded pipe, so memory stays at one object plus the pipe
    /// buffer. Once the response body is dropped the pipe breaks and no more
    /// objects are read. A failure after streaming began ends the body with an
    /// error. Zero objects produce a valid empty archive.
    pub async fn download_as_zip(
        &self,
        repository_id: &str,
        commit_id: &str,
    ) -> Result<(Repository, ZipStream), CodiumError> {
        let repository = self.repository(repository_id).await?;
        if !is_valid_commit_id(commit_id) {
            return Err(CodiumError::BadUsage(format!("invalid commit id {}", commit_id)));
        }
        let objects = self.store.commit_objects(&repository.id, commit_id).await?;
        tracing::debug!("archiving {} file(s) of {}", objects.len(), commit_id);

        let (writer, reader) = tokio::io::duplex(ZIP_PIPE_BUFFER);
        let bridge = SyncIoBridge::new(writer);
        let store = self.store.clone();
        let handle = Handle::current();
        let task = tokio::task::spawn_blocking(move || {
            let mut zip = ZipWriter::new_stream(bridge);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for object in objects {
                let data = handle.block_on(store.get(&object.location))?;
                zip.start_file(object.relative_path.as_str(), options)?;
                zip.write_all(&data).map_err(CodiumFsError::Os)?;
            }
            zip.finish()?.flush().map_err(CodiumFsError::Os)?;
            Ok::<_, CodiumError>(())
        });
        let outcome = futures::stream::once(async move {
            let result = match task.await {
                Ok(result) => result,
                Err(err) => Err(CodiumError::RemoteFailure(err.to_string())),
            };
            result.map(|_| Bytes::new()).map_err(|err| {
                tracing::warn!("zip stream aborted: {}", err);
                io::Error::new(io::ErrorKind::Other, err.to_string())
            })
        });
        Ok((repository, ReaderStream::new(reader).chain(outcome).boxed()))
    }

    /// Web upload: a fresh commit holding `files`, appended to the history.
    ///
    /// Uses the same key scheme as the CLI push path, so both kinds of commit
    /// resolve identically.
    pub async fn upload_new_commit(
        &self,
        repository_id: &str,
        user: &UserId,
        files: Vec<UploadedFile>,
        message: Option<String>,
    ) -> Result<CommitRecord, CodiumError> {
        let repository = self.repository(repository_id).await?;
        Self::ensure_owner(&repository, user)?;
        if files.is_empty() {
            return Err(CodiumError::Validation("no files uploaded".to_owned()));
        }
        for file in &files {
            if file.path.trim_matches('/').is_empty() {
                return Err(CodiumError::Validation("file without a name".to_owned()));
            }
            if is_reserved_path(&file.path) {
                return Err(CodiumError::Validation(format!(
                    "{} is reserved for commit metadata",
                    COMMIT_META_FILE
                )));
            }
        }
        let commit_id = new_commit_id();
        for file in files {
            self.store
                .put_commit_file(&repository.id, &commit_id, &file.path, file.data)
                .await?;
        }
        let record = CommitRecord {
            commit_id,
            message: message
                .map(|m| m.trim().to_owned())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_UPLOAD_MESSAGE.to_owned()),
            timestamp: Utc::now(),
        };
        self.repositories
            .append_commit(&repository.id, record.clone())
            .await?;
        tracing::info!("uploaded commit {} to {}", record.commit_id, repository.id);
        Ok(record)
    }

    /// CLI push path: registers a commit whose files are already uploaded.
    pub async fn register_commit(
        &self,
        repository_id: &str,
        user: &UserId,
        record: CommitRecord,
    ) -> Result<CommitRecord, CodiumError> {
        let repository = self.repository(repository_id).await?;
        Self::ensure_owner(&repository, user)?;
        if !is_valid_commit_id(&record.commit_id) {
            return Err(CodiumError::Validation(format!(
                "invalid commit id {}",
                record.commit_id
            )));
        }
        self.repositories
            .append_commit(&repository.id, record.clone())
            .await?;
        tracing::info!("registered commit {} on {}", record.commit_id, repository.id);
        Ok(record)
    }

    pub async fn toggle_visibility(
        &self,
        repository_id: &str,
        user: &UserId,
    ) -> Result<Repository, CodiumError> {
        let repository = self.repository(repository_id).await?;
        Self::ensure_owner(&repository, user)?;
        self.repositories.toggle_visibility(&repository.id).await
    }

    pub async fn delete_repository(
        &self,
        repository_id: &str,
        user: &UserId,
    ) -> Result<(), CodiumError> {
        let repository = self.repository(repository_id).await?;
        Self::ensure_owner(&repository, user)?;
        self.repositories.delete(&repository.id).await?;
        Ok(())
    }
}
