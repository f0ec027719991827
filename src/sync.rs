//! Push and pull between a local [`Workspace`] and a [`SnapshotStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{create_dir_all, metadata, read, write};

use crate::{
    fs::{is_reserved_path, CodiumFsError, Workspace, COMMIT_META_FILE},
    model::{is_valid_commit_id, CommitId, CommitMeta, CommitRecord, Repository},
    storage::{relative_to, SnapshotObject, SnapshotStore},
    CodiumError,
};

/// The repository metadata service as seen from a client.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Appends `record` to the repository's commit list.
    async fn register_commit(
        &self,
        token: &str,
        repository_id: &str,
        record: &CommitRecord,
    ) -> Result<CommitRecord, CodiumError>;

    async fn fetch_repository(&self, repository_id: &str) -> Result<Repository, CodiumError>;
}

#[derive(Clone, Debug)]
pub struct PushReport {
    pub pushed: Vec<CommitId>,
    pub uploaded_files: usize,
    pub registered: CommitRecord,
}

#[derive(Clone, Debug, Default)]
pub struct PullReport {
    /// commits that did not exist locally before this pull
    pub new_commits: Vec<CommitId>,
    pub downloaded_files: usize,
    pub up_to_date_files: usize,
    pub skipped_keys: usize,
}

pub struct Synchronizer<'a, C: MetadataClient + ?Sized> {
    workspace: &'a Workspace,
    store: &'a SnapshotStore,
    metadata: &'a C,
}

impl<'a, C: MetadataClient + ?Sized> Synchronizer<'a, C> {
    pub fn new(workspace: &'a Workspace, store: &'a SnapshotStore, metadata: &'a C) -> Self {
        Self {
            workspace,
            store,
            metadata,
        }
    }

    /// `push` uploads every local commit missing from the push ledger, then
    /// registers the newest of them with the metadata service.
    ///
    /// Registration happens only after every upload succeeded. Uploaded
    /// objects are not rolled back on failure; the ledger stays untouched so
    /// the next push uploads the same commits again.
    pub async fn push(
        &self,
        repository_id: &str,
        token: Option<&str>,
    ) -> Result<PushReport, CodiumError> {
        let token = token.ok_or(CodiumError::NotAuthenticated)?;
        let commit_ids = self.workspace.commit_ids().await?;
        if commit_ids.is_empty() {
            return Err(CodiumError::NoLocalCommits);
        }
        let ledger = self.workspace.read_ledger().await?;
        let pending = commit_ids
            .into_iter()
            .filter(|id| !ledger.contains(id))
            .collect::<Vec<_>>();
        let newest = pending.last().cloned().ok_or(CodiumError::NothingToPush)?;

        tracing::debug!("uploading {} pending commit(s)", pending.len());
        let mut uploaded_files = 0;
        for commit_id in &pending {
            for (relative_path, path) in self.workspace.commit_files(commit_id).await? {
                let data = read(&path).await.map_err(CodiumFsError::Os)?;
                let key = self
                    .store
                    .put_commit_file(repository_id, commit_id, &relative_path, data.into())
                    .await?;
                tracing::trace!("uploaded {}", key);
                uploaded_files += 1;
            }
        }

        let meta = self
            .workspace
            .read_commit_meta(&newest)
            .await?
            .ok_or_else(|| {
                CodiumFsError::UnknownPath(
                    self.workspace
                        .commit_dir(&newest)
                        .join(COMMIT_META_FILE)
                        .display()
                        .to_string(),
                )
            })?;
        let registered = self
            .metadata
            .register_commit(token, repository_id, &CommitRecord::from(&meta))
            .await?;
        tracing::info!("registered commit {} for {}", registered.commit_id, repository_id);
        self.workspace.mark_pushed(pending.iter().cloned()).await?;

        Ok(PushReport {
            pushed: pending,
            uploaded_files,
            registered,
        })
    }

    /// `pull` materializes every remote commit of `repository_id` locally.
    ///
    /// Local files whose bytes already match the remote object are left
    /// alone, anything else is overwritten with the remote copy. Keys
    /// that do not look like `{commitId}/{path}` below the repository prefix
    /// are skipped.
    pub async fn pull(&self, repository_id: &str) -> Result<PullReport, CodiumError> {
        let prefix = SnapshotStore::repository_prefix(repository_id);
        let objects = self.store.list_all(&prefix).await?;
        if objects.is_empty() {
            return Err(CodiumError::NothingToPull);
        }

        let mut report = PullReport::default();
        let mut commits: BTreeMap<CommitId, Vec<SnapshotObject>> = BTreeMap::new();
        for object in objects {
            let Some((commit_id, relative_path)) = relative_to(&object.location, &prefix)
                .and_then(|rel| {
                    rel.split_once('/')
                        .map(|(c, p)| (c.to_owned(), p.to_owned()))
                })
            else {
                tracing::warn!("skipping unexpected key {}", object.location);
                report.skipped_keys += 1;
                continue;
            };
            if !is_valid_commit_id(&commit_id)
                || relative_path.is_empty()
                || is_reserved_path(&relative_path)
            {
                tracing::warn!("skipping unexpected key {}", object.location);
                report.skipped_keys += 1;
                continue;
            }
            commits.entry(commit_id).or_default().push(SnapshotObject {
                location: object.location,
                relative_path,
                size: object.size,
            });
        }
        if commits.is_empty() {
            return Err(CodiumError::NothingToPull);
        }

        let records = match self.metadata.fetch_repository(repository_id).await {
            Ok(repository) => repository.commits,
            Err(err) => {
                tracing::warn!("could not fetch commit records of {}: {}", repository_id, err);
                Vec::new()
            }
        };

        for (commit_id, files) in &commits {
            let commit_dir = self.workspace.commit_dir(commit_id);
            if !commit_dir.exists() {
                report.new_commits.push(commit_id.clone());
            }
            create_dir_all(&commit_dir).await.map_err(CodiumFsError::Os)?;
            for file in files {
                let local = commit_dir.join(&file.relative_path);
                let data = self.store.get(&file.location).await?;
                let same_size = metadata(&local)
                    .await
                    .map(|m| m.is_file() && m.len() == data.len() as u64)
                    .unwrap_or(false);
                if same_size && read(&local).await.map(|l| l[..] == data[..]).unwrap_or(false) {
                    report.up_to_date_files += 1;
                    continue;
                }
                if let Some(parent) = local.parent() {
                    create_dir_all(parent).await.map_err(CodiumFsError::Os)?;
                }
                write(&local, &data).await.map_err(CodiumFsError::Os)?;
                report.downloaded_files += 1;
            }
            if self.workspace.read_commit_meta(commit_id).await?.is_none() {
                let record = records.iter().find(|r| &r.commit_id == commit_id);
                let meta = CommitMeta {
                    id: commit_id.clone(),
                    message: record
                        .map(|r| r.message.clone())
                        .unwrap_or_else(|| "pulled from remote".to_owned()),
                    timestamp: record.map(|r| r.timestamp).unwrap_or_else(Utc::now),
                    files: files.iter().map(|f| f.relative_path.clone()).collect(),
                };
                self.workspace.write_commit_meta(&meta).await?;
            }
        }
        self.workspace.mark_pushed(commits.into_keys()).await?;
        Ok(report)
    }
}
