use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use async_recursion::async_recursion;
use chrono::Utc;
use thiserror::Error;
use tokio::fs::{
    copy, create_dir_all, metadata, read_dir, read_to_string, remove_dir_all, remove_file,
    rename, write,
};

use crate::{
    model::{is_valid_commit_id, new_commit_id, CommitId, CommitMeta, LocalConfig},
    CodiumError,
};

pub const REPO_DIR: &str = ".codiumGit";
pub const STAGING_DIR: &str = "staging";
pub const COMMITS_DIR: &str = "commits";
pub const CONFIG_FILE: &str = "config.json";
pub const LEDGER_FILE: &str = "pushed.json";
/// Sidecar written into every commit directory; never uploaded or reverted.
pub const COMMIT_META_FILE: &str = "commit.json";

/// A root level `commit.json` would collide with the sidecar.
pub fn is_reserved_path(relative: &str) -> bool {
    relative.trim_matches('/') == COMMIT_META_FILE
}

#[derive(Error, Debug)]
pub enum CodiumFsError {
    #[error("repo path is invalid (not exists or not a directory)")]
    InvalidRepoPath,
    #[error("unknown path: {0}")]
    UnknownPath(String),
    #[error("os error: {0}")]
    Os(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// `Workspace` is a project directory that carries a `.codiumGit` dir.
#[derive(Clone, Debug)]
pub struct Workspace {
    /// the working directory, parent of `.codiumGit`
    pub path: PathBuf,
}

impl Workspace {
    /// Lays out `.codiumGit` under `path` and records the remote repository id.
    pub async fn create(
        path: impl AsRef<Path>,
        config: &LocalConfig,
    ) -> Result<Workspace, CodiumFsError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(CodiumFsError::InvalidRepoPath);
        }
        let repo_dir = path.join(REPO_DIR);
        create_dir_all(repo_dir.join(STAGING_DIR)).await?;
        create_dir_all(repo_dir.join(COMMITS_DIR)).await?;
        write(
            repo_dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(config)?,
        )
        .await?;
        tracing::debug!("initialized workspace at {}", path.display());
        Ok(Workspace { path })
    }

    pub fn is_workspace(path: impl AsRef<Path>) -> bool {
        path.as_ref().join(REPO_DIR).is_dir()
    }

    /// Opens the workspace at `path` or the closest ancestor holding a `.codiumGit` dir.
    pub async fn try_open(path: impl AsRef<Path>) -> Result<Workspace, CodiumError> {
        let path = path.as_ref();
        path.ancestors()
            .find(|p| Self::is_workspace(p))
            .map(|p| Workspace {
                path: p.to_path_buf(),
            })
            .ok_or_else(|| CodiumError::NotARepository(path.display().to_string()))
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.path.join(REPO_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.repo_dir().join(STAGING_DIR)
    }

    pub fn commits_dir(&self) -> PathBuf {
        self.repo_dir().join(COMMITS_DIR)
    }

    pub fn commit_dir(&self, commit_id: &str) -> PathBuf {
        self.commits_dir().join(commit_id)
    }

    pub async fn read_config(&self) -> Result<LocalConfig, CodiumError> {
        let raw = read_to_string(self.repo_dir().join(CONFIG_FILE))
            .await
            .map_err(|_| {
                CodiumError::BadUsage(
                    "repository id not found in config.json, run `codium init` first".to_owned(),
                )
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Copies `file` into the staging area under its base name, replacing any
    /// previously staged copy with the same name.
    pub async fn stage(&self, file: impl AsRef<Path>) -> Result<String, CodiumError> {
        let file = file.as_ref();
        let is_file = metadata(file)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(CodiumError::BadUsage(format!(
                "{} is not a file",
                file.display()
            )));
        }
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CodiumFsError::UnknownPath(file.display().to_string()))?
            .to_owned();
        if is_reserved_path(&name) {
            return Err(CodiumError::Validation(format!(
                "{} is reserved for commit metadata, rename the file first",
                COMMIT_META_FILE
            )));
        }
        let staging = self.staging_dir();
        create_dir_all(&staging).await.map_err(CodiumFsError::Os)?;
        copy(file, staging.join(&name))
            .await
            .map_err(CodiumFsError::Os)?;
        Ok(name)
    }

    pub async fn staged_files(&self) -> Result<Vec<String>, CodiumFsError> {
        let staging = self.staging_dir();
        if !staging.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let mut entries = read_dir(staging).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_owned());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Turns the staging area into a new commit directory.
    ///
    /// The commit is assembled in a hidden temp dir and renamed into place, so
    /// a crash never leaves a half written commit that `push` would pick up.
    /// Staged files are removed only once the commit is in place.
    pub async fn commit(&self, message: &str) -> Result<CommitMeta, CodiumError> {
        let staged = self.staged_files().await?;
        if staged.is_empty() {
            return Err(CodiumError::EmptyStaging);
        }
        if staged.iter().any(|name| is_reserved_path(name)) {
            return Err(CodiumError::Validation(format!(
                "{} in the staging area is reserved for commit metadata",
                COMMIT_META_FILE
            )));
        }
        let id = new_commit_id();
        let temp_dir = self.commits_dir().join(format!(".tmp-{}", id));
        create_dir_all(&temp_dir).await.map_err(CodiumFsError::Os)?;
        let meta = CommitMeta {
            id: id.clone(),
            message: message.to_owned(),
            timestamp: Utc::now(),
            files: staged.clone(),
        };
        if let Err(err) = self.fill_commit_dir(&temp_dir, &meta).await {
            let _ = remove_dir_all(&temp_dir).await;
            return Err(err.into());
        }
        rename(&temp_dir, self.commit_dir(&id))
            .await
            .map_err(CodiumFsError::Os)?;
        let staging = self.staging_dir();
        for file in &staged {
            remove_file(staging.join(file))
                .await
                .map_err(CodiumFsError::Os)?;
        }
        tracing::debug!("committed {} file(s) as {}", staged.len(), id);
        Ok(meta)
    }

    async fn fill_commit_dir(&self, dir: &Path, meta: &CommitMeta) -> Result<(), CodiumFsError> {
        let staging = self.staging_dir();
        for file in &meta.files {
            copy(staging.join(file), dir.join(file)).await?;
        }
        write(dir.join(COMMIT_META_FILE), serde_json::to_string_pretty(meta)?).await?;
        Ok(())
    }

    /// Local commit ids in creation order. Hidden dirs (in-flight commits) are skipped.
    pub async fn commit_ids(&self) -> Result<Vec<CommitId>, CodiumFsError> {
        let commits = self.commits_dir();
        if !commits.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let mut entries = read_dir(commits).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    ids.push(name.to_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn commit_exists(&self, commit_id: &str) -> bool {
        is_valid_commit_id(commit_id) && self.commit_dir(commit_id).is_dir()
    }

    pub async fn read_commit_meta(
        &self,
        commit_id: &str,
    ) -> Result<Option<CommitMeta>, CodiumFsError> {
        let path = self.commit_dir(commit_id).join(COMMIT_META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub async fn write_commit_meta(&self, meta: &CommitMeta) -> Result<(), CodiumFsError> {
        let dir = self.commit_dir(&meta.id);
        create_dir_all(&dir).await?;
        write(
            dir.join(COMMIT_META_FILE),
            serde_json::to_string_pretty(meta)?,
        )
        .await?;
        Ok(())
    }

    /// Files of a commit as `(relative path, absolute path)`, sidecar excluded.
    pub async fn commit_files(
        &self,
        commit_id: &str,
    ) -> Result<Vec<(String, PathBuf)>, CodiumFsError> {
        let dir = self.commit_dir(commit_id);
        let mut files = Vec::new();
        collect_files(&dir, "", &mut files).await?;
        files.retain(|(rel, _)| rel != COMMIT_META_FILE);
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// Commit ids already replicated to object storage.
    pub async fn read_ledger(&self) -> Result<BTreeSet<CommitId>, CodiumFsError> {
        let path = self.repo_dir().join(LEDGER_FILE);
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        let raw = read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn mark_pushed(
        &self,
        commit_ids: impl IntoIterator<Item = CommitId>,
    ) -> Result<(), CodiumFsError> {
        let mut ledger = self.read_ledger().await?;
        ledger.extend(commit_ids);
        let path = self.repo_dir().join(LEDGER_FILE);
        let temp = self.repo_dir().join(format!(".{}.tmp", LEDGER_FILE));
        write(&temp, serde_json::to_string_pretty(&ledger)?).await?;
        rename(temp, path).await?;
        Ok(())
    }

    /// Copies every file of a local commit into the working directory.
    ///
    /// Same-named files are overwritten unconditionally: there is no merge and
    /// no backup of what gets replaced. A missing commit leaves the working
    /// directory untouched.
    pub async fn revert(&self, commit_id: &str) -> Result<Vec<String>, CodiumError> {
        if !self.commit_exists(commit_id) {
            return Err(CodiumError::CommitNotFoundLocally(commit_id.to_owned()));
        }
        let files = self.commit_files(commit_id).await?;
        let mut restored = Vec::with_capacity(files.len());
        for (rel, source) in files {
            let target = self.path.join(&rel);
            if let Some(parent) = target.parent() {
                create_dir_all(parent).await.map_err(CodiumFsError::Os)?;
            }
            copy(&source, &target).await.map_err(CodiumFsError::Os)?;
            restored.push(rel);
        }
        tracing::debug!("reverted {} file(s) from {}", restored.len(), commit_id);
        Ok(restored)
    }
}

#[async_recursion]
async fn collect_files(
    dir: &Path,
    prefix: &str,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<(), CodiumFsError> {
    let mut entries = read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry
            .file_name()
            .to_str()
            .ok_or_else(|| CodiumFsError::UnknownPath(entry.path().display().to_string()))?
            .to_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &rel, out).await?;
        } else if file_type.is_file() {
            out.push((rel, entry.path()));
        }
    }
    Ok(())
}
