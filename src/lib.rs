use std::string::FromUtf8Error;
use thiserror::Error;
use toml::{de, ser};

pub mod fs;
pub mod model;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;
pub mod sync;

/// Error type for codium
#[derive(Error, Debug)]
pub enum CodiumError {
    #[error("fs error: {0}")]
    FsError(#[from] fs::CodiumFsError),
    #[error("codec error: {0}")]
    CodecError(#[from] FromUtf8Error),
    #[error("bad usage: {0}")]
    BadUsage(String),
    #[error("config deserialize failed: {0}")]
    ConfigDeserializeFailed(#[from] de::Error),
    #[error("config serialize failed: {0}")]
    ConfigSerializeFailed(#[from] ser::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("you are not logged in\n\ntips: run `codium login` first")]
    NotAuthenticated,
    #[error("not a codium repository (or any parent): {0}\n\ntips: run `codium init` first")]
    NotARepository(String),
    #[error("commit {0} was not found locally\n\ntips: run `codium pull` to fetch remote commits, or `codium log` to see available commit ids")]
    CommitNotFoundLocally(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),
    #[error("nothing to commit, staging area is empty")]
    EmptyStaging,
    #[error("no local commits to push")]
    NoLocalCommits,
    #[error("everything up-to-date, no pending commits to push")]
    NothingToPush,
    #[error("no remote commits found to pull")]
    NothingToPull,
    #[error("remote failure: {0}")]
    RemoteFailure(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[cfg(feature = "server")]
    #[error("archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),
}

impl CodiumError {
    /// Informational outcomes are reported to the user but are not failures.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            CodiumError::EmptyStaging
                | CodiumError::NoLocalCommits
                | CodiumError::NothingToPush
                | CodiumError::NothingToPull
        )
    }
}

impl From<object_store::Error> for CodiumError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => CodiumError::FileNotFound(path),
            err => CodiumError::RemoteFailure(err.to_string()),
        }
    }
}

#[cfg(feature = "cli")]
impl From<reqwest::Error> for CodiumError {
    fn from(err: reqwest::Error) -> Self {
        CodiumError::RemoteFailure(err.to_string())
    }
}
