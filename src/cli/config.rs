use std::{io::ErrorKind, path::PathBuf};

use dirs::home_dir;
use merge::Merge;
use serde::{Deserialize, Serialize};
use tokio::fs::{create_dir_all, read_to_string, write};
use url::Url;

use codium::{fs::CodiumFsError, storage::SnapshotStore, CodiumError};

pub const GLOBAL_CONFIG_FILE: &str = ".codiumrc";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// `~/.codiumrc`
#[derive(Serialize, Deserialize, Clone, Debug, Default, Merge)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub storage_url: Option<String>,
}

impl GlobalConfig {
    fn from_env() -> Self {
        Self {
            token: std::env::var("CODIUM_TOKEN").ok(),
            api_url: std::env::var("CODIUM_API_URL").ok(),
            storage_url: std::env::var("CODIUM_STORAGE_URL").ok(),
        }
    }
}

pub fn global_config_path() -> Result<PathBuf, CodiumError> {
    let home = home_dir().ok_or(CodiumError::FsError(CodiumFsError::UnknownPath(
        "$HOME".to_owned(),
    )))?;
    Ok(home.join(GLOBAL_CONFIG_FILE))
}

/// A missing or blank `~/.codiumrc` is an empty config. Anything else must
/// parse, so a broken file is never silently replaced on the next login.
pub async fn get_global_config() -> Result<GlobalConfig, CodiumError> {
    let path = global_config_path()?;
    let raw = match read_to_string(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(GlobalConfig::default()),
        Err(err) => return Err(CodiumFsError::Os(err).into()),
    };
    if raw.trim().is_empty() {
        return Ok(GlobalConfig::default());
    }
    serde_json::from_str(&raw).map_err(|err| {
        CodiumError::BadUsage(format!(
            "{} is not valid JSON: {}\n\ntips: fix the file or remove it and run `codium login`",
            path.display(),
            err
        ))
    })
}

pub async fn set_global_config(config: &GlobalConfig) -> Result<(), CodiumError> {
    write(global_config_path()?, serde_json::to_string_pretty(config)?)
        .await
        .map_err(|err| CodiumError::FsError(CodiumFsError::Os(err)))?;
    Ok(())
}

/// Credentials and endpoints, read once per process and passed to every command.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: Option<String>,
    pub api_url: String,
    pub storage_url: String,
}

impl Session {
    /// Environment variables win over `~/.codiumrc`.
    pub async fn load() -> Result<Session, CodiumError> {
        let mut config = GlobalConfig::from_env();
        config.merge(get_global_config().await?);
        let storage_url = match config.storage_url {
            Some(url) => url,
            None => default_storage_url()?,
        };
        Ok(Session {
            token: config.token,
            api_url: config.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_owned()),
            storage_url,
        })
    }

    pub fn token(&self) -> Result<&str, CodiumError> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(CodiumError::NotAuthenticated)
    }

    pub async fn open_store(&self) -> Result<SnapshotStore, CodiumError> {
        if let Ok(url) = Url::parse(&self.storage_url) {
            if url.scheme() == "file" {
                if let Ok(dir) = url.to_file_path() {
                    create_dir_all(dir)
                        .await
                        .map_err(|err| CodiumError::FsError(CodiumFsError::Os(err)))?;
                }
            }
        }
        SnapshotStore::from_url(&self.storage_url)
    }
}

fn default_storage_url() -> Result<String, CodiumError> {
    let home = home_dir().ok_or(CodiumError::FsError(CodiumFsError::UnknownPath(
        "$HOME".to_owned(),
    )))?;
    let dir = home.join(".codium").join("storage");
    Url::from_directory_path(&dir)
        .map(|url| url.to_string())
        .map_err(|_| CodiumError::FsError(CodiumFsError::UnknownPath(dir.display().to_string())))
}
