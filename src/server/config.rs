use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;

use crate::{fs::CodiumFsError, CodiumError};

/// A user allowed to log in. Passwords are stored as hex encoded SHA-256.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub password_sha256: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// object storage url, `<data_dir>/objects` on the local disk when unset
    #[serde(default)]
    pub storage_url: Option<String>,
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub users: Vec<UserAccount>,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_owned()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("codium-data")
}

fn default_token_ttl_secs() -> u64 {
    60 * 60 * 24
}

fn default_storage_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            storage_url: None,
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            storage_timeout_secs: default_storage_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Reads the TOML config at `path` (defaults when `None`) and applies
    /// `CODIUM_BIND`, `CODIUM_JWT_SECRET` and `CODIUM_STORAGE_URL`.
    pub async fn load(path: Option<&Path>) -> Result<Self, CodiumError> {
        let mut config = match path {
            Some(path) => {
                let raw = read_to_string(path).await.map_err(CodiumFsError::Os)?;
                toml::from_str(&raw)?
            }
            None => ServerConfig::default(),
        };
        if let Ok(bind) = std::env::var("CODIUM_BIND") {
            config.bind = bind;
        }
        if let Ok(secret) = std::env::var("CODIUM_JWT_SECRET") {
            config.jwt_secret = secret;
        }
        if let Ok(url) = std::env::var("CODIUM_STORAGE_URL") {
            config.storage_url = Some(url);
        }
        if config.jwt_secret.is_empty() {
            return Err(CodiumError::BadUsage(
                "jwt_secret must be configured (config file or CODIUM_JWT_SECRET)".to_owned(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            jwt_secret = "s3cret"

            [[users]]
            id = "u1"
            username = "alice"
            password_sha256 = "00"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind, "127.0.0.1:5000");
        assert_eq!(config.storage_timeout_secs, 30);
        assert_eq!(config.users.len(), 1);
        assert!(config.storage_url.is_none());
    }
}
