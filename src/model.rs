use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque commit identifier, also the local directory name and key segment.
pub type CommitId = String;
pub type RepositoryId = String;
pub type UserId = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// `CommitRecord` stand for a commit known to the metadata service.
pub struct CommitRecord {
    pub commit_id: CommitId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// `CommitMeta` is the `commit.json` sidecar of a local commit directory.
pub struct CommitMeta {
    pub id: CommitId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl From<&CommitMeta> for CommitRecord {
    fn from(meta: &CommitMeta) -> Self {
        CommitRecord {
            commit_id: meta.id.clone(),
            message: meta.message.clone(),
            timestamp: meta.timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// `Repository` stand for a repository metadata document.
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub visibility: bool,
    pub owner: UserId,
    #[serde(default)]
    pub commits: Vec<CommitRecord>,
    #[serde(default)]
    pub star_count: u64,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    pub fn latest_commit(&self) -> Option<&CommitRecord> {
        self.commits.last()
    }

    pub fn has_commit(&self, commit_id: &str) -> bool {
        self.commits.iter().any(|c| c.commit_id == commit_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRepository {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_visibility")]
    pub visibility: bool,
}

fn default_visibility() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    File,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// One child of a listed folder. Folders never carry a size.
pub struct ContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryContents {
    pub repository: Repository,
    pub contents: Vec<ContentEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// `.codiumGit/config.json`
pub struct LocalConfig {
    pub repository_id: RepositoryId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepositoryResponse {
    pub message: String,
    pub repository_id: RepositoryId,
}

const COMMIT_ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Generates a time ordered commit id such as `2024-05-01T10-20-30-123Z-k3j9x0a1b`.
///
/// The millisecond timestamp keeps ids sortable, the random suffix keeps
/// rapid successive commits apart.
pub fn new_commit_id() -> CommitId {
    let now = Utc::now();
    format!(
        "{}-{}",
        now.format("%Y-%m-%dT%H-%M-%S-%3fZ"),
        nanoid::nanoid!(9, &COMMIT_ID_ALPHABET)
    )
}

/// A commit id must be usable both as a directory name and as a single key segment.
pub fn is_valid_commit_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_ids_are_unique_and_sortable() {
        let ids: Vec<_> = (0..200).map(|_| new_commit_id()).collect();
        let mut dedup = ids.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), ids.len());
        assert!(ids.iter().all(|id| is_valid_commit_id(id)));
        assert!(ids[0][..24] <= ids[199][..24]);
    }

    #[test]
    fn rejects_path_like_commit_ids() {
        assert!(!is_valid_commit_id(""));
        assert!(!is_valid_commit_id(".."));
        assert!(!is_valid_commit_id("a/b"));
        assert!(!is_valid_commit_id(".tmp-abc"));
        assert!(is_valid_commit_id("2024-01-01T00-00-00-000Z-abc123xyz"));
    }

    #[test]
    fn folder_entries_serialize_without_size() {
        let folder = ContentEntry {
            name: "src".to_owned(),
            kind: EntryKind::Folder,
            key: "r/commits/c/src/".to_owned(),
            size: None,
        };
        let json = serde_json::to_value(&folder).unwrap();
        assert_eq!(json["type"], "folder");
        assert!(json.get("size").is_none());
    }
}
