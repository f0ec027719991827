//! Object storage access for commit snapshots.
//!
//! Every object lives under `{repositoryId}/commits/{commitId}/{relativePath}`.
//! Folders do not exist as entities: a folder listing is a prefix query with
//! a `/` delimiter.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{
    local::LocalFileSystem,
    memory::InMemory,
    parse_url_opts,
    path::{Path, PathPart},
    ObjectMeta, ObjectStore,
};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::{fs::CodiumFsError, CodiumError};

pub const COMMITS_INFIX: &str = "commits";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An object found under a commit prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotObject {
    pub location: Path,
    /// path relative to the commit prefix, `/` separated
    pub relative_path: String,
    pub size: u64,
}

/// Result of a delimiter listing: direct children of a prefix.
#[derive(Clone, Debug, Default)]
pub struct DirListing {
    pub folders: Vec<Path>,
    pub files: Vec<ObjectMeta>,
}

/// `SnapshotStore` wraps an [`ObjectStore`] with the codium key scheme and a
/// per-call timeout.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// A store rooted at a local directory, created when missing.
    pub async fn local(dir: impl AsRef<std::path::Path>) -> Result<Self, CodiumError> {
        tokio::fs::create_dir_all(dir.as_ref())
            .await
            .map_err(CodiumFsError::Os)?;
        Ok(Self::new(Arc::new(LocalFileSystem::new_with_prefix(
            dir.as_ref(),
        )?)))
    }

    /// Opens the store described by `url` (`s3://bucket`, `file:///dir`, `memory://`).
    ///
    /// Environment variables are passed as lower-cased options, so the usual
    /// `AWS_*` variables configure an S3 backend.
    pub fn from_url(url: &str) -> Result<Self, CodiumError> {
        let url = Url::parse(url)
            .map_err(|err| CodiumError::BadUsage(format!("invalid storage url {}: {}", url, err)))?;
        let options = std::env::vars().map(|(k, v)| (k.to_ascii_lowercase(), v));
        let (store, prefix) = parse_url_opts(&url, options)?;
        let store: Arc<dyn ObjectStore> = if prefix.as_ref().is_empty() {
            Arc::from(store)
        } else {
            Arc::new(object_store::prefix::PrefixStore::new(store, prefix))
        };
        Ok(Self::new(store))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `{repositoryId}/commits`
    pub fn repository_prefix(repository_id: &str) -> Path {
        Path::from(repository_id).child(COMMITS_INFIX)
    }

    /// `{repositoryId}/commits/{commitId}`
    pub fn commit_prefix(repository_id: &str, commit_id: &str) -> Path {
        Self::repository_prefix(repository_id).child(commit_id)
    }

    /// `{repositoryId}/commits/{commitId}/{relativePath}`
    pub fn object_key(repository_id: &str, commit_id: &str, relative_path: &str) -> Path {
        join(&Self::commit_prefix(repository_id, commit_id), relative_path)
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, CodiumError>
    where
        F: Future<Output = object_store::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CodiumError::RemoteFailure(format!(
                "object storage call timed out after {:?}",
                self.timeout
            ))),
        }
    }

    pub async fn put(&self, location: &Path, data: Bytes) -> Result<(), CodiumError> {
        tracing::trace!("put {} ({} bytes)", location, data.len());
        self.timed(self.store.put(location, data.into())).await?;
        Ok(())
    }

    /// Fetches one object; a missing key is [`CodiumError::FileNotFound`].
    pub async fn get(&self, location: &Path) -> Result<Bytes, CodiumError> {
        self.timed(async { self.store.get(location).await?.bytes().await })
            .await
    }

    /// Every object below `prefix`, recursively.
    pub async fn list_all(&self, prefix: &Path) -> Result<Vec<ObjectMeta>, CodiumError> {
        self.timed(self.store.list(Some(prefix)).try_collect::<Vec<_>>())
            .await
    }

    /// Direct children of `prefix`, using the backend's delimiter listing.
    pub async fn list_dir(&self, prefix: &Path) -> Result<DirListing, CodiumError> {
        let listing = self
            .timed(self.store.list_with_delimiter(Some(prefix)))
            .await?;
        Ok(DirListing {
            folders: listing.common_prefixes,
            files: listing.objects,
        })
    }

    pub async fn put_commit_file(
        &self,
        repository_id: &str,
        commit_id: &str,
        relative_path: &str,
        data: Bytes,
    ) -> Result<Path, CodiumError> {
        let key = Self::object_key(repository_id, commit_id, relative_path);
        self.put(&key, data).await?;
        Ok(key)
    }

    /// Every object of one commit, with paths relative to the commit prefix.
    pub async fn commit_objects(
        &self,
        repository_id: &str,
        commit_id: &str,
    ) -> Result<Vec<SnapshotObject>, CodiumError> {
        let prefix = Self::commit_prefix(repository_id, commit_id);
        let mut objects = self
            .list_all(&prefix)
            .await?
            .into_iter()
            .filter_map(|meta| {
                let relative_path = relative_to(&meta.location, &prefix)?;
                Some(SnapshotObject {
                    location: meta.location,
                    relative_path,
                    size: meta.size,
                })
            })
            .collect::<Vec<_>>();
        objects.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(objects)
    }
}

/// Appends a `/` separated relative path to `base`, dropping empty segments.
pub fn join(base: &Path, relative: &str) -> Path {
    base.parts()
        .chain(Path::from(relative).parts())
        .collect()
}

/// Decodes one key segment back into the name it was written from.
///
/// `Path` percent-encodes characters such as `%`, `[` or `~` per segment.
/// Segments that decode to `.`, `..` or contain a separator are rejected so a
/// decoded path never leaves its base directory.
pub fn decode_part(part: &PathPart) -> Option<String> {
    let name = percent_decode_str(part.as_ref())
        .decode_utf8()
        .ok()?
        .into_owned();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name)
}

/// Decoded last segment of `location`.
pub fn file_name(location: &Path) -> Option<String> {
    location.parts().last().and_then(|part| decode_part(&part))
}

/// `location` relative to `prefix`, decoded and `/` separated, or `None` when
/// it is not strictly below it.
pub fn relative_to(location: &Path, prefix: &Path) -> Option<String> {
    let parts = location
        .prefix_match(prefix)?
        .map(|part| decode_part(&part))
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_follow_the_commit_scheme() {
        let key = SnapshotStore::object_key("repo", "c1", "src/lib.rs");
        assert_eq!(key.as_ref(), "repo/commits/c1/src/lib.rs");
        let key = SnapshotStore::object_key("repo", "c1", "/readme.md");
        assert_eq!(key.as_ref(), "repo/commits/c1/readme.md");
    }

    #[test]
    fn relative_paths_strip_the_prefix() {
        let prefix = SnapshotStore::commit_prefix("repo", "c1");
        let key = SnapshotStore::object_key("repo", "c1", "src/a.js");
        assert_eq!(relative_to(&key, &prefix).as_deref(), Some("src/a.js"));
        assert_eq!(relative_to(&prefix, &prefix), None);
        let other = SnapshotStore::object_key("other", "c1", "a.js");
        assert_eq!(relative_to(&other, &prefix), None);
    }

    #[test]
    fn encoded_segments_decode_to_original_names() {
        let prefix = SnapshotStore::commit_prefix("repo", "c1");
        for name in ["data[1].csv", "100%.txt", "notes~", "v~2 [draft].md"] {
            let key = SnapshotStore::object_key("repo", "c1", &format!("dir/{}", name));
            assert_eq!(
                relative_to(&key, &prefix),
                Some(format!("dir/{}", name))
            );
            assert_eq!(file_name(&key).as_deref(), Some(name));
        }
    }

    #[test]
    fn traversal_segments_are_rejected() {
        let prefix = SnapshotStore::commit_prefix("repo", "c1");
        let key = prefix.child("..").child("escape.txt");
        assert_eq!(relative_to(&key, &prefix), None);
        let key = prefix.child("a/b");
        assert_eq!(relative_to(&key, &prefix), None);
    }

    #[tokio::test]
    async fn delimiter_listing_separates_folders_and_files() {
        let store = SnapshotStore::in_memory();
        for path in ["readme.md", "src/a.js", "src/util/b.js"] {
            store
                .put_commit_file("repo", "c1", path, Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        let listing = store
            .list_dir(&SnapshotStore::commit_prefix("repo", "c1"))
            .await
            .unwrap();
        let folders: Vec<_> = listing.folders.iter().map(|p| p.to_string()).collect();
        let files: Vec<_> = listing.files.iter().map(|m| m.location.to_string()).collect();
        assert_eq!(folders, vec!["repo/commits/c1/src".to_owned()]);
        assert_eq!(files, vec!["repo/commits/c1/readme.md".to_owned()]);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = SnapshotStore::in_memory();
        let err = store
            .get(&SnapshotStore::object_key("repo", "c1", "nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, CodiumError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn slow_backend_calls_fail_as_remote_failures() {
        use object_store::throttle::{ThrottleConfig, ThrottledStore};

        let slow = ThrottledStore::new(
            InMemory::new(),
            ThrottleConfig {
                wait_get_per_call: Duration::from_secs(10),
                wait_list_with_delimiter_per_call: Duration::from_secs(10),
                ..Default::default()
            },
        );
        let store = SnapshotStore::new(Arc::new(slow)).with_timeout(Duration::from_millis(50));
        let key = SnapshotStore::object_key("repo", "c1", "a.txt");
        store.put(&key, Bytes::from_static(b"a")).await.unwrap();

        let err = store.get(&key).await.unwrap_err();
        assert!(matches!(err, CodiumError::RemoteFailure(ref msg) if msg.contains("50ms")));
        let err = store
            .list_dir(&SnapshotStore::commit_prefix("repo", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CodiumError::RemoteFailure(_)));
    }

}
