use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use codium::{
    fs::Workspace,
    model::{CommitRecord, LocalConfig, Repository},
    storage::SnapshotStore,
    sync::{MetadataClient, Synchronizer},
    CodiumError,
};
use pretty_assertions::assert_eq;

const REPO: &str = "repo-1";

/// In-process stand-in for the metadata API.
struct FakeMetadata {
    commits: Mutex<Vec<CommitRecord>>,
}

impl FakeMetadata {
    fn new() -> Self {
        Self {
            commits: Mutex::new(Vec::new()),
        }
    }

    fn registered(&self) -> Vec<CommitRecord> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataClient for FakeMetadata {
    async fn register_commit(
        &self,
        _token: &str,
        _repository_id: &str,
        record: &CommitRecord,
    ) -> Result<CommitRecord, CodiumError> {
        self.commits.lock().unwrap().push(record.clone());
        Ok(record.clone())
    }

    async fn fetch_repository(&self, repository_id: &str) -> Result<Repository, CodiumError> {
        Ok(Repository {
            id: repository_id.to_owned(),
            name: "demo".to_owned(),
            description: String::new(),
            visibility: true,
            owner: "u1".to_owned(),
            commits: self.registered(),
            star_count: 0,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }
}

async fn workspace() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::create(
        dir.path(),
        &LocalConfig {
            repository_id: REPO.to_owned(),
        },
    )
    .await
    .unwrap();
    (dir, ws)
}

async fn commit_file(
    dir: &tempfile::TempDir,
    ws: &Workspace,
    name: &str,
    body: &str,
    message: &str,
) -> String {
    // ids order by millisecond first
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let path = dir.path().join(name);
    tokio::fs::write(&path, body).await.unwrap();
    ws.stage(&path).await.unwrap();
    ws.commit(message).await.unwrap().id
}

#[tokio::test]
async fn push_then_pull_into_fresh_workspace_restores_files() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    let first = commit_file(&dir, &ws, "a.txt", "alpha", "first").await;
    let second = commit_file(&dir, &ws, "b.txt", "beta", "second").await;

    let report = Synchronizer::new(&ws, &store, &metadata)
        .push(REPO, Some("token"))
        .await
        .unwrap();
    assert_eq!(report.pushed, vec![first.clone(), second.clone()]);
    assert_eq!(report.uploaded_files, 2);
    assert_eq!(report.registered.commit_id, second);
    assert_eq!(metadata.registered().len(), 1);

    let (other_dir, other) = workspace().await;
    let pulled = Synchronizer::new(&other, &store, &metadata)
        .pull(REPO)
        .await
        .unwrap();
    assert_eq!(pulled.new_commits, vec![first.clone(), second.clone()]);
    assert_eq!(pulled.downloaded_files, 2);

    other.revert(&second).await.unwrap();
    let restored = tokio::fs::read_to_string(other_dir.path().join("b.txt"))
        .await
        .unwrap();
    assert_eq!(restored, "beta");
    let meta = other.read_commit_meta(&second).await.unwrap().unwrap();
    assert_eq!(meta.message, "second");
    let meta = other.read_commit_meta(&first).await.unwrap().unwrap();
    assert_eq!(meta.message, "pulled from remote");
}

#[tokio::test]
async fn second_push_has_nothing_to_do() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    commit_file(&dir, &ws, "a.txt", "alpha", "first").await;
    let sync = Synchronizer::new(&ws, &store, &metadata);
    sync.push(REPO, Some("token")).await.unwrap();

    let err = sync.push(REPO, Some("token")).await.unwrap_err();
    assert!(matches!(err, CodiumError::NothingToPush));
    assert!(err.is_informational());
    assert_eq!(metadata.registered().len(), 1);

    let next = commit_file(&dir, &ws, "a.txt", "alpha 2", "second").await;
    let report = sync.push(REPO, Some("token")).await.unwrap();
    assert_eq!(report.pushed, vec![next]);
    assert_eq!(metadata.registered().len(), 2);
}

#[tokio::test]
async fn push_without_token_or_commits_fails_early() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    let sync = Synchronizer::new(&ws, &store, &metadata);

    assert!(matches!(
        sync.push(REPO, None).await.unwrap_err(),
        CodiumError::NotAuthenticated
    ));
    assert!(matches!(
        sync.push(REPO, Some("token")).await.unwrap_err(),
        CodiumError::NoLocalCommits
    ));

    commit_file(&dir, &ws, "a.txt", "alpha", "first").await;
    assert!(matches!(
        sync.push(REPO, None).await.unwrap_err(),
        CodiumError::NotAuthenticated
    ));
    assert!(store
        .list_all(&SnapshotStore::repository_prefix(REPO))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn pull_from_empty_remote_reports_nothing() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (_dir, ws) = workspace().await;
    let err = Synchronizer::new(&ws, &store, &metadata)
        .pull(REPO)
        .await
        .unwrap_err();
    assert!(matches!(err, CodiumError::NothingToPull));
}

#[tokio::test]
async fn pull_skips_unexpected_keys() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    let id = commit_file(&dir, &ws, "a.txt", "alpha", "first").await;
    Synchronizer::new(&ws, &store, &metadata)
        .push(REPO, Some("token"))
        .await
        .unwrap();
    store
        .put(
            &SnapshotStore::repository_prefix(REPO).child("stray.txt"),
            "junk".into(),
        )
        .await
        .unwrap();
    store
        .put(
            &SnapshotStore::object_key(REPO, ".in-flight", "x.txt"),
            "junk".into(),
        )
        .await
        .unwrap();

    let (_other_dir, other) = workspace().await;
    let report = Synchronizer::new(&other, &store, &metadata)
        .pull(REPO)
        .await
        .unwrap();
    assert_eq!(report.skipped_keys, 2);
    assert_eq!(report.new_commits, vec![id]);
    assert_eq!(other.commit_ids().await.unwrap().len(), 1);
}

#[tokio::test]
async fn pull_keeps_identical_local_files() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    commit_file(&dir, &ws, "a.txt", "alpha", "first").await;
    let sync = Synchronizer::new(&ws, &store, &metadata);
    sync.push(REPO, Some("token")).await.unwrap();

    let report = sync.pull(REPO).await.unwrap();
    assert!(report.new_commits.is_empty());
    assert_eq!(report.downloaded_files, 0);
    assert_eq!(report.up_to_date_files, 1);
}

#[tokio::test]
async fn names_with_reserved_characters_survive_a_round_trip() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    let names = ["data[1].csv", "100%.txt", "notes~"];
    for name in names {
        tokio::fs::write(dir.path().join(name), format!("body of {}", name))
            .await
            .unwrap();
        ws.stage(dir.path().join(name)).await.unwrap();
    }
    let commit = ws.commit("odd names").await.unwrap().id;
    Synchronizer::new(&ws, &store, &metadata)
        .push(REPO, Some("token"))
        .await
        .unwrap();

    let (_other_dir, other) = workspace().await;
    let report = Synchronizer::new(&other, &store, &metadata)
        .pull(REPO)
        .await
        .unwrap();
    assert_eq!(report.downloaded_files, 3);
    assert_eq!(report.skipped_keys, 0);

    let mut pulled = other
        .commit_files(&commit)
        .await
        .unwrap()
        .into_iter()
        .map(|(relative, _)| relative)
        .collect::<Vec<_>>();
    pulled.sort();
    let mut expected = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    expected.sort();
    assert_eq!(pulled, expected);
    let body = tokio::fs::read_to_string(other.commit_dir(&commit).join("100%.txt"))
        .await
        .unwrap();
    assert_eq!(body, "body of 100%.txt");
}

#[tokio::test]
async fn remote_root_sidecar_name_is_skipped() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    let id = commit_file(&dir, &ws, "a.txt", "alpha", "first").await;
    Synchronizer::new(&ws, &store, &metadata)
        .push(REPO, Some("token"))
        .await
        .unwrap();
    store
        .put(
            &SnapshotStore::object_key(REPO, &id, "commit.json"),
            "not a sidecar".into(),
        )
        .await
        .unwrap();

    let (_other_dir, other) = workspace().await;
    let report = Synchronizer::new(&other, &store, &metadata)
        .pull(REPO)
        .await
        .unwrap();
    assert_eq!(report.skipped_keys, 1);
    assert_eq!(report.downloaded_files, 1);
    let meta = other.read_commit_meta(&id).await.unwrap().unwrap();
    assert_eq!(meta.message, "first");
    assert_eq!(meta.files, vec!["a.txt".to_owned()]);
}

#[tokio::test]
async fn pull_repairs_same_sized_local_changes() {
    let store = SnapshotStore::in_memory();
    let metadata = FakeMetadata::new();
    let (dir, ws) = workspace().await;
    let id = commit_file(&dir, &ws, "a.txt", "alpha", "first").await;
    let sync = Synchronizer::new(&ws, &store, &metadata);
    sync.push(REPO, Some("token")).await.unwrap();

    let local = ws.commit_dir(&id).join("a.txt");
    tokio::fs::write(&local, "ALPHA").await.unwrap();
    let report = sync.pull(REPO).await.unwrap();
    assert_eq!(report.downloaded_files, 1);
    assert_eq!(report.up_to_date_files, 0);
    assert_eq!(tokio::fs::read_to_string(&local).await.unwrap(), "alpha");
}
