//! File-backed version store
//!
//! Layout:
//!
//! ```text
//! snapshots/
//! ├── v1.json
//! ├── v2.json
//! └── v3.json
//! ```
//!
//! Each snapshot is written to a temporary file in `snapshots/` and then
//! linked into place without clobbering, so a version file either exists in
//! full or not at all, and two writers can never both claim one version.
//!
//! Filesystem, serialization and git failures surface as
//! [`RegistryError::StoreUnavailable`]. Checksum mismatches stay
//! [`RegistryError::Corrupt`].

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use git2::{Commit, Oid, Repository, Signature};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::VersionStore;
use crate::error::{RegistryError, Result};
use crate::snapshot::SchemaSnapshot;
use crate::version::SchemaVersion;

const SNAPSHOTS_DIR: &str = "snapshots";
const DEFAULT_AUTHOR: &str = "Shape Registry";
const SIGNATURE_EMAIL: &str = "shape-registry@localhost";

/// Options for opening a [`FileVersionStore`]
#[derive(Debug, Clone, Default)]
pub struct FileStoreOptions {
    /// Commit and tag every appended snapshot in a git repository at the root
    pub git_history: bool,
    /// Author recorded on git commits
    pub author: Option<String>,
}

/// Durable version store rooted at a directory.
///
/// Open once at startup and share via `Arc`; filesystem work runs on the
/// blocking thread pool.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    root: PathBuf,
    git: Option<GitHistory>,
}

#[derive(Debug, Clone)]
struct GitHistory {
    author: String,
    /// Serializes index updates and commits
    lock: Arc<Mutex<()>>,
}

impl FileVersionStore {
    /// Open an existing store or create a new one
    pub fn open(path: impl AsRef<Path>, options: FileStoreOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        fs::create_dir_all(root.join(SNAPSHOTS_DIR)).map_err(|e| unavailable(e.into()))?;

        let git = if options.git_history {
            // Open or init git repository
            if Repository::open(&root).is_err() {
                Repository::init(&root).map_err(|e| unavailable(e.into()))?;
            }
            Some(GitHistory {
                author: options.author.unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
                lock: Arc::new(Mutex::new(())),
            })
        } else {
            None
        };

        debug!(root = %root.display(), git_history = git.is_some(), "Opened file version store");
        Ok(Self { root, git })
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(FileVersionStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| RegistryError::StoreUnavailable(format!("store task failed: {e}")))?
            .map_err(unavailable)
    }

    /// All stored versions, ascending
    fn versions(&self) -> Result<Vec<SchemaVersion>> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(self.snapshots_dir())? {
            let entry = entry?;
            let name = entry.file_name();
            // Temporary files and anything else that is not vN.json are skipped
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(version) = stem.parse::<SchemaVersion>() {
                if stem.starts_with('v') {
                    versions.push(version);
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn path_for(&self, version: SchemaVersion) -> PathBuf {
        self.snapshots_dir().join(format!("{}.json", version.file_stem()))
    }

    fn read(&self, version: SchemaVersion) -> Result<Option<SchemaSnapshot>> {
        let content = match fs::read_to_string(self.path_for(version)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: SchemaSnapshot = serde_json::from_str(&content)?;
        if snapshot.version != version {
            return Err(RegistryError::InvalidVersion(format!(
                "file {}.json holds snapshot {}",
                version.file_stem(),
                snapshot.version
            )));
        }
        snapshot.verify()?;
        Ok(Some(snapshot))
    }

    fn read_latest(&self) -> Result<Option<SchemaSnapshot>> {
        match self.versions()?.last() {
            Some(version) => self.read(*version),
            None => Ok(None),
        }
    }

    fn write(&self, snapshot: &SchemaSnapshot, abandoned: &Mutex<bool>) -> Result<()> {
        let latest = self.versions()?.last().copied();
        if snapshot.version != SchemaVersion::after(latest) {
            return Err(RegistryError::conflict(snapshot.version, latest));
        }

        let mut tmp = NamedTempFile::new_in(self.snapshots_dir())?;
        serde_json::to_writer_pretty(&mut tmp, snapshot)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;

        // Held across the link so a caller that gives up either sees the file
        // in place or knows it will never appear
        let abandoned = abandoned.lock();
        if *abandoned {
            return Err(RegistryError::StoreUnavailable(format!(
                "append of {} abandoned before commit",
                snapshot.version
            )));
        }
        if let Err(e) = tmp.persist_noclobber(self.path_for(snapshot.version)) {
            return Err(match e.error.kind() {
                ErrorKind::AlreadyExists => RegistryError::conflict(snapshot.version, latest),
                _ => e.error.into(),
            });
        }
        drop(abandoned);

        if let Some(git) = &self.git {
            // The snapshot file is already durable; history is best effort
            if let Err(e) = self.record_history(git, snapshot.version) {
                warn!(
                    version = %snapshot.version,
                    error = %e,
                    "Failed to record snapshot in git history"
                );
            }
        }
        Ok(())
    }

    fn record_history(&self, git: &GitHistory, version: SchemaVersion) -> Result<()> {
        let _guard = git.lock.lock();
        let repo = Repository::open(&self.root)?;
        let relative = Path::new(SNAPSHOTS_DIR).join(format!("{}.json", version.file_stem()));

        let commit = git_commit(&repo, &relative, &format!("Schema {}", version), &git.author)?;
        git_tag(&repo, commit, &format!("schema-{}", version), &git.author)?;
        debug!(%version, commit = %commit, "Recorded snapshot in git history");
        Ok(())
    }
}

/// Report a failure of the underlying filesystem or repository as an outage
fn unavailable(err: RegistryError) -> RegistryError {
    match err {
        RegistryError::Io(e) => RegistryError::StoreUnavailable(format!("filesystem: {e}")),
        RegistryError::Json(e) => {
            RegistryError::StoreUnavailable(format!("unreadable snapshot: {e}"))
        }
        RegistryError::Git(e) => RegistryError::StoreUnavailable(format!("git: {e}")),
        other => other,
    }
}

/// Marks an append as abandoned when its future is dropped
struct AbandonOnDrop(Arc<Mutex<bool>>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        *self.0.lock() = true;
    }
}

/// Create a Git commit containing one snapshot file
fn git_commit(repo: &Repository, path: &Path, summary: &str, author: &str) -> Result<Oid> {
    let mut index = repo.index()?;
    index.add_path(path)?;
    index.write()?;

    let oid = index.write_tree()?;
    let tree = repo.find_tree(oid)?;

    let sig = Signature::now(author, SIGNATURE_EMAIL)?;

    let parent_commit = head_commit(repo);
    let parents: Vec<&Commit> = parent_commit.iter().collect();

    let commit_oid = repo.commit(Some("HEAD"), &sig, &sig, summary, &tree, &parents)?;
    Ok(commit_oid)
}

/// Create an annotated Git tag on a commit
fn git_tag(repo: &Repository, commit: Oid, tag_name: &str, author: &str) -> Result<()> {
    let obj = repo.find_object(commit, None)?;
    let sig = Signature::now(author, SIGNATURE_EMAIL)?;
    repo.tag(tag_name, &obj, &sig, &format!("Release {}", tag_name), false)?;
    Ok(())
}

/// Get the HEAD commit if it exists
fn head_commit(repo: &Repository) -> Option<Commit<'_>> {
    repo.head().ok().and_then(|head| head.peel_to_commit().ok())
}

#[async_trait]
impl VersionStore for FileVersionStore {
    async fn latest(&self) -> Result<Option<SchemaSnapshot>> {
        self.blocking(|store| store.read_latest()).await
    }

    async fn append(&self, snapshot: &SchemaSnapshot) -> Result<()> {
        let snapshot = snapshot.clone();
        let abandoned = Arc::new(Mutex::new(false));
        let _guard = AbandonOnDrop(Arc::clone(&abandoned));
        self.blocking(move |store| store.write(&snapshot, &abandoned)).await
    }

    async fn get(&self, version: SchemaVersion) -> Result<Option<SchemaSnapshot>> {
        self.blocking(move |store| store.read(version)).await
    }

    async fn history(&self) -> Result<Vec<SchemaSnapshot>> {
        self.blocking(|store| {
            store
                .versions()?
                .into_iter()
                .filter_map(|v| store.read(v).transpose())
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{creations, ChangeRecord};
    use crate::infer::{DataType, FieldMap};
    use tempfile::tempdir;

    fn snapshot(n: u64, fields: &[(&str, DataType)]) -> SchemaSnapshot {
        let fields: FieldMap = fields.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let changes = creations(&fields);
        SchemaSnapshot::new(SchemaVersion::new(n).unwrap(), fields, changes).unwrap()
    }

    #[tokio::test]
    async fn test_create_store() {
        let dir = tempdir().unwrap();
        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        assert!(dir.path().join("snapshots").is_dir());
        assert!(store.latest().await.unwrap().is_none());
        assert!(store.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
            store.append(&snapshot(1, &[("x", DataType::String)])).await.unwrap();
            store
                .append(&snapshot(2, &[("x", DataType::String), ("y", DataType::Float)]))
                .await
                .unwrap();
        }

        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.version.get(), 2);
        assert_eq!(latest.fields["y"], DataType::Float);

        let versions: Vec<u64> = store
            .history()
            .await
            .unwrap()
            .iter()
            .map(|s| s.version.get())
            .collect();
        assert_eq!(versions, vec![1, 2]);
        assert!(dir.path().join("snapshots/v2.json").is_file());
    }

    #[tokio::test]
    async fn test_immutability() {
        let dir = tempdir().unwrap();
        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        store.append(&snapshot(1, &[("x", DataType::String)])).await.unwrap();

        // Same version again, and a gap, both conflict
        let again = store.append(&snapshot(1, &[("x", DataType::Integer)])).await;
        assert!(again.unwrap_err().is_conflict());
        let gap = store.append(&snapshot(3, &[("x", DataType::Integer)])).await;
        assert!(gap.unwrap_err().is_conflict());

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.fields["x"], DataType::String);
    }

    #[tokio::test]
    async fn test_ignores_stray_files() {
        let dir = tempdir().unwrap();
        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        fs::write(dir.path().join("snapshots/.tmpabc"), "partial").unwrap();
        fs::write(dir.path().join("snapshots/notes.json"), "{}").unwrap();
        fs::write(dir.path().join("snapshots/7.json"), "{}").unwrap();

        assert!(store.latest().await.unwrap().is_none());
        store.append(&snapshot(1, &[])).await.unwrap();
        assert_eq!(store.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_detects_tampering() {
        let dir = tempdir().unwrap();
        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        store.append(&snapshot(1, &[("x", DataType::String)])).await.unwrap();

        let path = dir.path().join("snapshots/v1.json");
        let tampered = fs::read_to_string(&path).unwrap().replace("\"string\"", "\"boolean\"");
        fs::write(&path, tampered).unwrap();

        assert!(matches!(
            store.latest().await,
            Err(RegistryError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_git_history() {
        let dir = tempdir().unwrap();
        let options = FileStoreOptions {
            git_history: true,
            author: Some("ETL Pipeline".to_string()),
        };
        let store = FileVersionStore::open(dir.path(), options).unwrap();

        store.append(&snapshot(1, &[("x", DataType::String)])).await.unwrap();
        let fields: FieldMap = [("x", DataType::String), ("y", DataType::Integer)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let second = SchemaSnapshot::new(
            SchemaVersion::new(2).unwrap(),
            fields,
            vec![ChangeRecord::add("y", DataType::Integer)],
        )
        .unwrap();
        store.append(&second).await.unwrap();

        let repo = Repository::open(dir.path()).unwrap();
        let tags = repo.tag_names(Some("schema-v*")).unwrap();
        let mut names: Vec<_> = tags.iter().flatten().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["schema-v1", "schema-v2"]);

        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.summary(), Some("Schema v2"));
        assert_eq!(head.author().name(), Some("ETL Pipeline"));
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let dir = tempdir().unwrap();
        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        fs::remove_dir_all(dir.path().join("snapshots")).unwrap();

        assert!(matches!(
            store.latest().await,
            Err(RegistryError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.history().await,
            Err(RegistryError::StoreUnavailable(_))
        ));
        let err = store.append(&snapshot(1, &[("x", DataType::String)])).await.unwrap_err();
        assert!(matches!(err, RegistryError::StoreUnavailable(_)));
        assert!(!err.is_conflict());
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_unavailable() {
        let dir = tempdir().unwrap();
        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();
        fs::write(dir.path().join("snapshots/v1.json"), "{ not json").unwrap();

        assert!(matches!(
            store.get(SchemaVersion::FIRST).await,
            Err(RegistryError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_abandoned_write_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let store = FileVersionStore::open(dir.path(), FileStoreOptions::default()).unwrap();

        let abandoned = Mutex::new(true);
        let err = store
            .write(&snapshot(1, &[("x", DataType::String)]), &abandoned)
            .unwrap_err();
        assert!(matches!(err, RegistryError::StoreUnavailable(_)));

        // Neither the version file nor the temporary file remains
        assert_eq!(fs::read_dir(dir.path().join("snapshots")).unwrap().count(), 0);
        assert!(store.read_latest().unwrap().is_none());

        store
            .write(&snapshot(1, &[("x", DataType::String)]), &Mutex::new(false))
            .unwrap();
        assert_eq!(store.versions().unwrap(), vec![SchemaVersion::FIRST]);
    }
}
