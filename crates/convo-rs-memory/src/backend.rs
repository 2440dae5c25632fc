//! Persistence backends for per-user memory records.

use crate::error::MemoryError;
use crate::model::UserMemory;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name prefix for user records.
const RECORD_PREFIX: &str = "user_";
/// Prefix for records whose id is too long to encode in the file name.
const HASHED_RECORD_PREFIX: &str = "user_sha256_";
/// File extension for user records.
const RECORD_EXTENSION: &str = ".json";
/// Longest id (in bytes) stored under a reversible hex name. Longer ids are
/// hashed so the name stays well inside the usual 255-byte limit.
const MAX_PLAIN_ID_BYTES: usize = 100;

#[async_trait]
/// Durable key(user) to record storage.
///
/// Implementations must make `save` atomic with respect to concurrent `load`
/// calls: a reader sees either the previous record or the new one. A `save`
/// or `delete` whose future is dropped before completing must not take
/// effect afterwards, since callers bound every call with a timeout.
pub trait MemoryBackend: Send + Sync {
    /// Load a user's record. Missing and unreadable records both yield `None`.
    async fn load(&self, user_id: &str) -> Result<Option<UserMemory>, MemoryError>;

    /// Persist a record, replacing any previous version.
    async fn save(&self, memory: &UserMemory) -> Result<(), MemoryError>;

    /// Delete a user's record. Returns `false` when nothing was stored.
    async fn delete(&self, user_id: &str) -> Result<bool, MemoryError>;

    /// List ids of every stored user.
    async fn list_user_ids(&self) -> Result<Vec<String>, MemoryError>;

    /// Short backend label for diagnostics.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// File-backed backend storing one JSON document per user.
#[derive(Debug, Clone)]
pub struct FileMemoryBackend {
    /// Root directory for user records.
    root: PathBuf,
}

impl FileMemoryBackend {
    /// Create a new file-backed backend under the given root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized file memory backend (root={})", root.display());
        Ok(Self { root })
    }

    /// Root directory holding the records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to a user's record file.
    pub fn record_path(&self, user_id: &str) -> PathBuf {
        self.root.join(record_file_name(user_id))
    }
}

#[async_trait]
impl MemoryBackend for FileMemoryBackend {
    async fn load(&self, user_id: &str) -> Result<Option<UserMemory>, MemoryError> {
        let path = self.record_path(user_id);
        let Some(bytes) = run_blocking(move || read_record(&path)).await? else {
            return Ok(None);
        };
        let memory: UserMemory = match serde_json::from_slice(&bytes) {
            Ok(memory) => memory,
            Err(err) => {
                warn!("ignoring corrupt memory record (user_id={user_id}): {err}");
                return Ok(None);
            }
        };
        if memory.user_id() != user_id {
            warn!(
                "ignoring memory record with mismatched owner (user_id={}, stored={})",
                user_id,
                memory.user_id()
            );
            return Ok(None);
        }
        let memory = memory.normalized();
        debug!(
            "loaded memory (user_id={}, messages={})",
            user_id,
            memory.messages().len()
        );
        Ok(Some(memory))
    }

    /// The payload is staged and synced on the blocking pool; the rename that
    /// publishes it runs inside this future. A caller that stops polling
    /// before the rename therefore never publishes the record, and the staged
    /// file is removed when the blocking task's output is dropped.
    async fn save(&self, memory: &UserMemory) -> Result<(), MemoryError> {
        let payload = serde_json::to_vec_pretty(memory)?;
        let root = self.root.clone();
        let staged = run_blocking(move || stage_record(&root, &payload)).await?;
        staged
            .persist(self.record_path(memory.user_id()))
            .map_err(|err| MemoryError::Io(err.error))?;
        debug!(
            "saved memory (user_id={}, messages={}, total={})",
            memory.user_id(),
            memory.messages().len(),
            memory.total_messages()
        );
        Ok(())
    }

    /// Unlinks inline, like the rename in `save`, so a timed-out caller
    /// never has a removal land after it gave up.
    async fn delete(&self, user_id: &str) -> Result<bool, MemoryError> {
        let removed = match fs::remove_file(self.record_path(user_id)) {
            Ok(()) => true,
            Err(err) if err.kind() == ErrorKind::NotFound => false,
            Err(err) => return Err(MemoryError::Io(err)),
        };
        if removed {
            info!("deleted memory record (user_id={user_id})");
        } else {
            debug!("memory record not found (user_id={user_id})");
        }
        Ok(removed)
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, MemoryError> {
        let root = self.root.clone();
        run_blocking(move || scan_user_ids(&root)).await
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Run blocking filesystem work off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, MemoryError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MemoryError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| MemoryError::Join(err.to_string()))?
}

/// Filesystem-safe file name for any user id.
///
/// Short ids map reversibly to `user_<hex>.json`; longer ids map to
/// `user_sha256_<digest>.json` and are recovered from the record itself.
fn record_file_name(user_id: &str) -> String {
    if user_id.len() <= MAX_PLAIN_ID_BYTES {
        format!("{RECORD_PREFIX}{}{RECORD_EXTENSION}", hex::encode(user_id))
    } else {
        let digest = Sha256::digest(user_id.as_bytes());
        format!(
            "{HASHED_RECORD_PREFIX}{}{RECORD_EXTENSION}",
            hex::encode(digest)
        )
    }
}

/// How a record file name identifies its owner.
#[derive(Debug, PartialEq, Eq)]
enum RecordName {
    /// The id is encoded in the name.
    Plain(String),
    /// The id is only stored inside the record.
    Hashed,
}

fn parse_record_name(file_name: &str) -> Option<RecordName> {
    let stem = file_name.strip_suffix(RECORD_EXTENSION)?;
    if let Some(digest) = stem.strip_prefix(HASHED_RECORD_PREFIX) {
        let is_digest = digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit());
        return is_digest.then_some(RecordName::Hashed);
    }
    let bytes = hex::decode(stem.strip_prefix(RECORD_PREFIX)?).ok()?;
    String::from_utf8(bytes).ok().map(RecordName::Plain)
}

fn read_record(path: &Path) -> Result<Option<Vec<u8>>, MemoryError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(MemoryError::Io(err)),
    }
}

/// Write and sync the payload to a temporary file in `root`.
///
/// The file is deleted when the returned handle drops without being
/// persisted.
fn stage_record(root: &Path, payload: &[u8]) -> Result<NamedTempFile, MemoryError> {
    let mut temp = NamedTempFile::new_in(root)?;
    temp.write_all(payload)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Owner field of a record, read without decoding the whole history.
#[derive(Deserialize)]
struct RecordOwner {
    user_id: String,
}

fn scan_user_ids(root: &Path) -> Result<Vec<String>, MemoryError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(MemoryError::Io(err)),
    };
    let mut user_ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        match parse_record_name(file_name) {
            Some(RecordName::Plain(user_id)) => user_ids.push(user_id),
            Some(RecordName::Hashed) => {
                let Some(bytes) = read_record(&entry.path())? else {
                    continue;
                };
                match serde_json::from_slice::<RecordOwner>(&bytes) {
                    Ok(owner) if record_file_name(&owner.user_id) == file_name => {
                        user_ids.push(owner.user_id)
                    }
                    Ok(_) => warn!("skipping record stored under a foreign name: {file_name}"),
                    Err(err) => warn!("skipping unreadable record {file_name}: {err}"),
                }
            }
            None => debug!("skipping non-record file: {file_name}"),
        }
    }
    user_ids.sort();
    Ok(user_ids)
}

#[cfg(test)]
mod tests {
    use super::{
        FileMemoryBackend, MemoryBackend, RecordName, parse_record_name, record_file_name,
    };
    use crate::model::{ChatMessage, MessageType, Role, UserMemory};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::ffi::OsString;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn staged_files(root: &Path) -> usize {
        fs::read_dir(root)
            .expect("read dir")
            .filter(|entry| {
                let name = entry.as_ref().expect("entry").file_name();
                name.to_string_lossy().starts_with(".tmp")
            })
            .count()
    }

    /// Wait for abandoned blocking writes to finish and clean up.
    async fn settle(root: &Path) {
        tokio::time::sleep(Duration::from_millis(200)).await;
        for _ in 0..100 {
            if staged_files(root) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("staged files were never cleaned up");
    }

    fn large_memory(user_id: &str) -> UserMemory {
        let mut memory = UserMemory::new(user_id, Utc::now());
        memory.append(
            ChatMessage::new(Role::User, "x".repeat(16 << 20), MessageType::Text),
            10,
        );
        memory
    }

    fn sample_memory(user_id: &str) -> UserMemory {
        let mut memory = UserMemory::new(user_id, Utc::now());
        memory.append(ChatMessage::new(Role::User, "hello", MessageType::Voice), 10);
        memory.append(
            ChatMessage::new(Role::Assistant, "hi there", MessageType::Text),
            10,
        );
        memory.set_preference("tone", "casual", Utc::now());
        memory
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        let memory = sample_memory("U123");

        backend.save(&memory).await.expect("save");
        let loaded = backend.load("U123").await.expect("load").expect("record");
        assert_eq!(loaded, memory);
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        assert_eq!(backend.load("nobody").await.expect("load"), None);
        assert!(!backend.delete("nobody").await.expect("delete"));
    }

    #[tokio::test]
    async fn corrupt_record_is_treated_as_missing() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        fs::write(backend.record_path("broken"), b"{ not json").expect("write");
        assert_eq!(backend.load("broken").await.expect("load"), None);
    }

    #[tokio::test]
    async fn record_for_another_user_is_ignored() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        let memory = sample_memory("alice");
        let payload = serde_json::to_vec(&memory).expect("encode");
        fs::write(backend.record_path("bob"), payload).expect("write");
        assert_eq!(backend.load("bob").await.expect("load"), None);
    }

    #[tokio::test]
    async fn save_replaces_previous_version_without_leftovers() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        let mut memory = sample_memory("u1");
        backend.save(&memory).await.expect("first save");
        memory.append(ChatMessage::new(Role::User, "again", MessageType::Text), 10);
        backend.save(&memory).await.expect("second save");

        let files: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(files, vec![OsString::from(record_file_name("u1"))]);
        let loaded = backend.load("u1").await.expect("load").expect("record");
        assert_eq!(loaded.messages().len(), 3);
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_record() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        let memory = sample_memory("u1");
        backend.save(&memory).await.expect("save");

        // A directory at the target path makes the final rename fail.
        let blocked = sample_memory("blocked");
        fs::create_dir(backend.record_path("blocked")).expect("dir");
        assert!(backend.save(&blocked).await.is_err());

        let files = fs::read_dir(temp.path()).expect("read dir").count();
        assert_eq!(files, 2);
        assert_eq!(backend.load("u1").await.expect("load"), Some(memory));
    }

    #[tokio::test]
    async fn lists_and_deletes_users_with_arbitrary_ids() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        for user_id in ["U1", "line:user/42", "名字"] {
            backend.save(&sample_memory(user_id)).await.expect("save");
        }
        fs::write(temp.path().join("notes.txt"), b"stray").expect("stray");

        let mut expected = vec![
            "U1".to_string(),
            "line:user/42".to_string(),
            "名字".to_string(),
        ];
        expected.sort();
        assert_eq!(backend.list_user_ids().await.expect("list"), expected);

        assert!(backend.delete("line:user/42").await.expect("delete"));
        assert_eq!(backend.load("line:user/42").await.expect("load"), None);
        assert_eq!(backend.list_user_ids().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn abandoned_save_is_never_published() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");

        let abandoned = large_memory("u1");
        let outcome = tokio::time::timeout(Duration::ZERO, backend.save(&abandoned)).await;
        assert!(outcome.is_err());

        let current = sample_memory("u1");
        backend.save(&current).await.expect("save");

        settle(temp.path()).await;
        assert_eq!(backend.load("u1").await.expect("load"), Some(current));
        assert_eq!(
            backend.list_user_ids().await.expect("list"),
            vec!["u1".to_string()]
        );
    }

    #[tokio::test]
    async fn abandoned_first_save_leaves_no_record() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        let outcome = tokio::time::timeout(Duration::ZERO, backend.save(&large_memory("u1"))).await;
        assert!(outcome.is_err());

        settle(temp.path()).await;
        assert_eq!(backend.load("u1").await.expect("load"), None);
        assert_eq!(fs::read_dir(temp.path()).expect("read dir").count(), 0);
    }

    #[tokio::test]
    async fn long_ids_are_stored_under_hashed_names() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        let long_id = "x".repeat(300);
        let memory = sample_memory(&long_id);

        backend.save(&memory).await.expect("save");
        backend.save(&sample_memory("short")).await.expect("save");
        let file_name = record_file_name(&long_id);
        assert!(file_name.len() < 100);
        assert!(backend.record_path(&long_id).is_file());

        assert_eq!(backend.load(&long_id).await.expect("load"), Some(memory));
        assert_eq!(
            backend.list_user_ids().await.expect("list"),
            vec!["short".to_string(), long_id.clone()]
        );
        assert!(backend.delete(&long_id).await.expect("delete"));
        assert_eq!(
            backend.list_user_ids().await.expect("list"),
            vec!["short".to_string()]
        );
    }

    #[tokio::test]
    async fn hashed_name_with_foreign_owner_is_not_listed() {
        let temp = tempdir().expect("tempdir");
        let backend = FileMemoryBackend::new(temp.path()).expect("backend");
        let long_id = "y".repeat(200);
        let payload = serde_json::to_vec(&sample_memory("someone-else")).expect("encode");
        fs::write(backend.record_path(&long_id), payload).expect("write");

        assert!(backend.list_user_ids().await.expect("list").is_empty());
        assert_eq!(backend.load(&long_id).await.expect("load"), None);
    }

    #[test]
    fn file_names_round_trip() {
        let name = record_file_name("a/b");
        assert_eq!(name, "user_612f62.json");
        assert_eq!(
            parse_record_name(&name),
            Some(RecordName::Plain("a/b".to_string()))
        );
        let hashed = record_file_name(&"z".repeat(101));
        assert!(hashed.starts_with("user_sha256_"));
        assert_eq!(parse_record_name(&hashed), Some(RecordName::Hashed));
        assert_eq!(parse_record_name("user_zz.json"), None);
        assert_eq!(parse_record_name("user_sha256_abc.json"), None);
        assert_eq!(parse_record_name("other.json"), None);
    }
}
