//! Memory manager: per-user load, mutate, bound and persist cycles.

use crate::backend::MemoryBackend;
use crate::context::{ContextMessage, build_context};
use crate::error::MemoryError;
use crate::locks::UserLocks;
use crate::model::{ChatMessage, MessageType, Role, UserMemory, UserStats};
use crate::policy::MemoryLimits;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Max length of a preference key.
const MAX_PREFERENCE_KEY_LEN: usize = 64;
/// Max length of a preference value, in characters.
const MAX_PREFERENCE_VALUE_CHARS: usize = 256;

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Users whose records were deleted.
    pub purged: usize,
    /// Users skipped because a writer held their lock.
    pub skipped: usize,
    /// Users whose load or delete failed.
    pub failed: usize,
}

/// Orchestrates per-user memory over a [`MemoryBackend`].
///
/// Writes to one user are serialized by a per-user lock held for the whole
/// load, mutate, save cycle. Reads take no lock and rely on the backend's
/// atomic saves for consistent snapshots.
pub struct MemoryManager {
    backend: Arc<dyn MemoryBackend>,
    limits: MemoryLimits,
    locks: UserLocks,
}

impl MemoryManager {
    pub fn new(backend: Arc<dyn MemoryBackend>, limits: MemoryLimits) -> Self {
        info!(
            "memory manager ready (backend={}, max_messages_per_user={}, max_context_messages={}, expire_days={})",
            backend.name(),
            limits.max_messages_per_user,
            limits.max_context_messages,
            limits.expire_days
        );
        Self {
            backend,
            limits,
            locks: UserLocks::new(),
        }
    }

    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    /// Label of the underlying backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Append a turn to a user's history.
    pub async fn add_message(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
        message_type: MessageType,
    ) -> Result<(), MemoryError> {
        validate_user_id(user_id)?;
        if content.trim().is_empty() {
            return Err(MemoryError::validation("message content must not be empty"));
        }

        let _guard = self.locks.lock(user_id).await;
        let mut memory = self.load_or_new(user_id).await?;
        let evicted = memory.append(
            ChatMessage::new(role, content, message_type),
            self.limits.max_messages_per_user,
        );
        self.bounded(self.backend.save(&memory)).await?;
        debug!(
            "added message (user_id={}, role={}, type={}, evicted={})",
            user_id, role, message_type, evicted
        );
        Ok(())
    }

    /// Project the context window for a user. Never creates a record.
    pub async fn get_context(&self, user_id: &str) -> Result<Vec<ContextMessage>, MemoryError> {
        validate_user_id(user_id)?;
        let memory = self
            .load(user_id)
            .await?
            .unwrap_or_else(|| UserMemory::new(user_id, Utc::now()));
        let context = build_context(&memory.snapshot(), self.limits.max_context_messages);
        debug!(
            "built context (user_id={}, entries={})",
            user_id,
            context.len()
        );
        Ok(context)
    }

    /// Usage statistics for a user; zeroed when nothing is stored.
    pub async fn get_stats(&self, user_id: &str) -> Result<UserStats, MemoryError> {
        validate_user_id(user_id)?;
        let stats = match self.load(user_id).await? {
            Some(memory) => memory.snapshot().stats(),
            None => UserStats::empty(user_id),
        };
        Ok(stats)
    }

    /// Delete everything stored for a user. Returns `false` if nothing existed.
    pub async fn clear(&self, user_id: &str) -> Result<bool, MemoryError> {
        validate_user_id(user_id)?;
        let _guard = self.locks.lock(user_id).await;
        let removed = self.bounded(self.backend.delete(user_id)).await?;
        info!("cleared memory (user_id={user_id}, existed={removed})");
        Ok(removed)
    }

    /// Insert or replace a user preference.
    pub async fn set_preference(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), MemoryError> {
        validate_user_id(user_id)?;
        validate_preference(key, value)?;

        let _guard = self.locks.lock(user_id).await;
        let mut memory = self.load_or_new(user_id).await?;
        memory.set_preference(key, value, Utc::now());
        self.bounded(self.backend.save(&memory)).await?;
        debug!("set preference (user_id={user_id}, key={key})");
        Ok(())
    }

    /// Ids of every stored user.
    pub async fn list_users(&self) -> Result<Vec<String>, MemoryError> {
        self.bounded(self.backend.list_user_ids()).await
    }

    /// Purge users inactive for longer than `expire_days`. Returns the purge count.
    pub async fn run_expiry_sweep(&self, now: DateTime<Utc>) -> Result<usize, MemoryError> {
        Ok(self.sweep_expired(now).await?.purged)
    }

    /// Expiry sweep with a detailed report.
    ///
    /// Users locked by a writer are skipped rather than waited on; they are
    /// reconsidered on the next sweep.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, MemoryError> {
        let user_ids = self.bounded(self.backend.list_user_ids()).await?;
        let mut report = SweepReport::default();

        for user_id in user_ids {
            let Some(_guard) = self.locks.try_lock(&user_id) else {
                debug!("sweep skipped busy user (user_id={user_id})");
                report.skipped += 1;
                continue;
            };
            let memory = match self.load(&user_id).await {
                Ok(Some(memory)) => memory,
                Ok(None) => continue,
                Err(err) => {
                    warn!("sweep failed to load user (user_id={user_id}): {err}");
                    report.failed += 1;
                    continue;
                }
            };
            if !memory.is_expired(now, self.limits.expire_days) {
                continue;
            }
            match self.bounded(self.backend.delete(&user_id)).await {
                Ok(true) => {
                    info!(
                        "purged expired memory (user_id={}, last_interaction={})",
                        user_id,
                        memory.last_interaction()
                    );
                    report.purged += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("sweep failed to delete user (user_id={user_id}): {err}");
                    report.failed += 1;
                }
            }
        }

        let pruned = self.locks.prune();
        info!(
            "expiry sweep finished (purged={}, skipped={}, failed={}, pruned_locks={})",
            report.purged, report.skipped, report.failed, pruned
        );
        Ok(report)
    }

    /// Load a record and apply the current retention cap, which may be lower
    /// than the one it was saved under.
    async fn load(&self, user_id: &str) -> Result<Option<UserMemory>, MemoryError> {
        let Some(mut memory) = self.bounded(self.backend.load(user_id)).await? else {
            return Ok(None);
        };
        let evicted = memory.retain_latest(self.limits.max_messages_per_user);
        if evicted > 0 {
            debug!("applied retention cap on load (user_id={user_id}, evicted={evicted})");
        }
        Ok(Some(memory))
    }

    async fn load_or_new(&self, user_id: &str) -> Result<UserMemory, MemoryError> {
        match self.load(user_id).await? {
            Some(memory) => Ok(memory),
            None => {
                info!("creating memory for new user (user_id={user_id})");
                Ok(UserMemory::new(user_id, Utc::now()))
            }
        }
    }

    /// Apply the configured timeout to a backend call.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, MemoryError>>,
    ) -> Result<T, MemoryError> {
        match tokio::time::timeout(self.limits.io_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "backend call timed out (timeout={:?})",
                    self.limits.io_timeout
                );
                Err(MemoryError::Timeout(self.limits.io_timeout))
            }
        }
    }
}

fn validate_user_id(user_id: &str) -> Result<(), MemoryError> {
    if user_id.trim().is_empty() {
        return Err(MemoryError::validation("user id must not be empty"));
    }
    Ok(())
}

fn validate_preference(key: &str, value: &str) -> Result<(), MemoryError> {
    let key_ok = !key.is_empty()
        && key.len() <= MAX_PREFERENCE_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !key_ok {
        return Err(MemoryError::validation(format!(
            "invalid preference key: {key:?} (expected 1-{MAX_PREFERENCE_KEY_LEN} chars of [A-Za-z0-9_.-])"
        )));
    }
    if value.trim().is_empty() {
        return Err(MemoryError::validation(format!(
            "preference {key} must have a value"
        )));
    }
    if value.chars().count() > MAX_PREFERENCE_VALUE_CHARS {
        return Err(MemoryError::validation(format!(
            "preference {key} exceeds {MAX_PREFERENCE_VALUE_CHARS} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MemoryManager, SweepReport, validate_preference};
    use crate::backend::{FileMemoryBackend, MemoryBackend};
    use crate::context::ContextRole;
    use crate::error::MemoryError;
    use crate::model::{ChatMessage, MessageType, Role, UserMemory};
    use crate::policy::MemoryLimits;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tempfile::{TempDir, tempdir};

    fn manager_with(limits: MemoryLimits) -> (TempDir, Arc<FileMemoryBackend>, MemoryManager) {
        let temp = tempdir().expect("tempdir");
        let backend = Arc::new(FileMemoryBackend::new(temp.path()).expect("backend"));
        let manager = MemoryManager::new(backend.clone(), limits);
        (temp, backend, manager)
    }

    fn stale_memory(user_id: &str, days_ago: i64) -> UserMemory {
        let at = Utc::now() - Duration::days(days_ago);
        let mut memory = UserMemory::new(user_id, at);
        memory.append(
            ChatMessage::with_timestamp(Role::User, "old news", MessageType::Text, at),
            50,
        );
        memory
    }

    #[tokio::test]
    async fn eviction_keeps_latest_and_counts_all() {
        let (_temp, backend, manager) = manager_with(MemoryLimits {
            max_messages_per_user: 2,
            ..MemoryLimits::default()
        });
        for content in ["a", "b", "c"] {
            manager
                .add_message("u1", Role::User, content, MessageType::Text)
                .await
                .expect("add");
        }
        let memory = backend.load("u1").await.expect("load").expect("record");
        let contents: Vec<_> = memory.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
        assert_eq!(memory.total_messages(), 3);
    }

    #[tokio::test]
    async fn context_window_is_bounded_and_starts_with_system() {
        let (_temp, _backend, manager) = manager_with(MemoryLimits {
            max_context_messages: 2,
            ..MemoryLimits::default()
        });
        for content in ["a", "b", "c"] {
            manager
                .add_message("u1", Role::User, content, MessageType::Text)
                .await
                .expect("add");
        }
        let context = manager.get_context("u1").await.expect("context");
        assert_eq!(context.len(), 3);
        assert_eq!(context[0].role, ContextRole::System);
        assert_eq!(context[1].content, "b");
        assert_eq!(context[2].content, "c");
    }

    #[tokio::test]
    async fn reads_do_not_create_records() {
        let (_temp, backend, manager) = manager_with(MemoryLimits::default());
        let context = manager.get_context("ghost").await.expect("context");
        assert_eq!(context.len(), 1);
        let stats = manager.get_stats("ghost").await.expect("stats");
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.last_interaction, None);
        assert!(backend.list_user_ids().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn validation_rejects_before_io() {
        let (_temp, backend, manager) = manager_with(MemoryLimits::default());
        let err = manager
            .add_message("u1", Role::User, "   \n", MessageType::Text)
            .await
            .expect_err("blank content");
        assert!(matches!(err, MemoryError::Validation(_)));
        let err = manager
            .add_message(" ", Role::User, "hi", MessageType::Text)
            .await
            .expect_err("blank user");
        assert!(matches!(err, MemoryError::Validation(_)));
        let err = manager
            .set_preference("u1", "bad key", "formal")
            .await
            .expect_err("bad key");
        assert!(matches!(err, MemoryError::Validation(_)));
        assert!(!err.is_transient());
        assert!(backend.list_user_ids().await.expect("list").is_empty());
    }

    #[test]
    fn preference_rules() {
        assert!(validate_preference("tone", "formal").is_ok());
        assert!(validate_preference("ui.lang-2_x", "zh").is_ok());
        assert!(validate_preference("", "formal").is_err());
        assert!(validate_preference("tone", "  ").is_err());
        assert!(validate_preference(&"k".repeat(65), "v").is_err());
        assert!(validate_preference("tone", &"v".repeat(257)).is_err());
    }

    #[tokio::test]
    async fn clear_then_stats_is_zeroed_and_readd_starts_fresh() {
        let (_temp, _backend, manager) = manager_with(MemoryLimits::default());
        manager
            .add_message("u1", Role::User, "hello", MessageType::Voice)
            .await
            .expect("add");
        manager
            .set_preference("u1", "tone", "formal")
            .await
            .expect("pref");
        assert!(manager.clear("u1").await.expect("clear"));
        assert!(!manager.clear("u1").await.expect("clear again"));

        let stats = manager.get_stats("u1").await.expect("stats");
        assert_eq!(stats, crate::model::UserStats::empty("u1"));

        manager
            .add_message("u1", Role::User, "again", MessageType::Text)
            .await
            .expect("add");
        let stats = manager.get_stats("u1").await.expect("stats");
        assert_eq!(stats.total_messages, 1);
        assert!(stats.preferences.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_do_not_lose_updates() {
        let (_temp, backend, manager) = manager_with(MemoryLimits {
            max_messages_per_user: 100,
            ..MemoryLimits::default()
        });
        let manager = Arc::new(manager);
        let mut handles = Vec::new();
        for idx in 0..32 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .add_message("shared", Role::User, &format!("msg-{idx}"), MessageType::Text)
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("add");
        }

        let memory = backend.load("shared").await.expect("load").expect("record");
        assert_eq!(memory.total_messages(), 32);
        let mut contents: Vec<_> = memory.messages().iter().map(|m| m.content.clone()).collect();
        contents.sort();
        let mut expected: Vec<_> = (0..32).map(|idx| format!("msg-{idx}")).collect();
        expected.sort();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn writers_for_other_users_are_not_blocked() {
        let (_temp, _backend, manager) = manager_with(MemoryLimits::default());
        let _held = manager.locks.lock("busy").await;
        tokio::time::timeout(
            StdDuration::from_secs(5),
            manager.add_message("free", Role::User, "hi", MessageType::Text),
        )
        .await
        .expect("not blocked")
        .expect("add");
    }

    #[tokio::test]
    async fn sweep_purges_only_stale_users() {
        let (_temp, backend, manager) = manager_with(MemoryLimits {
            expire_days: 30,
            ..MemoryLimits::default()
        });
        backend.save(&stale_memory("old", 31)).await.expect("save old");
        backend.save(&stale_memory("recent", 29)).await.expect("save recent");
        manager
            .add_message("fresh", Role::User, "hi", MessageType::Text)
            .await
            .expect("add");

        let purged = manager.run_expiry_sweep(Utc::now()).await.expect("sweep");
        assert_eq!(purged, 1);
        assert_eq!(
            backend.list_user_ids().await.expect("list"),
            vec!["fresh".to_string(), "recent".to_string()]
        );
    }

    #[tokio::test]
    async fn sweep_skips_locked_users_until_next_run() {
        let (_temp, backend, manager) = manager_with(MemoryLimits::default());
        backend.save(&stale_memory("old", 90)).await.expect("save");

        let held = manager.locks.lock("old").await;
        let report = manager.sweep_expired(Utc::now()).await.expect("sweep");
        assert_eq!(
            report,
            SweepReport {
                purged: 0,
                skipped: 1,
                failed: 0
            }
        );
        drop(held);

        let report = manager.sweep_expired(Utc::now()).await.expect("sweep");
        assert_eq!(report.purged, 1);
        assert_eq!(manager.locks.len(), 0);
    }

    #[tokio::test]
    async fn lock_table_empties_without_a_sweep() {
        let (_temp, _backend, manager) = manager_with(MemoryLimits::default());
        for user_id in ["a", "b", "c"] {
            manager
                .add_message(user_id, Role::User, "hi", MessageType::Text)
                .await
                .expect("add");
        }
        manager.set_preference("a", "tone", "casual").await.expect("pref");
        assert!(manager.clear("b").await.expect("clear"));
        assert_eq!(manager.locks.len(), 0);
    }

    #[tokio::test]
    async fn very_long_user_ids_are_stored() {
        let (_temp, backend, manager) = manager_with(MemoryLimits::default());
        let user_id = "x".repeat(130);
        manager
            .add_message(&user_id, Role::User, "hi", MessageType::Text)
            .await
            .expect("add");
        let stats = manager.get_stats(&user_id).await.expect("stats");
        assert_eq!(stats.total_messages, 1);
        assert_eq!(manager.list_users().await.expect("list"), vec![user_id.clone()]);
        assert!(manager.clear(&user_id).await.expect("clear"));
        assert!(backend.list_user_ids().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn lowered_cap_applies_to_existing_records_on_read() {
        let (_temp, backend, manager) = manager_with(MemoryLimits::default());
        for content in ["a", "b", "c", "d", "e"] {
            manager
                .add_message("u1", Role::User, content, MessageType::Text)
                .await
                .expect("add");
        }
        drop(manager);

        let manager = MemoryManager::new(
            backend.clone(),
            MemoryLimits {
                max_messages_per_user: 2,
                ..MemoryLimits::default()
            },
        );
        let stats = manager.get_stats("u1").await.expect("stats");
        assert_eq!(stats.messages_in_store, 2);
        assert_eq!(stats.total_messages, 5);
        let context = manager.get_context("u1").await.expect("context");
        let contents: Vec<_> = context[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["d", "e"]);

        manager
            .add_message("u1", Role::User, "f", MessageType::Text)
            .await
            .expect("add");
        let stored = backend.load("u1").await.expect("load").expect("record");
        assert_eq!(stored.messages().len(), 2);
        assert_eq!(stored.total_messages(), 6);
    }

    #[tokio::test]
    async fn corrupt_record_restarts_history() {
        let (_temp, backend, manager) = manager_with(MemoryLimits::default());
        std::fs::write(backend.record_path("u1"), b"garbage").expect("write");
        manager
            .add_message("u1", Role::User, "hello", MessageType::Text)
            .await
            .expect("add");
        let stats = manager.get_stats("u1").await.expect("stats");
        assert_eq!(stats.total_messages, 1);
    }
}
