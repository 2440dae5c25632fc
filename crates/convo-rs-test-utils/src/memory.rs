use async_trait::async_trait;
use convo_rs_memory::{MemoryBackend, MemoryError, UserMemory};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Backend keeping records in a process-local map.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    records: Arc<RwLock<HashMap<String, UserMemory>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = UserMemory>) -> Self {
        let backend = Self::new();
        {
            let mut map = backend.records.write();
            for record in records {
                map.insert(record.user_id().to_string(), record);
            }
        }
        backend
    }

    pub fn get(&self, user_id: &str) -> Option<UserMemory> {
        self.records.read().get(user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn load(&self, user_id: &str) -> Result<Option<UserMemory>, MemoryError> {
        Ok(self.get(user_id))
    }

    async fn save(&self, memory: &UserMemory) -> Result<(), MemoryError> {
        self.records
            .write()
            .insert(memory.user_id().to_string(), memory.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, MemoryError> {
        Ok(self.records.write().remove(user_id).is_some())
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, MemoryError> {
        let mut ids: Vec<String> = self.records.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Backend whose writes fail with an IO error; reads delegate to `inner`.
#[derive(Clone, Default)]
pub struct FailingBackend {
    inner: InMemoryBackend,
    attempts: Arc<AtomicUsize>,
}

impl FailingBackend {
    pub fn new(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of rejected save/delete calls.
    pub fn failed_writes(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> MemoryError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        MemoryError::Io(io::Error::other("disk unavailable"))
    }
}

#[async_trait]
impl MemoryBackend for FailingBackend {
    async fn load(&self, user_id: &str) -> Result<Option<UserMemory>, MemoryError> {
        self.inner.load(user_id).await
    }

    async fn save(&self, _memory: &UserMemory) -> Result<(), MemoryError> {
        Err(self.fail())
    }

    async fn delete(&self, _user_id: &str) -> Result<bool, MemoryError> {
        Err(self.fail())
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, MemoryError> {
        self.inner.list_user_ids().await
    }
}

/// Backend that sleeps before every call, for timeout tests.
#[derive(Clone)]
pub struct SlowBackend {
    inner: InMemoryBackend,
    delay: Duration,
}

impl SlowBackend {
    pub fn new(inner: InMemoryBackend, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl MemoryBackend for SlowBackend {
    async fn load(&self, user_id: &str) -> Result<Option<UserMemory>, MemoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.load(user_id).await
    }

    async fn save(&self, memory: &UserMemory) -> Result<(), MemoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(memory).await
    }

    async fn delete(&self, user_id: &str) -> Result<bool, MemoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(user_id).await
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, MemoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_user_ids().await
    }
}
