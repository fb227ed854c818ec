//! Conversation persistence.
//!
//! A store keeps one document per conversation identifier holding the full
//! message list and a timestamp the store assigns.  Every write replaces the
//! document wholesale.  Writes are not retried and are not guaranteed to be
//! idempotent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::observability::{STORE_ERRORS, STORE_WRITES};
use crate::types::{Conversation, Message};
use crate::utils::time::unix_millis;

/// Durable storage for conversations.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Write the first version of a conversation.
    async fn create_conversation(&self, id: &str, messages: &[Message]) -> Result<()>;

    /// Overwrite an existing conversation with the full message list.
    async fn update_conversation(&self, id: &str, messages: &[Message]) -> Result<()>;
}

/// A fresh, time-based conversation identifier.
pub fn new_conversation_id() -> String {
    format!("conversation-{}", unix_millis(OffsetDateTime::now_utc()))
}

/// A store write, as recorded by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `create_conversation(id, ..)` with this many messages.
    Create(String, usize),
    /// `update_conversation(id, ..)` with this many messages.
    Update(String, usize),
}

/// An in-process store that also records every call made to it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Conversation>>,
    calls: Mutex<Vec<StoreCall>>,
    fail_writes: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects every write.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// The stored document for `id`, if any.
    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        lock(&self.documents).get(id).cloned()
    }

    fn write(&self, call: StoreCall, id: &str, messages: &[Message], create: bool) -> Result<()> {
        lock(&self.calls).push(call);
        if self.fail_writes {
            return Err(Error::persistence(
                "store is rejecting writes",
                Some(id.to_string()),
            ));
        }
        let mut documents = lock(&self.documents);
        if !create && !documents.contains_key(id) {
            return Err(Error::persistence(
                "no document to update",
                Some(id.to_string()),
            ));
        }
        documents.insert(id.to_string(), Conversation::new(id, messages.to_vec()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, id: &str, messages: &[Message]) -> Result<()> {
        self.write(
            StoreCall::Create(id.to_string(), messages.len()),
            id,
            messages,
            true,
        )
    }

    async fn update_conversation(&self, id: &str, messages: &[Message]) -> Result<()> {
        self.write(
            StoreCall::Update(id.to_string(), messages.len()),
            id,
            messages,
            false,
        )
    }
}

/// A store that keeps each conversation as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`.  The directory is created on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory documents are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `id`.
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(&['/', '\\'][..]) || id.starts_with('.') {
            return Err(Error::validation(
                format!("{id:?} is not a valid conversation identifier"),
                Some("id".to_string()),
            ));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Load the stored document for `id`.
    pub async fn read_conversation(&self, id: &str) -> Result<Conversation> {
        let path = self.path_for(id)?;
        let content = tokio::fs::read(&path).await.map_err(|err| {
            Error::io(format!("failed to read {}", path.display()), err)
        })?;
        Ok(serde_json::from_slice(&content)?)
    }

    async fn write(&self, id: &str, messages: &[Message]) -> Result<()> {
        let path = self.path_for(id)?;
        let document = Conversation::new(id, messages.to_vec());
        let content = serde_json::to_vec_pretty(&document)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            Error::persistence(
                format!("failed to create {}: {err}", self.dir.display()),
                Some(id.to_string()),
            )
        })?;
        // Write beside the target and rename so readers never see half a document.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, content).await.map_err(|err| {
            Error::persistence(
                format!("failed to write {}: {err}", staging.display()),
                Some(id.to_string()),
            )
        })?;
        tokio::fs::rename(&staging, &path).await.map_err(|err| {
            Error::persistence(
                format!("failed to replace {}: {err}", path.display()),
                Some(id.to_string()),
            )
        })
    }
}

#[async_trait::async_trait]
impl ConversationStore for FileStore {
    async fn create_conversation(&self, id: &str, messages: &[Message]) -> Result<()> {
        let result = self.write(id, messages).await;
        record(&result);
        result
    }

    async fn update_conversation(&self, id: &str, messages: &[Message]) -> Result<()> {
        let result = match self.path_for(id) {
            Ok(path) => match tokio::fs::try_exists(&path).await {
                Ok(true) => self.write(id, messages).await,
                Ok(false) => Err(Error::persistence(
                    "no document to update",
                    Some(id.to_string()),
                )),
                Err(err) => Err(Error::persistence(
                    format!("failed to stat {}: {err}", path.display()),
                    Some(id.to_string()),
                )),
            },
            Err(err) => Err(err),
        };
        record(&result);
        result
    }
}

fn record(result: &Result<()>) {
    match result {
        Ok(()) => STORE_WRITES.click(),
        Err(_) => STORE_ERRORS.click(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<Message> {
        vec![Message::bot("yo"), Message::user("sup")]
    }

    #[test]
    fn conversation_ids_are_time_based() {
        let id = new_conversation_id();
        let millis = id.strip_prefix("conversation-").unwrap();
        assert!(millis.parse::<i128>().unwrap() > 1_600_000_000_000);
    }

    #[tokio::test]
    async fn memory_store_records_calls() {
        let store = MemoryStore::new();
        store.create_conversation("c1", &messages()).await.unwrap();
        store.update_conversation("c1", &messages()[..1]).await.unwrap();
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Create("c1".to_string(), 2),
                StoreCall::Update("c1".to_string(), 1)
            ]
        );
        assert_eq!(store.conversation("c1").unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn memory_store_update_requires_document() {
        let store = MemoryStore::new();
        let err = store.update_conversation("c1", &messages()).await.unwrap_err();
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn failing_memory_store() {
        let store = MemoryStore::failing();
        assert!(store.create_conversation("c1", &[]).await.is_err());
        assert_eq!(store.calls().len(), 1);
        assert!(store.conversation("c1").is_none());
    }

    #[tokio::test]
    async fn file_store_create_then_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("conversations"));

        store.create_conversation("c1", &messages()[..1]).await.unwrap();
        let first = store.read_conversation("c1").await.unwrap();
        assert_eq!(first.id, "c1");
        assert_eq!(first.messages, vec![Message::bot("yo")]);

        store.update_conversation("c1", &messages()).await.unwrap();
        let second = store.read_conversation("c1").await.unwrap();
        assert_eq!(second.messages, messages());
        assert!(second.updated_at >= first.updated_at);
        assert!(!store.dir().join("c1.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_update_of_missing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let err = store.update_conversation("c1", &messages()).await.unwrap_err();
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn file_store_counts_rejected_update_ids() {
        use biometrics::Sensor;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let before = STORE_ERRORS.read();
        let err = store
            .update_conversation("../escape", &messages())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(STORE_ERRORS.read() > before);
    }

    #[test]
    fn file_store_rejects_path_like_ids() {
        let store = FileStore::new("/tmp/banter");
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("").is_err());
        assert_eq!(
            store.path_for("conversation-1").unwrap(),
            PathBuf::from("/tmp/banter/conversation-1.json")
        );
    }
}
