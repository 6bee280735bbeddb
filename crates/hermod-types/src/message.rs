//! In-flight records and the message object pool (spec §3 "Message",
//! §9 "Global mutable state", §8 property 11 "Pool discipline").
//!
//! The source spec's pool is a manual `acquire()`/`release()` pair with a
//! lifecycle rule enforced only by convention ("no consumer may retain a
//! reference past its handler"). In Rust that rule is better expressed as
//! ownership: [`MessagePool::acquire`] returns a [`PooledMessage`] guard
//! that returns its buffer to the pool on `Drop`, so a consumer cannot
//! outlive the handler without the borrow checker noticing.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Snapshot,
    Update,
    Delete,
}

/// An in-flight record moving through a workflow instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub operation: Option<Operation>,
    pub schema: String,
    pub table: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub payload: Vec<u8>,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub metadata: HashMap<String, String>,
}

impl Message {
    /// Read a value out of `data` by dot path (e.g. `"after.user.id"`),
    /// short-circuiting to `None` on any missing segment (spec §9
    /// "Dynamic typing").
    pub fn get_path(&self, path: &str) -> Option<&serde_json::Value> {
        let mut current = self.data.get(path.split('.').next()?)?;
        let mut segments = path.split('.');
        segments.next();
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current)
    }

    fn reset(&mut self) {
        self.id = Uuid::nil();
        self.operation = None;
        self.schema.clear();
        self.table.clear();
        self.before = None;
        self.after = None;
        self.payload.clear();
        self.data.clear();
        self.metadata.clear();
    }
}

/// Process-singleton pool of reusable [`Message`] buffers (spec §9:
/// "model them as explicit containers with init/teardown and injected
/// dependencies rather than free globals").
pub struct MessagePool {
    free: Mutex<Vec<Box<Message>>>,
}

impl MessagePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
        })
    }

    /// Borrow a zeroed `Message` from the pool, allocating a new one if
    /// none are free.
    pub fn acquire(self: &Arc<Self>) -> PooledMessage {
        let inner = self.free.lock().pop().unwrap_or_default();
        PooledMessage {
            inner: Some(inner),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut msg: Box<Message>) {
        msg.reset();
        self.free.lock().push(msg);
    }

    /// Number of buffers currently checked back in. Exposed for tests.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            operation: None,
            schema: String::new(),
            table: String::new(),
            before: None,
            after: None,
            payload: Vec::new(),
            data: serde_json::Map::new(),
            metadata: HashMap::new(),
        }
    }
}

/// RAII guard returned by [`MessagePool::acquire`]. Returns its buffer to
/// the pool when dropped.
pub struct PooledMessage {
    inner: Option<Box<Message>>,
    pool: Arc<MessagePool>,
}

impl Deref for PooledMessage {
    type Target = Message;
    fn deref(&self) -> &Message {
        self.inner.as_ref().expect("message taken before drop")
    }
}

impl DerefMut for PooledMessage {
    fn deref_mut(&mut self) -> &mut Message {
        self.inner.as_mut().expect("message taken before drop")
    }
}

impl Drop for PooledMessage {
    fn drop(&mut self) {
        if let Some(msg) = self.inner.take() {
            self.pool.release(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_message_starts_empty() {
        let pool = MessagePool::new();
        let msg = pool.acquire();
        assert_eq!(msg.id, Uuid::nil());
        assert!(msg.data.is_empty());
    }

    #[test]
    fn released_buffer_is_reused_and_cleared() {
        let pool = MessagePool::new();
        {
            let mut msg = pool.acquire();
            msg.id = Uuid::new_v4();
            msg.data.insert("x".into(), serde_json::json!(1));
            msg.table = "orders".into();
        } // dropped -> released back to pool

        assert_eq!(pool.len(), 1);

        let msg2 = pool.acquire();
        assert_eq!(pool.len(), 0);
        assert_eq!(msg2.id, Uuid::nil());
        assert!(msg2.data.is_empty());
        assert!(msg2.table.is_empty());
    }

    #[test]
    fn get_path_short_circuits_on_missing_segment() {
        let mut msg = Message::default();
        msg.data.insert(
            "after".into(),
            serde_json::json!({"user": {"id": 42}}),
        );
        assert_eq!(msg.get_path("after.user.id"), Some(&serde_json::json!(42)));
        assert_eq!(msg.get_path("after.user.missing"), None);
        assert_eq!(msg.get_path("nonexistent.path"), None);
    }
}
