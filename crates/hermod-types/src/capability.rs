//! Source and sink capability contracts (spec §6 "External interfaces").
//!
//! These are the boundary traits the runtime drives; concrete connector
//! crates (CDC, webhook, GraphQL, relational, vector store, ...) are
//! out of scope here and implement against this interface.

use async_trait::async_trait;

use crate::error::ErrorKind;
use crate::message::Message;

/// Consumed by the runtime to pull records out of a source connector.
#[async_trait]
pub trait SourceCapability: Send + Sync {
    /// Returns the next available message, or `None` if the source is
    /// caught up for now (not an error).
    async fn read(&mut self) -> Result<Option<Message>, ErrorKind>;

    /// Acknowledge successful downstream delivery of `msg`, allowing the
    /// source to advance its checkpoint.
    async fn ack(&mut self, msg: &Message) -> Result<(), ErrorKind>;

    async fn ping(&self) -> Result<(), ErrorKind>;

    async fn close(&mut self) -> Result<(), ErrorKind>;

    /// Optional: emit a full-table snapshot for the given tables before
    /// switching to incremental reads.
    async fn snapshot(&mut self, _tables: &[String]) -> Result<(), ErrorKind> {
        Err(ErrorKind::InvalidTopology)
    }

    async fn discover_tables(&self) -> Result<Vec<String>, ErrorKind> {
        Err(ErrorKind::InvalidTopology)
    }

    async fn discover_columns(&self, _table: &str) -> Result<Vec<String>, ErrorKind> {
        Err(ErrorKind::InvalidTopology)
    }

    async fn sample(&self, _table: &str) -> Result<Message, ErrorKind> {
        Err(ErrorKind::InvalidTopology)
    }
}

/// Consumed by the runtime (directly, or via the outbox publisher) to
/// deliver records to a sink connector.
#[async_trait]
pub trait SinkCapability: Send + Sync {
    async fn write(&mut self, msg: &Message) -> Result<(), ErrorKind>;

    async fn ping(&self) -> Result<(), ErrorKind>;

    async fn close(&mut self) -> Result<(), ErrorKind>;

    /// Optional batched write; the default falls back to one `write`
    /// per message so every sink satisfies the trait without it.
    async fn write_batch(&mut self, msgs: &[Message]) -> Result<(), ErrorKind> {
        for msg in msgs {
            self.write(msg).await?;
        }
        Ok(())
    }

    /// Optional 2PC hooks for sinks that can participate in a
    /// transaction spanning multiple writes.
    async fn begin(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }

    async fn discover_tables(&self) -> Result<Vec<String>, ErrorKind> {
        Err(ErrorKind::InvalidTopology)
    }

    async fn discover_columns(&self, _table: &str) -> Result<Vec<String>, ErrorKind> {
        Err(ErrorKind::InvalidTopology)
    }
}
