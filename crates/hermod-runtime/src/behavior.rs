//! Pluggable per-node behavior (spec §4.4 "Message flow at a node").
//!
//! `Source`/`Sink` capability contracts live in `hermod_types::capability`
//! since they are shared with the outbox publisher; `Transformer` and
//! `Condition` are runtime-only concerns and have no spec-level external
//! consumer, so they're defined here instead. Grounded on
//! `hermod_types::capability`'s own async-trait-with-default shape.

use async_trait::async_trait;
use hermod_types::{ErrorKind, Message};

/// Applied by `transformer` nodes. May mutate, drop (return an empty
/// vec), or fan out (return multiple messages) per spec §4.4.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn apply(&self, msg: Message) -> Result<Vec<Message>, ErrorKind>;
}

/// Applied by `condition` nodes: evaluates a predicate and returns the
/// ids of the outgoing edges the message should be routed down. An
/// empty result drops the message (no edge matched).
#[async_trait]
pub trait Condition: Send + Sync {
    async fn routes(&self, msg: &Message) -> Result<Vec<String>, ErrorKind>;
}

/// A `Transformer` that passes every message through unchanged, used
/// when a node declares no behavior (identity default).
pub struct Identity;

#[async_trait]
impl Transformer for Identity {
    async fn apply(&self, msg: Message) -> Result<Vec<Message>, ErrorKind> {
        Ok(vec![msg])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_passes_message_through() {
        let msg = Message {
            table: "orders".into(),
            ..Default::default()
        };
        let out = Identity.apply(msg.clone()).await.unwrap();
        assert_eq!(out, vec![msg]);
    }
}
