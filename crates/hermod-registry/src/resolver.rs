//! Connector/behavior resolution hook (spec §4.7 `start(id)`: "resolve
//! referenced Sources/Sinks/Schemas, construct the Instance").
//!
//! Concrete Source/Sink connectors (CDC, webhook, GraphQL, relational,
//! vector store, ...) are out of scope for this core (spec §6); the
//! Registry only knows how to ask something else for bindings given a
//! workflow's declared nodes. `ConnectorResolver` is that seam.

use async_trait::async_trait;
use hermod_runtime::NodeBindings;
use hermod_types::Workflow;

use crate::error::RegistryError;

#[async_trait]
pub trait ConnectorResolver: Send + Sync {
    /// Build the `NodeBindings` (source/sink/transformer/condition
    /// implementations) a workflow's nodes reference, by `ref_id` or
    /// node id, before the Registry starts its Instance.
    async fn resolve(&self, workflow: &Workflow) -> Result<NodeBindings, RegistryError>;
}
