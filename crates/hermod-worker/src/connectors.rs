//! Connector resolution seam (spec §6: Source/Sink capability
//! contracts are "consumed" by this core, not implemented by it).
//!
//! Concrete connectors (CDC, webhook, GraphQL, relational, vector
//! store, ...) are out of scope for this repo. `UnimplementedResolver`
//! satisfies both `hermod_registry::ConnectorResolver` and
//! `hermod_outbox::SinkResolver` so the process wiring below compiles
//! and runs end-to-end against workflows with no connector nodes (dry
//! runs, schema-only testing); a deployment wires in a real resolver
//! backed by its connector registry in place of this one.

use async_trait::async_trait;
use hermod_outbox::SinkHandle;
use hermod_registry::{ConnectorResolver, RegistryError};
use hermod_runtime::NodeBindings;
use hermod_types::Workflow;
use uuid::Uuid;

pub struct UnimplementedResolver;

#[async_trait]
impl ConnectorResolver for UnimplementedResolver {
    async fn resolve(&self, workflow: &Workflow) -> Result<NodeBindings, RegistryError> {
        let has_connectors = workflow
            .nodes
            .iter()
            .any(|n| n.ref_id.is_some());
        if has_connectors {
            tracing::warn!(
                workflow_id = %workflow.id,
                "no connector resolver configured; starting with no source/sink bindings"
            );
        }
        Ok(NodeBindings::default())
    }
}

#[async_trait]
impl hermod_outbox::SinkResolver for UnimplementedResolver {
    async fn resolve(&self, _sink_id: Uuid) -> Option<SinkHandle> {
        None
    }
}
