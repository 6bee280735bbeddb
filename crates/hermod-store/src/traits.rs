//! The single metadata store capability contract (spec §4.1, §6
//! "Metadata store capability (implemented)").
//!
//! Grounded on `durable::persistence::store::WorkflowEventStore`: one
//! big `Send + Sync + 'static` async trait with default no-op bodies
//! for the operations individual backends may skip (worker registry,
//! circuit breaker bookkeeping), matching that trait's shape for the
//! same reason — every component consumes this one contract rather
//! than a trait per entity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hermod_types::{
    Approval, Connector, ListFilter, NodeState, OutboxItem, Page, Schema, TraceStep, Worker,
    Workflow,
};

use crate::error::StoreError;

#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    // ---- Workflow -------------------------------------------------
    async fn list_workflows(&self, filter: ListFilter) -> Result<Page<Workflow>, StoreError>;
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError>;
    async fn create_workflow(&self, workflow: Workflow) -> Result<(), StoreError>;
    async fn update_workflow(&self, workflow: Workflow) -> Result<(), StoreError>;
    async fn delete_workflow(&self, id: Uuid) -> Result<(), StoreError>;

    // ---- Connector (Source/Sink) -----------------------------------
    async fn list_connectors(&self, filter: ListFilter) -> Result<Page<Connector>, StoreError>;
    async fn get_connector(&self, id: Uuid) -> Result<Connector, StoreError>;
    async fn create_connector(&self, connector: Connector) -> Result<(), StoreError>;
    async fn update_connector(&self, connector: Connector) -> Result<(), StoreError>;
    async fn delete_connector(&self, id: Uuid) -> Result<(), StoreError>;

    // ---- Schema -----------------------------------------------------
    async fn list_schema_versions(&self, name: &str) -> Result<Vec<Schema>, StoreError>;
    async fn get_schema_version(&self, name: &str, version: u32) -> Result<Schema, StoreError>;
    async fn get_latest_schema(&self, name: &str) -> Result<Option<Schema>, StoreError>;
    async fn create_schema_version(&self, schema: Schema) -> Result<(), StoreError>;

    // ---- Outbox item --------------------------------------------------
    async fn create_outbox_item(&self, item: OutboxItem) -> Result<(), StoreError>;
    async fn get_outbox_item(&self, id: Uuid) -> Result<OutboxItem, StoreError>;
    /// Atomically claims up to `max_items` pending/due items for
    /// `claimed_by`, moving them to `in_flight` (spec §4.6, `durable`'s
    /// `claim_task` SKIP LOCKED idiom).
    async fn claim_outbox_items(
        &self,
        claimed_by: &str,
        max_items: u32,
    ) -> Result<Vec<OutboxItem>, StoreError>;
    async fn complete_outbox_item(&self, id: Uuid) -> Result<(), StoreError>;
    async fn fail_outbox_item(
        &self,
        id: Uuid,
        error: &str,
        failure_class: hermod_types::FailureClass,
        next_available_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Reclaims items stuck `in_flight` past `claim_ttl` back to
    /// `pending` (spec §9 "stuck in_flight items", `durable`'s
    /// `reclaim_stale_tasks`).
    async fn reclaim_stale_outbox_items(
        &self,
        claim_ttl: chrono::Duration,
    ) -> Result<Vec<Uuid>, StoreError>;
    /// Moves a `dead` item back to `pending` with a reset attempt
    /// counter (spec §B supplemented feature, `durable`'s
    /// `requeue_from_dlq`).
    async fn requeue_dead_outbox_item(&self, id: Uuid) -> Result<(), StoreError>;
    /// Forces an item straight to `dead` regardless of remaining
    /// attempts (spec §4.5 "permanent ... DLQ immediately regardless of
    /// attempts").
    async fn mark_outbox_item_dead(&self, id: Uuid, error: &str) -> Result<(), StoreError>;
    async fn list_outbox_items(&self, filter: ListFilter) -> Result<Page<OutboxItem>, StoreError>;

    // ---- Node state -------------------------------------------------
    async fn get_node_state(
        &self,
        workflow_id: Uuid,
        node_id: &str,
    ) -> Result<Option<NodeState>, StoreError>;
    async fn put_node_state(&self, state: NodeState) -> Result<(), StoreError>;

    // ---- Trace ------------------------------------------------------
    async fn record_trace_step(&self, step: TraceStep) -> Result<(), StoreError>;
    async fn list_trace_steps(
        &self,
        workflow_id: Uuid,
        filter: ListFilter,
    ) -> Result<Page<TraceStep>, StoreError>;

    // ---- Audit --------------------------------------------------------
    async fn record_audit_log(
        &self,
        entry: hermod_types::AuditLogEntry,
    ) -> Result<(), StoreError>;
    async fn list_audit_log(
        &self,
        filter: ListFilter,
    ) -> Result<Page<hermod_types::AuditLogEntry>, StoreError>;

    // ---- Approval -----------------------------------------------------
    async fn create_approval(&self, approval: Approval) -> Result<(), StoreError>;
    async fn resolve_approval(
        &self,
        id: Uuid,
        status: hermod_types::ApprovalStatus,
        resolved_by: &str,
    ) -> Result<Approval, StoreError>;
    async fn list_pending_approvals(&self, workflow_id: Uuid) -> Result<Vec<Approval>, StoreError>;

    // ---- Workflow version snapshot -------------------------------------
    async fn record_workflow_version(
        &self,
        snapshot: hermod_types::WorkflowVersionSnapshot,
    ) -> Result<(), StoreError>;

    // ---- Lease primitives (spec §4.1 "Atomic lease primitives") --------
    async fn acquire_lease(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, StoreError>;
    async fn renew_lease(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, StoreError>;
    async fn release_lease(&self, workflow_id: Uuid, owner_id: &str) -> Result<(), StoreError>;

    // ---- Worker registry (spec §B supplemented feature) -----------------
    async fn register_worker(&self, worker: Worker) -> Result<(), StoreError> {
        let _ = worker;
        Ok(())
    }

    async fn worker_heartbeat(
        &self,
        _worker_id: &str,
        _cpu_usage: f64,
        _mem_usage: f64,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        Ok(vec![])
    }

    async fn deregister_worker(&self, _worker_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
