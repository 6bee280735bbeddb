//! In-memory `MetadataStore` for tests (spec §4.1 Non-goals don't cover
//! test doubles; ambient test tooling per SPEC_FULL §A.4).
//!
//! Grounded on `durable::persistence::memory::InMemoryWorkflowEventStore`:
//! `parking_lot::RwLock<HashMap<...>>` per entity, same semantics as the
//! real backend including lease conditional-update and outbox claim
//! atomicity (the lock guards the whole critical section, which is
//! sufficient in a single process).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use hermod_types::{
    Approval, ApprovalStatus, AuditLogEntry, Connector, FailureClass, ListFilter, NodeState,
    OutboxItem, OutboxStatus, Page, Schema, TraceStep, Worker, Workflow, WorkflowVersionSnapshot,
};

use crate::error::StoreError;
use crate::traits::MetadataStore;

#[derive(Default)]
pub struct InMemoryMetadataStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    connectors: RwLock<HashMap<Uuid, Connector>>,
    schemas: RwLock<HashMap<String, Vec<Schema>>>,
    outbox: RwLock<HashMap<Uuid, OutboxItem>>,
    node_state: RwLock<HashMap<(Uuid, String), NodeState>>,
    traces: RwLock<Vec<TraceStep>>,
    audit: RwLock<Vec<AuditLogEntry>>,
    approvals: RwLock<HashMap<Uuid, Approval>>,
    versions: RwLock<Vec<WorkflowVersionSnapshot>>,
    workers: RwLock<HashMap<String, Worker>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn paginate<T: Clone>(items: Vec<T>, filter: &ListFilter) -> Page<T> {
        let total = items.len() as u64;
        let offset = filter.offset() as usize;
        let limit = if filter.limit == 0 {
            items.len()
        } else {
            filter.limit as usize
        };
        let page_items = items.into_iter().skip(offset).take(limit).collect();
        Page {
            items: page_items,
            total,
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn list_workflows(&self, filter: ListFilter) -> Result<Page<Workflow>, StoreError> {
        let all: Vec<Workflow> = self
            .workflows
            .read()
            .values()
            .filter(|w| {
                filter
                    .search
                    .as_ref()
                    .map(|s| w.name.contains(s.as_str()) || w.id.to_string().contains(s.as_str()))
                    .unwrap_or(true)
                    && filter
                        .vhost
                        .as_ref()
                        .map(|v| &w.vhost == v)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        Ok(Self::paginate(all, &filter))
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn create_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        self.workflows.write().insert(workflow.id, workflow);
        Ok(())
    }

    async fn update_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        let mut guard = self.workflows.write();
        if !guard.contains_key(&workflow.id) {
            return Err(StoreError::NotFound(workflow.id));
        }
        guard.insert(workflow.id, workflow);
        Ok(())
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), StoreError> {
        self.workflows
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_connectors(&self, filter: ListFilter) -> Result<Page<Connector>, StoreError> {
        let all: Vec<Connector> = self.connectors.read().values().cloned().collect();
        Ok(Self::paginate(all, &filter))
    }

    async fn get_connector(&self, id: Uuid) -> Result<Connector, StoreError> {
        self.connectors
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn create_connector(&self, connector: Connector) -> Result<(), StoreError> {
        self.connectors.write().insert(connector.id, connector);
        Ok(())
    }

    async fn update_connector(&self, connector: Connector) -> Result<(), StoreError> {
        let mut guard = self.connectors.write();
        if !guard.contains_key(&connector.id) {
            return Err(StoreError::NotFound(connector.id));
        }
        guard.insert(connector.id, connector);
        Ok(())
    }

    async fn delete_connector(&self, id: Uuid) -> Result<(), StoreError> {
        self.connectors
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_schema_versions(&self, name: &str) -> Result<Vec<Schema>, StoreError> {
        Ok(self.schemas.read().get(name).cloned().unwrap_or_default())
    }

    async fn get_schema_version(&self, name: &str, version: u32) -> Result<Schema, StoreError> {
        self.schemas
            .read()
            .get(name)
            .and_then(|versions| versions.iter().find(|s| s.version == version).cloned())
            .ok_or_else(|| StoreError::NotFound(Uuid::nil()))
    }

    async fn get_latest_schema(&self, name: &str) -> Result<Option<Schema>, StoreError> {
        Ok(self
            .schemas
            .read()
            .get(name)
            .and_then(|versions| versions.iter().max_by_key(|s| s.version).cloned()))
    }

    async fn create_schema_version(&self, schema: Schema) -> Result<(), StoreError> {
        self.schemas
            .write()
            .entry(schema.name.clone())
            .or_default()
            .push(schema);
        Ok(())
    }

    async fn create_outbox_item(&self, item: OutboxItem) -> Result<(), StoreError> {
        self.outbox.write().insert(item.id, item);
        Ok(())
    }

    async fn get_outbox_item(&self, id: Uuid) -> Result<OutboxItem, StoreError> {
        self.outbox.read().get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn claim_outbox_items(
        &self,
        claimed_by: &str,
        max_items: u32,
    ) -> Result<Vec<OutboxItem>, StoreError> {
        let now = Utc::now();
        let mut guard = self.outbox.write();
        let mut claimed = Vec::new();
        let mut ids: Vec<Uuid> = guard
            .values()
            .filter(|i| i.status == OutboxStatus::Pending && i.available_at <= now)
            .map(|i| i.id)
            .collect();
        ids.sort();
        ids.truncate(max_items as usize);

        for id in ids {
            if let Some(item) = guard.get_mut(&id) {
                item.status = OutboxStatus::InFlight;
                item.claimed_by = Some(claimed_by.to_string());
                item.claimed_at = Some(now);
                item.updated_at = now;
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_outbox_item(&self, id: Uuid) -> Result<(), StoreError> {
        self.outbox
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn fail_outbox_item(
        &self,
        id: Uuid,
        error: &str,
        failure_class: FailureClass,
        next_available_at: chrono::DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.outbox.write();
        let item = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        item.attempts += 1;
        item.last_error = Some(error.to_string());
        item.last_failure_class = Some(failure_class);
        item.claimed_by = None;
        item.claimed_at = None;
        item.updated_at = Utc::now();
        item.status = if item.exhausted() {
            OutboxStatus::Dead
        } else {
            item.available_at = next_available_at;
            OutboxStatus::Pending
        };
        Ok(())
    }

    async fn reclaim_stale_outbox_items(
        &self,
        claim_ttl: chrono::Duration,
    ) -> Result<Vec<Uuid>, StoreError> {
        let now = Utc::now();
        let mut guard = self.outbox.write();
        let mut reclaimed = Vec::new();
        for item in guard.values_mut() {
            if item.is_stale_claim_at(now, claim_ttl) {
                item.status = OutboxStatus::Pending;
                item.claimed_by = None;
                item.claimed_at = None;
                item.updated_at = now;
                reclaimed.push(item.id);
            }
        }
        Ok(reclaimed)
    }

    async fn requeue_dead_outbox_item(&self, id: Uuid) -> Result<(), StoreError> {
        let mut guard = self.outbox.write();
        let item = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if item.status != OutboxStatus::Dead {
            return Ok(());
        }
        item.status = OutboxStatus::Pending;
        item.attempts = 0;
        item.available_at = Utc::now();
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_outbox_item_dead(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut guard = self.outbox.write();
        let item = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        item.status = OutboxStatus::Dead;
        item.last_error = Some(error.to_string());
        item.claimed_by = None;
        item.claimed_at = None;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn list_outbox_items(&self, filter: ListFilter) -> Result<Page<OutboxItem>, StoreError> {
        let all: Vec<OutboxItem> = self.outbox.read().values().cloned().collect();
        Ok(Self::paginate(all, &filter))
    }

    async fn get_node_state(
        &self,
        workflow_id: Uuid,
        node_id: &str,
    ) -> Result<Option<NodeState>, StoreError> {
        Ok(self
            .node_state
            .read()
            .get(&(workflow_id, node_id.to_string()))
            .cloned())
    }

    async fn put_node_state(&self, state: NodeState) -> Result<(), StoreError> {
        self.node_state
            .write()
            .insert((state.workflow_id, state.node_id.clone()), state);
        Ok(())
    }

    async fn record_trace_step(&self, step: TraceStep) -> Result<(), StoreError> {
        self.traces.write().push(step);
        Ok(())
    }

    async fn list_trace_steps(
        &self,
        workflow_id: Uuid,
        filter: ListFilter,
    ) -> Result<Page<TraceStep>, StoreError> {
        let all: Vec<TraceStep> = self
            .traces
            .read()
            .iter()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect();
        Ok(Self::paginate(all, &filter))
    }

    async fn record_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        self.audit.write().push(entry);
        Ok(())
    }

    async fn list_audit_log(&self, filter: ListFilter) -> Result<Page<AuditLogEntry>, StoreError> {
        let all: Vec<AuditLogEntry> = self.audit.read().clone();
        Ok(Self::paginate(all, &filter))
    }

    async fn create_approval(&self, approval: Approval) -> Result<(), StoreError> {
        self.approvals.write().insert(approval.id, approval);
        Ok(())
    }

    async fn resolve_approval(
        &self,
        id: Uuid,
        status: ApprovalStatus,
        resolved_by: &str,
    ) -> Result<Approval, StoreError> {
        let mut guard = self.approvals.write();
        let approval = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        approval.status = status;
        approval.resolved_at = Some(Utc::now());
        approval.resolved_by = Some(resolved_by.to_string());
        Ok(approval.clone())
    }

    async fn list_pending_approvals(&self, workflow_id: Uuid) -> Result<Vec<Approval>, StoreError> {
        Ok(self
            .approvals
            .read()
            .values()
            .filter(|a| a.workflow_id == workflow_id && a.is_pending())
            .cloned()
            .collect())
    }

    async fn record_workflow_version(
        &self,
        snapshot: WorkflowVersionSnapshot,
    ) -> Result<(), StoreError> {
        self.versions.write().push(snapshot);
        Ok(())
    }

    async fn acquire_lease(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut guard = self.workflows.write();
        let workflow = guard.get_mut(&workflow_id).ok_or(StoreError::NotFound(workflow_id))?;
        let eligible = workflow.owner_id.is_none()
            || workflow.lease_until.map(|until| until < now).unwrap_or(true)
            || workflow.owner_id.as_deref() == Some(owner_id);
        if eligible {
            workflow.owner_id = Some(owner_id.to_string());
            workflow.lease_until = Some(now + ttl);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn renew_lease(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut guard = self.workflows.write();
        let workflow = guard.get_mut(&workflow_id).ok_or(StoreError::NotFound(workflow_id))?;
        let held = workflow.owner_id.as_deref() == Some(owner_id)
            && workflow.lease_until.map(|until| until >= now).unwrap_or(false);
        if held {
            workflow.lease_until = Some(now + ttl);
        }
        Ok(held)
    }

    async fn release_lease(&self, workflow_id: Uuid, owner_id: &str) -> Result<(), StoreError> {
        let mut guard = self.workflows.write();
        let workflow = guard.get_mut(&workflow_id).ok_or(StoreError::NotFound(workflow_id))?;
        if workflow.owner_id.as_deref() == Some(owner_id) {
            workflow.owner_id = None;
            workflow.lease_until = None;
        }
        Ok(())
    }

    async fn register_worker(&self, worker: Worker) -> Result<(), StoreError> {
        self.workers.write().insert(worker.id.clone(), worker);
        Ok(())
    }

    async fn worker_heartbeat(
        &self,
        worker_id: &str,
        cpu_usage: f64,
        mem_usage: f64,
    ) -> Result<(), StoreError> {
        if let Some(worker) = self.workers.write().get_mut(worker_id) {
            worker.last_seen = Utc::now();
            worker.cpu_usage = cpu_usage;
            worker.mem_usage = mem_usage;
        }
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        Ok(self.workers.read().values().cloned().collect())
    }

    async fn deregister_worker(&self, worker_id: &str) -> Result<(), StoreError> {
        self.workers.write().remove(worker_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_types::{DlqPolicy, ResourceRequest, WorkflowStatus};

    fn workflow(id: Uuid) -> Workflow {
        Workflow {
            id,
            name: "wf".into(),
            vhost: "/".into(),
            workspace_id: None,
            active: true,
            status: WorkflowStatus::Stopped,
            nodes: vec![],
            edges: vec![],
            max_retries: 3,
            retry_interval: std::time::Duration::from_secs(1),
            reconnect_interval: std::time::Duration::from_secs(5),
            dlq: DlqPolicy {
                dlq_sink_id: None,
                dlq_threshold: 3,
                prioritize_dlq: false,
            },
            dry_run: false,
            schema_type: None,
            schema: None,
            cron: None,
            idle_timeout: std::time::Duration::from_secs(60),
            tier: "standard".into(),
            trace_sample_rate: 1.0,
            resources: ResourceRequest {
                cpu_millis: 100,
                memory_mb: 128,
                throughput_per_sec: 100,
            },
            owner_id: None,
            lease_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lease_acquire_renew_release_roundtrip() {
        let store = InMemoryMetadataStore::new();
        let id = Uuid::new_v4();
        store.create_workflow(workflow(id)).await.unwrap();

        assert!(store
            .acquire_lease(id, "worker-a", chrono::Duration::seconds(30))
            .await
            .unwrap());

        // A second owner must not be able to steal a live lease.
        assert!(!store
            .acquire_lease(id, "worker-b", chrono::Duration::seconds(30))
            .await
            .unwrap());

        assert!(store
            .renew_lease(id, "worker-a", chrono::Duration::seconds(30))
            .await
            .unwrap());

        store.release_lease(id, "worker-a").await.unwrap();
        let w = store.get_workflow(id).await.unwrap();
        assert!(w.owner_id.is_none());
    }

    #[tokio::test]
    async fn expired_lease_is_stealable() {
        let store = InMemoryMetadataStore::new();
        let id = Uuid::new_v4();
        let mut wf = workflow(id);
        wf.owner_id = Some("stale-owner".into());
        wf.lease_until = Some(Utc::now() - chrono::Duration::seconds(5));
        store.create_workflow(wf).await.unwrap();

        assert!(store
            .acquire_lease(id, "worker-b", chrono::Duration::seconds(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn get_not_found_returns_sentinel() {
        let store = InMemoryMetadataStore::new();
        let err = store.get_workflow(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
