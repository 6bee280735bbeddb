//! Per-worker supervisor (spec §4.7, capability C8).
//!
//! Grounded on `durable::worker::pool::WorkerPool`'s own shape: a
//! `DashMap` of live work (there: in-flight tasks under a semaphore;
//! here: running `Instance`s keyed by workflow id), a background loop
//! driven by `tokio::select!` against both an event channel and an
//! interval tick, and the same shutdown-then-reconcile posture. The
//! `start`/`stop`/`reload`/`Reconcile()` operations themselves have no
//! teacher analog and are built directly from spec §4.7's prose.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hermod_lease::LeaseEvent;
use hermod_runtime::{Instance, InstanceConfig};
use hermod_schema::SchemaRegistry;
use hermod_store::MetadataStore;
use hermod_types::{MessagePool, WorkflowVersionSnapshot};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::resolver::ConnectorResolver;

pub struct RegistryConfig {
    pub instance: InstanceConfig,
    /// How often `reconcile()` runs to repair drift between the live
    /// instance map and the leases this worker currently holds.
    pub reconcile_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            instance: InstanceConfig::default(),
            reconcile_interval: Duration::from_secs(10),
        }
    }
}

pub struct Registry {
    worker_id: String,
    store: Arc<dyn MetadataStore>,
    schema_registry: Arc<SchemaRegistry>,
    resolver: Arc<dyn ConnectorResolver>,
    pool: Arc<MessagePool>,
    config: RegistryConfig,
    instances: DashMap<Uuid, Arc<Instance>>,
}

impl Registry {
    pub fn new(
        worker_id: impl Into<String>,
        store: Arc<dyn MetadataStore>,
        schema_registry: Arc<SchemaRegistry>,
        resolver: Arc<dyn ConnectorResolver>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            schema_registry,
            resolver,
            pool: MessagePool::new(),
            config,
            instances: DashMap::new(),
        }
    }

    /// spec §4.7 `start(id)`: fetch the workflow, resolve its
    /// connectors, construct and launch the Instance. On restart of an
    /// instance holding pending approvals, re-emits their resume signal
    /// (Open Question c).
    #[instrument(skip(self))]
    pub async fn start(&self, id: Uuid) -> Result<(), RegistryError> {
        if self.instances.contains_key(&id) {
            debug!(workflow_id = %id, "start requested but instance already running");
            return Ok(());
        }

        let workflow = self.store.get_workflow(id).await?;
        let bindings = self
            .resolver
            .resolve(&workflow)
            .await
            .map_err(|e| RegistryError::ResolutionFailed(id, e.to_string()))?;

        let instance = Arc::new(Instance::new(
            workflow,
            self.worker_id.clone(),
            self.store.clone(),
            self.schema_registry.clone(),
            bindings,
            self.pool.clone(),
            self.config.instance.clone(),
        ));

        instance.start().await?;
        instance.reemit_pending_approvals().await?;
        self.instances.insert(id, instance);
        info!(workflow_id = %id, "workflow instance started");
        Ok(())
    }

    /// spec §4.7 `stop(id)`: cancel the instance (two-phase, grace then
    /// hard-cancel, handled inside `Instance::stop`), drop it from the
    /// live map.
    #[instrument(skip(self))]
    pub async fn stop(&self, id: Uuid) -> Result<(), RegistryError> {
        let Some((_, instance)) = self.instances.remove(&id) else {
            debug!(workflow_id = %id, "stop requested but no instance running");
            return Ok(());
        };
        instance.stop().await?;
        info!(workflow_id = %id, "workflow instance stopped");
        Ok(())
    }

    /// spec §4.7 `reload(id)`: atomic stop+start against the workflow's
    /// current stored definition, recording an immutable version
    /// snapshot first (Open Question b: write-only history, nothing in
    /// this core reads it back for rollback).
    #[instrument(skip(self))]
    pub async fn reload(&self, id: Uuid) -> Result<(), RegistryError> {
        let workflow = self.store.get_workflow(id).await?;
        self.store
            .record_workflow_version(WorkflowVersionSnapshot {
                id: Uuid::new_v4(),
                workflow_id: id,
                version: workflow.updated_at.timestamp() as u32,
                definition: serde_json::json!({
                    "nodes": workflow.nodes,
                    "edges": workflow.edges,
                }),
                created_at: chrono::Utc::now(),
            })
            .await?;

        self.stop(id).await?;
        self.start(id).await?;
        info!(workflow_id = %id, "workflow instance reloaded");
        Ok(())
    }

    /// Forwards an external approval resolution to the owning
    /// instance, if it is currently running on this worker.
    pub async fn resume_approval(&self, workflow_id: Uuid, approval_id: Uuid) -> Result<(), RegistryError> {
        let instance = self
            .instances
            .get(&workflow_id)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::NotRunning(workflow_id))?;
        instance.resume_approval(approval_id).await?;
        Ok(())
    }

    async fn handle_event(&self, event: LeaseEvent) {
        let result = match event {
            LeaseEvent::Start(id) => self.start(id).await,
            LeaseEvent::Stop(id) => self.stop(id).await,
        };
        if let Err(err) = result {
            error!(?err, "failed to apply lease event");
        }
    }

    /// spec §4.7 `Reconcile()`: repairs drift between the live instance
    /// map and the leases this worker actually holds — e.g. a crashed
    /// instance whose workflow lease is still owned by this worker is
    /// restarted; an instance whose lease was lost (voluntary release,
    /// or stolen after a missed heartbeat) is stopped.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<(), RegistryError> {
        let now = chrono::Utc::now();
        let page = self
            .store
            .list_workflows(hermod_types::ListFilter {
                limit: 10_000,
                ..Default::default()
            })
            .await?;

        let owned: std::collections::HashSet<Uuid> = page
            .items
            .iter()
            .filter(|wf| {
                wf.active
                    && wf.is_owned_at(now)
                    && wf.owner_id.as_deref() == Some(self.worker_id.as_str())
            })
            .map(|wf| wf.id)
            .collect();

        let running: Vec<Uuid> = self.instances.iter().map(|e| *e.key()).collect();

        for id in &owned {
            if !self.instances.contains_key(id) {
                warn!(workflow_id = %id, "owned workflow missing a running instance, restarting");
                if let Err(err) = self.start(*id).await {
                    error!(workflow_id = %id, ?err, "failed to restart drifted instance");
                }
            }
        }

        for id in running {
            if !owned.contains(&id) {
                warn!(workflow_id = %id, "instance running without an owned lease, stopping");
                if let Err(err) = self.stop(id).await {
                    error!(workflow_id = %id, ?err, "failed to stop orphaned instance");
                }
            }
        }

        Ok(())
    }

    /// Drives the Registry: consumes `LeaseEvent`s from the Lease
    /// Manager and runs `reconcile()` on a fixed interval, until
    /// `shutdown` is cancelled. Stops every running instance before
    /// returning.
    pub async fn run(&self, mut events: mpsc::Receiver<LeaseEvent>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.reconcile_interval);

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.reconcile().await {
                        error!(?err, "reconcile pass failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        let ids: Vec<Uuid> = self.instances.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Err(err) = self.stop(id).await {
                error!(workflow_id = %id, ?err, "failed to stop instance during registry shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hermod_runtime::NodeBindings;
    use hermod_store::InMemoryMetadataStore;
    use hermod_types::{DlqPolicy, Edge, NodeType, ResourceRequest, Workflow, WorkflowNode, WorkflowStatus};

    struct EmptyResolver;

    #[async_trait]
    impl ConnectorResolver for EmptyResolver {
        async fn resolve(&self, _workflow: &Workflow) -> Result<NodeBindings, RegistryError> {
            Ok(NodeBindings::default())
        }
    }

    fn workflow(id: Uuid, owner: Option<&str>) -> Workflow {
        let now = chrono::Utc::now();
        Workflow {
            id,
            name: "wf".into(),
            vhost: "/".into(),
            workspace_id: None,
            active: true,
            status: WorkflowStatus::Stopped,
            nodes: vec![WorkflowNode {
                id: "src".into(),
                node_type: NodeType::Source,
                ref_id: None,
                config: serde_json::json!({}),
                x: 0.0,
                y: 0.0,
            }],
            edges: Vec::<Edge>::new(),
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
            reconnect_interval: Duration::from_secs(5),
            dlq: DlqPolicy::default(),
            dry_run: true,
            schema_type: None,
            schema: None,
            cron: None,
            idle_timeout: Duration::from_secs(3600),
            tier: "standard".into(),
            trace_sample_rate: 0.0,
            resources: ResourceRequest::default(),
            owner_id: owner.map(|s| s.to_string()),
            lease_until: owner.map(|_| now + chrono::Duration::seconds(60)),
            created_at: now,
            updated_at: now,
        }
    }

    fn test_registry(store: Arc<dyn MetadataStore>) -> Registry {
        Registry::new(
            "worker-1",
            store.clone(),
            Arc::new(SchemaRegistry::new(store)),
            Arc::new(EmptyResolver),
            RegistryConfig::default(),
        )
    }

    #[tokio::test]
    async fn start_inserts_a_running_instance() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf = workflow(Uuid::new_v4(), Some("worker-1"));
        store.create_workflow(wf.clone()).await.unwrap();

        let registry = test_registry(store.clone());
        registry.start(wf.id).await.unwrap();
        assert!(registry.instances.contains_key(&wf.id));

        registry.stop(wf.id).await.unwrap();
        assert!(!registry.instances.contains_key(&wf.id));
    }

    #[tokio::test]
    async fn reconcile_restarts_a_drifted_owned_workflow() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf = workflow(Uuid::new_v4(), Some("worker-1"));
        store.create_workflow(wf.clone()).await.unwrap();

        let registry = test_registry(store);
        assert!(!registry.instances.contains_key(&wf.id));

        registry.reconcile().await.unwrap();
        assert!(registry.instances.contains_key(&wf.id));

        registry.stop(wf.id).await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_stops_an_instance_with_a_lost_lease() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf = workflow(Uuid::new_v4(), Some("worker-1"));
        store.create_workflow(wf.clone()).await.unwrap();

        let registry = test_registry(store.clone());
        registry.start(wf.id).await.unwrap();

        let mut lost = wf.clone();
        lost.owner_id = None;
        lost.lease_until = None;
        store.update_workflow(lost).await.unwrap();

        registry.reconcile().await.unwrap();
        assert!(!registry.instances.contains_key(&wf.id));
    }
}
