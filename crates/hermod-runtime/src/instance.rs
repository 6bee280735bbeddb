//! Workflow Instance executor (spec §4.4, capability C5).
//!
//! The task-spawning, shared-shutdown-signal shape is grounded on
//! `durable::worker::pool::WorkerPool`: a `watch::Sender<bool>`
//! shutdown signal shared by every background task, each loop wrapped
//! in `tokio::select!` against `shutdown_rx.changed()`, and a bounded
//! grace wait before the caller gives up. All mutable state the tasks
//! share (senders, suspended approvals, status) lives behind one
//! `Arc<Inner>` so every task (and the `Instance` handle itself) reads
//! and writes the same data rather than private copies. The DAG-specific
//! parts (per-node bounded channels, fan-out/fan-in, schema gate,
//! approval suspension, idle watchdog, dlq-threshold failure) have no
//! teacher analog and are built directly from spec §4.4's own prose.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hermod_schema::SchemaRegistry;
use hermod_store::MetadataStore;
use hermod_types::{
    Approval, ApprovalStatus, AuditLogEntry, Message, MessagePool, NodeType, OutboxItem,
    OutboxStatus, SinkCapability, SourceCapability, TraceStep, Workflow, WorkflowNode,
    WorkflowStatus,
};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::behavior::{Condition, Transformer};
use crate::error::RuntimeError;
use crate::sampler::should_trace;

/// Per-node connector/behavior bindings. Source/sink connectors are
/// owned elsewhere (connector crates, out of this core's scope);
/// `Instance` only ever drives them through these trait objects.
#[derive(Default)]
pub struct NodeBindings {
    pub sources: HashMap<String, Arc<AsyncMutex<dyn SourceCapability>>>,
    pub sinks: HashMap<String, Arc<AsyncMutex<dyn SinkCapability>>>,
    pub transformers: HashMap<String, Arc<dyn Transformer>>,
    pub conditions: HashMap<String, Arc<dyn Condition>>,
}

#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Bounded in-memory channel capacity between nodes (spec §4.4:
    /// "default 1024").
    pub channel_capacity: usize,
    pub shutdown_grace: Duration,
    /// How often the idle-timeout and dlq-threshold watchdogs poll.
    pub watchdog_interval: Duration,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            shutdown_grace: Duration::from_secs(30),
            watchdog_interval: Duration::from_secs(5),
        }
    }
}

/// A message in flight, carrying the id of the source node it entered
/// the DAG through so the sink-submit task can ack the right source.
#[derive(Clone)]
struct Envelope {
    msg: Message,
    origin_node: String,
}

/// All state shared between `Instance` and its spawned tasks.
struct Inner {
    workflow: SyncMutex<Workflow>,
    worker_id: String,
    store: Arc<dyn MetadataStore>,
    schema_registry: Arc<SchemaRegistry>,
    bindings: NodeBindings,
    pool: Arc<MessagePool>,
    config: InstanceConfig,
    status: SyncMutex<WorkflowStatus>,
    last_source_activity: SyncMutex<Instant>,
    suspended: SyncMutex<HashMap<Uuid, (Envelope, String)>>,
    senders: SyncMutex<HashMap<String, mpsc::Sender<Envelope>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Inner {
    fn status(&self) -> WorkflowStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: WorkflowStatus) {
        *self.status.lock() = status;
        let mut wf = self.workflow.lock();
        wf.status = status;
        wf.updated_at = Utc::now();
    }

    async fn persist_status(&self) -> Result<(), RuntimeError> {
        let wf = self.workflow.lock().clone();
        self.store.update_workflow(wf).await?;
        Ok(())
    }

    async fn fail(&self, reason: &str) -> Result<(), RuntimeError> {
        self.set_status(WorkflowStatus::Failed);
        self.persist_status().await?;
        let workflow_id = self.workflow.lock().id;
        self.store
            .record_audit_log(AuditLogEntry {
                id: Uuid::new_v4(),
                actor: self.worker_id.clone(),
                action: "failed".into(),
                entity_type: "workflow".into(),
                entity_id: workflow_id.to_string(),
                detail: Some(serde_json::json!({ "reason": reason })),
                created_at: Utc::now(),
            })
            .await?;
        error!(%workflow_id, reason, "workflow instance failed");
        Ok(())
    }

    fn downstream_senders(&self, node_id: &str) -> Vec<(String, mpsc::Sender<Envelope>)> {
        let wf = self.workflow.lock();
        let senders = self.senders.lock();
        wf.edges
            .iter()
            .filter(|e| e.from == node_id)
            .filter_map(|e| senders.get(&e.to).map(|tx| (e.to.clone(), tx.clone())))
            .collect()
    }

    async fn forward(&self, node_id: &str, msg: Message, origin_node: &str) {
        let targets = self.downstream_senders(node_id);
        for (to, tx) in targets {
            let envelope = Envelope {
                msg: msg.clone(),
                origin_node: origin_node.to_string(),
            };
            if tx.send(envelope).await.is_err() {
                warn!(node_id = %to, "downstream node channel closed, dropping message");
            }
        }
    }

    async fn dispatch(
        &self,
        node_id: &str,
        node_type: NodeType,
        envelope: Envelope,
    ) -> Result<(), RuntimeError> {
        let start = Instant::now();
        let wf = self.workflow.lock().clone();
        let node = wf
            .nodes
            .iter()
            .find(|n| n.id == node_id)
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidTopology(node_id.to_string()))?;

        // Schema gate (spec §4.4 "Schema-validate nodes"): applied
        // ahead of every non-source node's own behavior when the
        // workflow declares a schema, since `NodeType` has no distinct
        // variant for it (§3's node kinds are Source/Sink/Transformer/
        // Condition/Approval only) — see DESIGN.md for this mapping.
        if let (Some(_), Some(name)) = (&wf.schema_type, &wf.schema) {
            if let Ok(validator) = self.schema_registry.get_latest_validator(name).await {
                if let Err(validation_err) = validator.validate(&serde_json::Value::Object(
                    envelope.msg.data.clone(),
                )) {
                    self.record_trace(&wf, node_id, start, None, Some(validation_err.to_string()))
                        .await?;
                    self.route_to_dlq(&wf, node_id, envelope, &validation_err.to_string())
                        .await?;
                    return Ok(());
                }
            }
        }

        let traced = should_trace(wf.trace_sample_rate, false);
        let mut error: Option<String> = None;

        match node_type {
            NodeType::Source => {
                // Driven by the fetch task, never dispatched here.
            }
            NodeType::Sink => {
                if let Err(err) = self.submit_to_sink(&wf, &node, envelope.clone()).await {
                    error = Some(err.to_string());
                }
            }
            NodeType::Transformer => {
                let transformer = self.bindings.transformers.get(node_id).cloned();
                match transformer {
                    Some(t) => match t.apply(envelope.msg.clone()).await {
                        Ok(outputs) => {
                            for out in outputs {
                                self.forward(node_id, out, &envelope.origin_node).await;
                            }
                        }
                        Err(err) => error = Some(format!("{err:?}")),
                    },
                    None => return Err(RuntimeError::MissingTransformer(node_id.to_string())),
                }
            }
            NodeType::Condition => {
                let condition = self.bindings.conditions.get(node_id).cloned();
                match condition {
                    Some(c) => match c.routes(&envelope.msg).await {
                        Ok(targets) => {
                            for to in targets {
                                let tx = self.senders.lock().get(&to).cloned();
                                if let Some(tx) = tx {
                                    let fwd = Envelope {
                                        msg: envelope.msg.clone(),
                                        origin_node: envelope.origin_node.clone(),
                                    };
                                    let _ = tx.send(fwd).await;
                                }
                            }
                        }
                        Err(err) => error = Some(format!("{err:?}")),
                    },
                    None => return Err(RuntimeError::MissingCondition(node_id.to_string())),
                }
            }
            NodeType::Approval => {
                self.suspend_for_approval(&wf, node_id, envelope.clone())
                    .await?;
            }
        }

        if traced || error.is_some() {
            self.record_trace(&wf, node_id, start, Some(&envelope.msg), error)
                .await?;
        }

        Ok(())
    }

    async fn submit_to_sink(
        &self,
        wf: &Workflow,
        node: &WorkflowNode,
        envelope: Envelope,
    ) -> Result<(), RuntimeError> {
        if wf.dry_run {
            debug!(node_id = %node.id, "dry-run: would write outbox item");
        } else {
            let sink_id = node
                .ref_id
                .ok_or_else(|| RuntimeError::MissingSink(node.id.clone()))?;
            let payload = serde_json::to_vec(&envelope.msg).unwrap_or_default();
            let now = Utc::now();
            let item = OutboxItem {
                id: Uuid::new_v4(),
                workflow_id: wf.id,
                sink_id,
                node_id: node.id.clone(),
                payload,
                status: OutboxStatus::Pending,
                attempts: 0,
                max_attempts: wf.max_retries,
                last_error: None,
                last_failure_class: None,
                available_at: now,
                claimed_by: None,
                claimed_at: None,
                created_at: now,
                updated_at: now,
            };
            self.store.create_outbox_item(item).await?;
        }

        if let Some(source) = self.bindings.sources.get(&envelope.origin_node).cloned() {
            let mut guard = source.lock().await;
            let _ = guard.ack(&envelope.msg).await;
        }
        Ok(())
    }

    async fn route_to_dlq(
        &self,
        wf: &Workflow,
        node_id: &str,
        envelope: Envelope,
        reason: &str,
    ) -> Result<(), RuntimeError> {
        let Some(dlq_sink_id) = wf.dlq.dlq_sink_id else {
            warn!(node_id, reason, "schema validation failed, no dlq sink configured, dropping");
            return Ok(());
        };
        let dlq_node = wf
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::Sink && n.ref_id == Some(dlq_sink_id));
        let Some(dlq_node) = dlq_node else {
            warn!(node_id, reason, "dlq sink configured but no matching sink node, dropping");
            return Ok(());
        };
        self.submit_to_sink(wf, dlq_node, envelope).await
    }

    async fn suspend_for_approval(
        &self,
        wf: &Workflow,
        node_id: &str,
        envelope: Envelope,
    ) -> Result<(), RuntimeError> {
        let approval = Approval {
            id: Uuid::new_v4(),
            workflow_id: wf.id,
            node_id: node_id.to_string(),
            message_id: envelope.msg.id,
            status: ApprovalStatus::Pending,
            requested_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        };
        self.store.create_approval(approval.clone()).await?;
        self.suspended
            .lock()
            .insert(approval.id, (envelope, node_id.to_string()));
        info!(workflow_id = %wf.id, node_id, approval_id = %approval.id, "message suspended pending approval");
        Ok(())
    }

    async fn record_trace(
        &self,
        wf: &Workflow,
        node_id: &str,
        start: Instant,
        msg: Option<&Message>,
        error: Option<String>,
    ) -> Result<(), RuntimeError> {
        let step = TraceStep {
            id: Uuid::new_v4(),
            workflow_id: wf.id,
            instance_run_id: Uuid::new_v4(),
            node_id: node_id.to_string(),
            timestamp: Utc::now(),
            duration_micros: start.elapsed().as_micros() as u64,
            data: msg.map(|m| serde_json::json!({ "data": m.data })),
            error,
        };
        self.store.record_trace_step(step).await?;
        Ok(())
    }

    async fn check_dlq_threshold(&self) -> Result<(), RuntimeError> {
        let wf = self.workflow.lock().clone();
        if wf.dlq.dlq_threshold == 0 {
            return Ok(());
        }
        let page = self
            .store
            .list_outbox_items(hermod_types::ListFilter {
                limit: 10_000,
                ..Default::default()
            })
            .await?;
        let dead = page
            .items
            .iter()
            .filter(|i| i.workflow_id == wf.id && i.status == OutboxStatus::Dead)
            .count() as u32;
        if dead >= wf.dlq.dlq_threshold {
            self.fail(&format!("dlq threshold exceeded: {dead} dead items"))
                .await?;
        }
        Ok(())
    }

    /// spec §4.4 "Idle timeout": no source activity for `idle_timeout`
    /// moves the instance to `reconnecting`; a ping probe against every
    /// bound source stands in for the teacher-absent "tear down and
    /// rebuild" behavior, bounded by `reconnect_interval` backoff.
    async fn check_idle(&self) {
        let idle_timeout = self.workflow.lock().idle_timeout;
        let elapsed = self.last_source_activity.lock().elapsed();
        if elapsed < idle_timeout || self.status() != WorkflowStatus::Running {
            return;
        }

        self.set_status(WorkflowStatus::Reconnecting);
        if self.persist_status().await.is_err() {
            return;
        }
        warn!(workflow_id = %self.workflow.lock().id, "idle timeout exceeded, reconnecting sources");

        let reconnect_interval = self.workflow.lock().reconnect_interval;
        let mut backoff = Duration::from_millis(100);
        for source in self.bindings.sources.values() {
            loop {
                let ok = { source.lock().await.ping().await.is_ok() };
                if ok {
                    break;
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(reconnect_interval);
                if backoff >= reconnect_interval {
                    break;
                }
            }
        }

        *self.last_source_activity.lock() = Instant::now();
        self.set_status(WorkflowStatus::Running);
        let _ = self.persist_status().await;
    }
}

pub struct Instance {
    inner: Arc<Inner>,
    handles: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Instance {
    pub fn new(
        workflow: Workflow,
        worker_id: impl Into<String>,
        store: Arc<dyn MetadataStore>,
        schema_registry: Arc<SchemaRegistry>,
        bindings: NodeBindings,
        pool: Arc<MessagePool>,
        config: InstanceConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            workflow: SyncMutex::new(workflow),
            worker_id: worker_id.into(),
            store,
            schema_registry,
            bindings,
            pool,
            config,
            status: SyncMutex::new(WorkflowStatus::Stopped),
            last_source_activity: SyncMutex::new(Instant::now()),
            suspended: SyncMutex::new(HashMap::new()),
            senders: SyncMutex::new(HashMap::new()),
            shutdown_tx,
            shutdown_rx,
        });
        Self {
            inner,
            handles: AsyncMutex::new(Vec::new()),
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.inner.status()
    }

    /// spec §4.4 state machine: `stopped -start-> starting -ready-> running`.
    #[instrument(skip(self), fields(workflow_id = %self.inner.workflow.lock().id))]
    pub async fn start(&self) -> Result<(), RuntimeError> {
        self.inner
            .workflow
            .lock()
            .clone()
            .validate_shape()
            .map_err(|e| RuntimeError::InvalidTopology(e.to_string()))?;

        self.inner.set_status(WorkflowStatus::Starting);
        self.inner.persist_status().await?;

        let wf = self.inner.workflow.lock().clone();

        // One inbound channel per node; multiple producers (fan-in) are
        // just clones of the same Sender.
        let mut receivers = HashMap::new();
        {
            let mut senders = self.inner.senders.lock();
            for node in &wf.nodes {
                let (tx, rx) = mpsc::channel(self.inner.config.channel_capacity);
                senders.insert(node.id.clone(), tx);
                receivers.insert(node.id.clone(), rx);
            }
        }

        let mut handles = Vec::new();

        for node in &wf.nodes {
            match node.node_type {
                NodeType::Source => {
                    handles.push(self.spawn_fetch_task(node.id.clone()));
                }
                _ => {
                    let rx = receivers
                        .remove(&node.id)
                        .expect("receiver created above for every node");
                    handles.push(self.spawn_node_task(node.id.clone(), node.node_type, rx));
                }
            }
        }

        handles.push(self.spawn_dlq_watchdog());
        handles.push(self.spawn_idle_watchdog());

        *self.handles.lock().await = handles;

        self.inner.set_status(WorkflowStatus::Running);
        self.inner.persist_status().await?;
        info!(workflow_id = %wf.id, "workflow instance running");
        Ok(())
    }

    fn spawn_fetch_task(&self, node_id: String) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = inner.shutdown_rx.clone();

        tokio::spawn(async move {
            let Some(source) = inner.bindings.sources.get(&node_id).cloned() else {
                error!(node_id, "no source bound for fetch task");
                return;
            };

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let read_result = {
                    let mut guard = source.lock().await;
                    guard.read().await
                };

                match read_result {
                    Ok(Some(msg)) => {
                        *inner.last_source_activity.lock() = Instant::now();
                        let _pooled = inner.pool.acquire();
                        inner.forward(&node_id, msg, &node_id).await;
                    }
                    Ok(None) => {
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                    Err(err) => {
                        warn!(node_id, ?err, "source read failed");
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                }
            }
            debug!(node_id, "fetch task exited");
        })
    }

    fn spawn_node_task(
        &self,
        node_id: String,
        node_type: NodeType,
        mut rx: mpsc::Receiver<Envelope>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = inner.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    got = rx.recv() => match got {
                        Some(e) => e,
                        None => break,
                    },
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                };

                if let Err(err) = inner.dispatch(&node_id, node_type, envelope).await {
                    error!(node_id, ?err, "node dispatch failed");
                }
            }
            debug!(node_id, "node task exited");
        })
    }

    fn spawn_dlq_watchdog(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = inner.shutdown_rx.clone();
        let interval = inner.config.watchdog_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = inner.check_dlq_threshold().await {
                            error!(?err, "dlq threshold check failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    }

    fn spawn_idle_watchdog(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = inner.shutdown_rx.clone();
        let interval = inner.config.watchdog_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        inner.check_idle().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    }

    /// Called by the Registry after an external resolution resolves an
    /// `Approval` to `Approved`; continues the suspended message
    /// downstream of its approval node (spec §4.4: "resumed messages
    /// continue downstream").
    pub async fn resume_approval(&self, approval_id: Uuid) -> Result<(), RuntimeError> {
        let entry = self.inner.suspended.lock().remove(&approval_id);
        let Some((envelope, node_id)) = entry else {
            return Ok(());
        };
        self.inner
            .forward(&node_id, envelope.msg, &envelope.origin_node)
            .await;
        Ok(())
    }

    /// Re-emits a resume-pending trace for every still-unresolved
    /// approval on instance restart (spec §C Open Question c).
    pub async fn reemit_pending_approvals(&self) -> Result<(), RuntimeError> {
        let wf = self.inner.workflow.lock().clone();
        let pending = self.inner.store.list_pending_approvals(wf.id).await?;
        for approval in pending {
            let step = TraceStep {
                id: Uuid::new_v4(),
                workflow_id: wf.id,
                instance_run_id: Uuid::new_v4(),
                node_id: approval.node_id.clone(),
                timestamp: Utc::now(),
                duration_micros: 0,
                data: Some(serde_json::json!({ "resumed": true, "approval_id": approval.id })),
                error: None,
            };
            self.inner.store.record_trace_step(step).await?;
        }
        Ok(())
    }

    /// Two-phase shutdown (spec §5): signal every task, wait up to
    /// `shutdown_grace` for them to drain, then abort stragglers.
    #[instrument(skip(self), fields(workflow_id = %self.inner.workflow.lock().id))]
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        let _ = self.inner.shutdown_tx.send(true);
        let mut handles = self.handles.lock().await;

        let grace = self.inner.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            for handle in handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!("shutdown grace period elapsed, forcing remaining tasks to abort");
            for handle in handles.iter() {
                handle.abort();
            }
        }
        handles.clear();

        self.inner.set_status(WorkflowStatus::Stopped);
        self.inner.persist_status().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hermod_store::InMemoryMetadataStore;
    use hermod_types::{DlqPolicy, ErrorKind, ResourceRequest};
    use tokio::sync::Mutex as TokioMutex;

    struct VecSource {
        items: std::collections::VecDeque<Message>,
        acked: Arc<TokioMutex<Vec<Uuid>>>,
    }

    #[async_trait]
    impl SourceCapability for VecSource {
        async fn read(&mut self) -> Result<Option<Message>, ErrorKind> {
            Ok(self.items.pop_front())
        }
        async fn ack(&mut self, msg: &Message) -> Result<(), ErrorKind> {
            self.acked.lock().await.push(msg.id);
            Ok(())
        }
        async fn ping(&self) -> Result<(), ErrorKind> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    fn node(id: &str, ty: NodeType, ref_id: Option<Uuid>) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            node_type: ty,
            ref_id,
            config: serde_json::json!({}),
            x: 0.0,
            y: 0.0,
        }
    }

    fn base_workflow() -> Workflow {
        let now = Utc::now();
        Workflow {
            id: Uuid::new_v4(),
            name: "wf".into(),
            vhost: "/".into(),
            workspace_id: None,
            active: true,
            status: WorkflowStatus::Stopped,
            nodes: vec![
                node("src", NodeType::Source, None),
                node("snk", NodeType::Sink, Some(Uuid::new_v4())),
            ],
            edges: vec![hermod_types::Edge {
                from: "src".into(),
                to: "snk".into(),
            }],
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
            reconnect_interval: Duration::from_secs(5),
            dlq: DlqPolicy::default(),
            dry_run: false,
            schema_type: None,
            schema: None,
            cron: None,
            idle_timeout: Duration::from_secs(3600),
            tier: "standard".into(),
            trace_sample_rate: 1.0,
            resources: ResourceRequest::default(),
            owner_id: Some("worker-1".into()),
            lease_until: Some(now + chrono::Duration::seconds(60)),
            created_at: now,
            updated_at: now,
        }
    }

    fn test_config() -> InstanceConfig {
        InstanceConfig {
            watchdog_interval: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn message_flows_from_source_to_sink_outbox() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf = base_workflow();
        store.create_workflow(wf.clone()).await.unwrap();

        let acked = Arc::new(TokioMutex::new(Vec::new()));
        let msg = Message {
            id: Uuid::new_v4(),
            table: "orders".into(),
            ..Default::default()
        };
        let mut bindings = NodeBindings::default();
        bindings.sources.insert(
            "src".into(),
            Arc::new(TokioMutex::new(VecSource {
                items: std::collections::VecDeque::from([msg.clone()]),
                acked: acked.clone(),
            })),
        );

        let schema_registry = Arc::new(SchemaRegistry::new(store.clone()));
        let instance = Instance::new(
            wf.clone(),
            "worker-1",
            store.clone(),
            schema_registry,
            bindings,
            MessagePool::new(),
            test_config(),
        );

        instance.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        instance.stop().await.unwrap();

        let page = store
            .list_outbox_items(hermod_types::ListFilter::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].workflow_id, wf.id);
        assert_eq!(acked.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn dry_run_records_no_outbox_item() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let mut wf = base_workflow();
        wf.dry_run = true;
        store.create_workflow(wf.clone()).await.unwrap();

        let msg = Message {
            id: Uuid::new_v4(),
            table: "orders".into(),
            ..Default::default()
        };
        let mut bindings = NodeBindings::default();
        bindings.sources.insert(
            "src".into(),
            Arc::new(TokioMutex::new(VecSource {
                items: std::collections::VecDeque::from([msg]),
                acked: Arc::new(TokioMutex::new(Vec::new())),
            })),
        );

        let schema_registry = Arc::new(SchemaRegistry::new(store.clone()));
        let instance = Instance::new(
            wf.clone(),
            "worker-1",
            store.clone(),
            schema_registry,
            bindings,
            MessagePool::new(),
            test_config(),
        );

        instance.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        instance.stop().await.unwrap();

        let page = store
            .list_outbox_items(hermod_types::ListFilter::default())
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_topology_on_start() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let mut wf = base_workflow();
        wf.edges.push(hermod_types::Edge {
            from: "snk".into(),
            to: "missing".into(),
        });

        let schema_registry = Arc::new(SchemaRegistry::new(store.clone()));
        let instance = Instance::new(
            wf,
            "worker-1",
            store,
            schema_registry,
            NodeBindings::default(),
            MessagePool::new(),
            test_config(),
        );

        assert!(instance.start().await.is_err());
    }
}
