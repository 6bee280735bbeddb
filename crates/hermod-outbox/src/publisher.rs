//! Outbox Publisher (spec §4.5).
//!
//! Grounded on `durable::reliability::retry`'s retry-loop shape for the
//! per-item attempt/backoff bookkeeping, generalized from a single
//! retry policy into the full claim → write → settle pipeline the spec
//! describes, since the teacher's retry helper only wraps one call
//! rather than owning a durable queue.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hermod_store::MetadataStore;
use hermod_types::{AuditLogEntry, ErrorKind, FailureClass, Message, SinkCapability};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backoff::next_delay;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::OutboxError;

pub type SinkHandle = Arc<AsyncMutex<dyn SinkCapability + Send>>;

/// Resolves a sink id to a live capability handle. Implemented by
/// `hermod-runtime` (or a worker's connector registry); kept abstract
/// here so the outbox crate has no dependency on how sinks are wired
/// up.
#[async_trait::async_trait]
pub trait SinkResolver: Send + Sync {
    async fn resolve(&self, sink_id: Uuid) -> Option<SinkHandle>;
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Max items claimed per `run_once` pass.
    pub batch_size: u32,
    /// Base interval multiplied by the backoff schedule (spec §4.5).
    pub retry_interval: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry_interval: Duration::from_secs(5),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Classifies a capability error into the retry taxonomy (spec §4.5
/// "Failure taxonomy"), defaulting unknown kinds to transient per the
/// spec's conservative default.
fn classify(kind: ErrorKind) -> FailureClass {
    match kind {
        ErrorKind::PermanentSink | ErrorKind::SchemaIncompatible => FailureClass::Permanent,
        _ => FailureClass::Transient,
    }
}

pub struct Publisher {
    store: Arc<dyn MetadataStore>,
    resolver: Arc<dyn SinkResolver>,
    breakers: DashMap<Uuid, SyncMutex<CircuitBreaker>>,
    config: PublisherConfig,
    worker_id: String,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        resolver: Arc<dyn SinkResolver>,
        config: PublisherConfig,
        worker_id: String,
    ) -> Self {
        Self {
            store,
            resolver,
            breakers: DashMap::new(),
            config,
            worker_id,
        }
    }

    fn breaker_allows(&self, sink_id: Uuid) -> bool {
        self.breakers
            .entry(sink_id)
            .or_insert_with(|| SyncMutex::new(CircuitBreaker::new(self.config.circuit_breaker.clone())))
            .lock()
            .allow()
    }

    fn record_outcome(&self, sink_id: Uuid, kind: Option<ErrorKind>) {
        let entry = self
            .breakers
            .entry(sink_id)
            .or_insert_with(|| SyncMutex::new(CircuitBreaker::new(self.config.circuit_breaker.clone())));
        let mut breaker = entry.lock();
        match kind {
            Some(k) => breaker.record_failure(k),
            None => breaker.record_success(),
        }
    }

    /// Claims up to `batch_size` pending items and attempts delivery.
    /// Returns the number of items settled (delivered, retried, or
    /// dead-lettered).
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize, OutboxError> {
        let items = self
            .store
            .claim_outbox_items(&self.worker_id, self.config.batch_size)
            .await?;
        let mut settled = 0;
        for item in items {
            self.settle_item(item).await?;
            settled += 1;
        }
        Ok(settled)
    }

    async fn settle_item(&self, item: hermod_types::OutboxItem) -> Result<(), OutboxError> {
        if !self.breaker_allows(item.sink_id) {
            let delay = next_delay(self.config.retry_interval, item.attempts);
            self.store
                .fail_outbox_item(
                    item.id,
                    "circuit open for sink",
                    FailureClass::Transient,
                    chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default(),
                )
                .await?;
            return Ok(());
        }

        let Some(sink) = self.resolver.resolve(item.sink_id).await else {
            warn!(sink_id = %item.sink_id, "no sink registered, leaving item pending");
            return Err(OutboxError::UnknownSink(item.sink_id));
        };

        let message: Message = match serde_json::from_slice(&item.payload) {
            Ok(m) => m,
            Err(e) => {
                // A payload that doesn't deserialize will never succeed.
                self.store
                    .mark_outbox_item_dead(item.id, &format!("undecodable payload: {e}"))
                    .await?;
                return Ok(());
            }
        };

        let write_result = sink.lock().await.write(&message).await;

        match write_result {
            Ok(()) => {
                self.store.complete_outbox_item(item.id).await?;
                self.record_outcome(item.sink_id, None);
                Ok(())
            }
            Err(kind) => {
                self.record_outcome(item.sink_id, Some(kind));
                let class = classify(kind);
                self.handle_failure(item, class, kind).await
            }
        }
    }

    async fn handle_failure(
        &self,
        item: hermod_types::OutboxItem,
        class: FailureClass,
        kind: ErrorKind,
    ) -> Result<(), OutboxError> {
        let permanent = class == FailureClass::Permanent;
        let exhausted = item.attempts + 1 >= item.max_attempts;

        if permanent || exhausted {
            self.demote_to_dlq(item, kind).await
        } else {
            let delay = next_delay(self.config.retry_interval, item.attempts);
            self.store
                .fail_outbox_item(
                    item.id,
                    &format!("{kind:?}"),
                    class,
                    chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default(),
                )
                .await?;
            Ok(())
        }
    }

    async fn demote_to_dlq(
        &self,
        item: hermod_types::OutboxItem,
        kind: ErrorKind,
    ) -> Result<(), OutboxError> {
        let workflow = self.store.get_workflow(item.workflow_id).await.ok();
        let dlq_sink_id = workflow.as_ref().and_then(|w| w.dlq.dlq_sink_id);

        self.store
            .mark_outbox_item_dead(item.id, &format!("{kind:?}"))
            .await?;

        if let Some(dlq_sink_id) = dlq_sink_id {
            let dlq_item = hermod_types::OutboxItem {
                id: Uuid::new_v4(),
                workflow_id: item.workflow_id,
                sink_id: dlq_sink_id,
                node_id: item.node_id.clone(),
                payload: item.payload.clone(),
                status: hermod_types::OutboxStatus::Pending,
                attempts: 0,
                max_attempts: item.max_attempts,
                last_error: None,
                last_failure_class: None,
                available_at: chrono::Utc::now(),
                claimed_by: None,
                claimed_at: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            };
            self.store.create_outbox_item(dlq_item).await?;
        }

        self.store
            .record_audit_log(AuditLogEntry {
                id: Uuid::new_v4(),
                actor: "outbox-publisher".into(),
                action: "dead_letter".into(),
                entity_type: "outbox_item".into(),
                entity_id: item.id.to_string(),
                detail: Some(serde_json::json!({"kind": format!("{kind:?}")})),
                created_at: chrono::Utc::now(),
            })
            .await?;

        info!(item_id = %item.id, sink_id = %item.sink_id, "outbox item dead-lettered");
        Ok(())
    }

    /// Reclaims items stuck `in_flight` past `claim_ttl` (spec §9
    /// "stuck in_flight items").
    pub async fn reclaim_stale(&self, claim_ttl: chrono::Duration) -> Result<usize, OutboxError> {
        let reclaimed = self.store.reclaim_stale_outbox_items(claim_ttl).await?;
        Ok(reclaimed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hermod_store::InMemoryMetadataStore;
    use hermod_types::{DlqPolicy, OutboxItem, OutboxStatus, ResourceRequest, Workflow, WorkflowStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        fail_times: AtomicU32,
        kind: ErrorKind,
    }

    #[async_trait]
    impl SinkCapability for FlakySink {
        async fn write(&mut self, _msg: &Message) -> Result<(), ErrorKind> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                Err(self.kind)
            } else {
                Ok(())
            }
        }
        async fn ping(&self) -> Result<(), ErrorKind> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    struct SingleSinkResolver(SinkHandle);

    #[async_trait]
    impl SinkResolver for SingleSinkResolver {
        async fn resolve(&self, _sink_id: Uuid) -> Option<SinkHandle> {
            Some(self.0.clone())
        }
    }

    fn workflow(id: Uuid, dlq_sink_id: Option<Uuid>) -> Workflow {
        Workflow {
            id,
            name: "wf".into(),
            vhost: "/".into(),
            workspace_id: None,
            active: true,
            status: WorkflowStatus::Running,
            nodes: vec![],
            edges: vec![],
            max_retries: 3,
            retry_interval: Duration::from_millis(1),
            reconnect_interval: Duration::from_secs(5),
            dlq: DlqPolicy {
                dlq_sink_id,
                dlq_threshold: 3,
                prioritize_dlq: false,
            },
            dry_run: false,
            schema_type: None,
            schema: None,
            cron: None,
            idle_timeout: Duration::from_secs(60),
            tier: "standard".into(),
            trace_sample_rate: 1.0,
            resources: ResourceRequest::default(),
            owner_id: None,
            lease_until: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn item(workflow_id: Uuid, sink_id: Uuid, max_attempts: u32) -> OutboxItem {
        OutboxItem {
            id: Uuid::new_v4(),
            workflow_id,
            sink_id,
            node_id: "sink-1".into(),
            payload: serde_json::to_vec(&Message::default()).unwrap(),
            status: OutboxStatus::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
            last_failure_class: None,
            available_at: chrono::Utc::now(),
            claimed_by: None,
            claimed_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn successful_write_completes_the_item() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf_id = Uuid::new_v4();
        let sink_id = Uuid::new_v4();
        store.create_workflow(workflow(wf_id, None)).await.unwrap();
        let it = item(wf_id, sink_id, 3);
        let it_id = it.id;
        store.create_outbox_item(it).await.unwrap();

        let sink: SinkHandle = Arc::new(AsyncMutex::new(FlakySink {
            fail_times: AtomicU32::new(0),
            kind: ErrorKind::TransientNetwork,
        }));
        let publisher = Publisher::new(
            store.clone(),
            Arc::new(SingleSinkResolver(sink)),
            PublisherConfig::default(),
            "worker-1".into(),
        );

        assert_eq!(publisher.run_once().await.unwrap(), 1);
        assert!(store.get_outbox_item(it_id).await.is_err());
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_regardless_of_attempts() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf_id = Uuid::new_v4();
        let sink_id = Uuid::new_v4();
        let dlq_sink_id = Uuid::new_v4();
        store.create_workflow(workflow(wf_id, Some(dlq_sink_id))).await.unwrap();
        let it = item(wf_id, sink_id, 10);
        let it_id = it.id;
        store.create_outbox_item(it).await.unwrap();

        let sink: SinkHandle = Arc::new(AsyncMutex::new(FlakySink {
            fail_times: AtomicU32::new(u32::MAX),
            kind: ErrorKind::PermanentSink,
        }));
        let publisher = Publisher::new(
            store.clone(),
            Arc::new(SingleSinkResolver(sink)),
            PublisherConfig::default(),
            "worker-1".into(),
        );

        publisher.run_once().await.unwrap();
        let dead = store.get_outbox_item(it_id).await.unwrap();
        assert_eq!(dead.status, OutboxStatus::Dead);

        let page = store
            .list_outbox_items(hermod_types::ListFilter::default())
            .await
            .unwrap();
        assert!(page.items.iter().any(|i| i.sink_id == dlq_sink_id));
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf_id = Uuid::new_v4();
        let sink_id = Uuid::new_v4();
        store.create_workflow(workflow(wf_id, None)).await.unwrap();
        let mut it = item(wf_id, sink_id, 5);
        it.available_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        let it_id = it.id;
        store.create_outbox_item(it).await.unwrap();

        let sink: SinkHandle = Arc::new(AsyncMutex::new(FlakySink {
            fail_times: AtomicU32::new(1),
            kind: ErrorKind::TransientNetwork,
        }));
        let publisher = Publisher::new(
            store.clone(),
            Arc::new(SingleSinkResolver(sink)),
            PublisherConfig {
                retry_interval: Duration::from_millis(1),
                ..PublisherConfig::default()
            },
            "worker-1".into(),
        );

        publisher.run_once().await.unwrap();
        let pending = store.get_outbox_item(it_id).await.unwrap();
        assert_eq!(pending.status, OutboxStatus::Pending);
        assert_eq!(pending.attempts, 1);

        // Force it due again and retry: should now succeed and be gone.
        let mut guard_item = store.get_outbox_item(it_id).await.unwrap();
        guard_item.available_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        // InMemoryMetadataStore has no direct item mutator beyond the trait;
        // claim requires available_at <= now which it already is after the
        // scheduled retry delay on a 1ms interval.
        tokio::time::sleep(Duration::from_millis(5)).await;
        publisher.run_once().await.unwrap();
        assert!(store.get_outbox_item(it_id).await.is_err());
    }
}
