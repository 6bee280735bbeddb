//! Lease Manager (spec §4.6, capability C5).
//!
//! Grounded on `durable::reliability::retry`'s interval-loop shape for
//! the heartbeat `run()` driver (a `tokio::time::interval` ticked under
//! a `tokio_util::sync::CancellationToken`), generalized to the spec's
//! own tick body: heartbeat, candidate selection, acquire, renew.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use hermod_store::MetadataStore;
use hermod_types::{ListFilter, ResourceRequest};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::candidate::select_candidate;
use crate::error::LeaseManagerError;

/// Notifications the Lease Manager sends to the Registry when this
/// worker's ownership of a workflow changes (spec §4.6 step "notify
/// Registry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseEvent {
    Start(Uuid),
    Stop(Uuid),
}

#[derive(Debug, Clone)]
pub struct LeaseManagerConfig {
    pub heartbeat_interval: Duration,
    pub lease_ttl: ChronoDuration,
    pub cpu_budget_millis: u32,
    pub memory_budget_mb: u32,
}

impl LeaseManagerConfig {
    /// spec §4.6 invariant: `lease_ttl >= 3 * heartbeat_interval`, so a
    /// worker can miss two heartbeats before another worker can steal
    /// the lease.
    pub fn validate(&self) -> Result<(), LeaseManagerError> {
        let heartbeat_as_chrono = ChronoDuration::from_std(self.heartbeat_interval)
            .map_err(|e| LeaseManagerError::InvalidConfig(e.to_string()))?;
        if self.lease_ttl < heartbeat_as_chrono * 3 {
            return Err(LeaseManagerError::InvalidConfig(
                "lease_ttl must be >= 3 * heartbeat_interval".into(),
            ));
        }
        Ok(())
    }
}

pub struct LeaseManager {
    store: Arc<dyn MetadataStore>,
    worker_id: String,
    workspace_ids: Vec<Uuid>,
    config: LeaseManagerConfig,
    events: mpsc::Sender<LeaseEvent>,
    held: Mutex<HashMap<Uuid, ResourceRequest>>,
}

impl LeaseManager {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        worker_id: impl Into<String>,
        workspace_ids: Vec<Uuid>,
        config: LeaseManagerConfig,
        events: mpsc::Sender<LeaseEvent>,
    ) -> Result<Self, LeaseManagerError> {
        config.validate()?;
        Ok(Self {
            store,
            worker_id: worker_id.into(),
            workspace_ids,
            config,
            events,
            held: Mutex::new(HashMap::new()),
        })
    }

    fn used_budget(&self) -> (u32, u32) {
        let held = self.held.lock();
        held.values().fold((0u32, 0u32), |(cpu, mem), r| {
            (cpu + r.cpu_millis, mem + r.memory_mb)
        })
    }

    fn remaining_budget(&self) -> (u32, u32) {
        let (used_cpu, used_mem) = self.used_budget();
        (
            self.config.cpu_budget_millis.saturating_sub(used_cpu),
            self.config.memory_budget_mb.saturating_sub(used_mem),
        )
    }

    /// One iteration of the spec §4.6 loop body: heartbeat, select a
    /// candidate, try to acquire it, renew every lease currently held.
    pub async fn tick(&self) -> Result<(), LeaseManagerError> {
        let (used_cpu, used_mem) = self.used_budget();
        let cpu_usage = used_cpu as f64 / self.config.cpu_budget_millis.max(1) as f64;
        let mem_usage = used_mem as f64 / self.config.memory_budget_mb.max(1) as f64;
        self.store
            .worker_heartbeat(&self.worker_id, cpu_usage, mem_usage)
            .await?;

        let filter = ListFilter {
            limit: 10_000,
            ..Default::default()
        };
        let page = self.store.list_workflows(filter).await?;

        let (remaining_cpu, remaining_mem) = self.remaining_budget();
        let candidate = select_candidate(
            &page.items,
            &self.worker_id,
            &self.workspace_ids,
            remaining_cpu,
            remaining_mem,
        );

        if let Some(candidate_id) = candidate {
            let acquired = self
                .store
                .acquire_lease(candidate_id, &self.worker_id, self.config.lease_ttl)
                .await?;
            if acquired {
                if let Some(workflow) = page.items.iter().find(|w| w.id == candidate_id) {
                    self.held.lock().insert(candidate_id, workflow.resources);
                }
                info!(workflow_id = %candidate_id, worker_id = %self.worker_id, "lease acquired");
                let _ = self.events.send(LeaseEvent::Start(candidate_id)).await;
            }
        }

        let held_ids: Vec<Uuid> = self.held.lock().keys().copied().collect();
        for workflow_id in held_ids {
            let renewed = self
                .store
                .renew_lease(workflow_id, &self.worker_id, self.config.lease_ttl)
                .await?;
            if !renewed {
                warn!(workflow_id = %workflow_id, worker_id = %self.worker_id, "lease renewal failed, lost ownership");
                self.held.lock().remove(&workflow_id);
                let _ = self.events.send(LeaseEvent::Stop(workflow_id)).await;
            } else {
                debug!(workflow_id = %workflow_id, "lease renewed");
            }
        }

        Ok(())
    }

    /// Voluntary release under budget pressure, or on graceful
    /// shutdown (spec §4.6 "a worker may also voluntarily release a
    /// lease").
    pub async fn release(&self, workflow_id: Uuid) -> Result<(), LeaseManagerError> {
        self.store
            .release_lease(workflow_id, &self.worker_id)
            .await?;
        self.held.lock().remove(&workflow_id);
        let _ = self.events.send(LeaseEvent::Stop(workflow_id)).await;
        Ok(())
    }

    /// Runs the heartbeat loop until `cancel` fires, releasing every
    /// held lease before returning (spec §5 "two-phase shutdown").
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(worker_id = %self.worker_id, error = %err, "lease manager tick failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!(worker_id = %self.worker_id, "lease manager shutting down, releasing held leases");
                    let held_ids: Vec<Uuid> = self.held.lock().keys().copied().collect();
                    for workflow_id in held_ids {
                        if let Err(err) = self.release(workflow_id).await {
                            warn!(workflow_id = %workflow_id, error = %err, "failed to release lease on shutdown");
                        }
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_store::InMemoryMetadataStore;
    use hermod_types::{DlqPolicy, Workflow, WorkflowStatus};

    fn workflow(resources: ResourceRequest) -> Workflow {
        let now = chrono::Utc::now();
        Workflow {
            id: Uuid::new_v4(),
            name: "wf".into(),
            vhost: "/".into(),
            workspace_id: None,
            active: true,
            status: WorkflowStatus::Stopped,
            nodes: vec![],
            edges: vec![],
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
            reconnect_interval: Duration::from_secs(5),
            dlq: DlqPolicy::default(),
            dry_run: false,
            schema_type: None,
            schema: None,
            cron: None,
            idle_timeout: Duration::from_secs(60),
            tier: "standard".into(),
            trace_sample_rate: 1.0,
            resources,
            owner_id: None,
            lease_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn config() -> LeaseManagerConfig {
        LeaseManagerConfig {
            heartbeat_interval: Duration::from_millis(50),
            lease_ttl: ChronoDuration::milliseconds(500),
            cpu_budget_millis: 1000,
            memory_budget_mb: 1000,
        }
    }

    #[test]
    fn rejects_ttl_shorter_than_three_heartbeats() {
        let bad = LeaseManagerConfig {
            lease_ttl: ChronoDuration::milliseconds(10),
            ..config()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn tick_acquires_and_renews_a_lease() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf = workflow(ResourceRequest::default());
        store.create_workflow(wf.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let manager =
            LeaseManager::new(store.clone(), "worker-1", vec![], config(), tx).unwrap();

        manager.tick().await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event, LeaseEvent::Start(wf.id));

        manager.tick().await.unwrap();
        let got = store.get_workflow(wf.id).await.unwrap();
        assert_eq!(got.owner_id.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn release_sends_stop_event_and_frees_budget() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let wf = workflow(ResourceRequest::default());
        store.create_workflow(wf.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let manager =
            LeaseManager::new(store.clone(), "worker-1", vec![], config(), tx).unwrap();

        manager.tick().await.unwrap();
        let _ = rx.recv().await.unwrap();

        manager.release(wf.id).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event, LeaseEvent::Stop(wf.id));
        assert_eq!(manager.remaining_budget(), (1000, 1000));
    }

    #[tokio::test]
    async fn skips_candidate_that_exceeds_remaining_budget() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let mut wf = workflow(ResourceRequest::default());
        wf.resources.cpu_millis = 5000;
        store.create_workflow(wf.clone()).await.unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let manager =
            LeaseManager::new(store.clone(), "worker-1", vec![], config(), tx).unwrap();

        manager.tick().await.unwrap();
        let got = store.get_workflow(wf.id).await.unwrap();
        assert_eq!(got.owner_id, None);
    }
}
