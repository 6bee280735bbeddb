//! Candidate selection (spec §4.6 "Candidate selection").
//!
//! No teacher analog — `everruns` has no distributed lease concept.
//! Written directly from the spec's three-tier preference: expired/
//! unset lease first, workspace affinity second, a hashed fair share
//! bounded by the worker's advertised budget third, ties broken by
//! workflow id.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::Utc;
use hermod_types::Workflow;
use uuid::Uuid;

fn fair_share_hash(worker_id: &str, workflow_id: Uuid) -> u64 {
    let mut hasher = DefaultHasher::new();
    worker_id.hash(&mut hasher);
    workflow_id.hash(&mut hasher);
    hasher.finish()
}

/// Picks the next workflow this worker should try to acquire a lease
/// for, or `None` if nothing fits the remaining budget. `workflows`
/// should already be filtered to `active = true`.
pub fn select_candidate(
    workflows: &[Workflow],
    worker_id: &str,
    workspace_ids: &[Uuid],
    remaining_cpu_millis: u32,
    remaining_memory_mb: u32,
) -> Option<Uuid> {
    let now = Utc::now();

    let mut candidates: Vec<&Workflow> = workflows
        .iter()
        .filter(|w| w.active)
        .filter(|w| {
            w.resources.cpu_millis <= remaining_cpu_millis
                && w.resources.memory_mb <= remaining_memory_mb
        })
        .collect();

    candidates.sort_by(|a, b| {
        let a_needs_owner = !a.is_owned_at(now);
        let b_needs_owner = !b.is_owned_at(now);
        // Expired/unset leases sort first.
        b_needs_owner
            .cmp(&a_needs_owner)
            .then_with(|| {
                let a_ws = a.workspace_id.map_or(false, |id| workspace_ids.contains(&id));
                let b_ws = b.workspace_id.map_or(false, |id| workspace_ids.contains(&id));
                b_ws.cmp(&a_ws)
            })
            .then_with(|| {
                fair_share_hash(worker_id, a.id).cmp(&fair_share_hash(worker_id, b.id))
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    candidates.first().map(|w| w.id)
}
