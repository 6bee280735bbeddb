//! Process configuration (SPEC_FULL §A.3).
//!
//! Grounded on `everruns_storage::EncryptionService::from_env` /
//! `everruns_core::telemetry::TelemetryConfig::from_env`'s convention:
//! a plain struct populated by `std::env::var` with documented
//! defaults, loaded after `dotenvy::dotenv()` has read a local `.env`.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} is not a valid value: `{raw}`")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct HermodConfig {
    /// Postgres DSN for the metadata store.
    pub database_url: String,
    /// Stable identity this process heartbeats and leases under.
    pub worker_id: String,
    pub workspace_ids: Vec<uuid::Uuid>,

    pub heartbeat_interval: Duration,
    pub lease_ttl: ChronoDuration,
    pub cpu_budget_millis: u32,
    pub memory_budget_mb: u32,

    pub reconcile_interval: Duration,
    pub channel_capacity: usize,
    pub shutdown_grace: Duration,
    pub watchdog_interval: Duration,

    pub publisher_interval: Duration,
    pub publisher_batch_size: u32,
    pub outbox_claim_ttl: ChronoDuration,
    pub reclaim_interval: Duration,
}

impl HermodConfig {
    /// Environment variables (all prefixed `HERMOD_` except the ones
    /// shared with the teacher's own `.env` convention):
    /// - `HERMOD_DATABASE_URL` (required)
    /// - `HERMOD_WORKER_ID` (default: a fresh `Uuid::new_v4()`)
    /// - `HERMOD_WORKSPACE_IDS` (comma-separated UUIDs, default empty)
    /// - `HERMOD_HEARTBEAT_INTERVAL_MS` (default 5000)
    /// - `HERMOD_LEASE_TTL_SECS` (default 30, must be >= 3x heartbeat)
    /// - `HERMOD_CPU_BUDGET_MILLIS` / `HERMOD_MEMORY_BUDGET_MB`
    /// - `HERMOD_RECONCILE_INTERVAL_SECS` (default 10)
    /// - `HERMOD_CHANNEL_CAPACITY` (default 1024)
    /// - `HERMOD_SHUTDOWN_GRACE_SECS` (default 30)
    /// - `HERMOD_WATCHDOG_INTERVAL_SECS` (default 5)
    /// - `HERMOD_PUBLISHER_INTERVAL_MS` (default 1000)
    /// - `HERMOD_PUBLISHER_BATCH_SIZE` (default 50)
    /// - `HERMOD_OUTBOX_CLAIM_TTL_SECS` (default 60)
    /// - `HERMOD_RECLAIM_INTERVAL_SECS` (default 30)
    /// - `HERMOD_MASTER_KEY` is read directly by `hermod_crypto::Vault::from_env`.
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("HERMOD_DATABASE_URL").context("HERMOD_DATABASE_URL must be set")?;

        let worker_id = std::env::var("HERMOD_WORKER_ID")
            .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let workspace_ids = std::env::var("HERMOD_WORKSPACE_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<uuid::Uuid>())
            .collect::<Result<Vec<_>, _>>()
            .context("HERMOD_WORKSPACE_IDS must be a comma-separated list of UUIDs")?;

        let heartbeat_interval_ms: u64 = env_parse("HERMOD_HEARTBEAT_INTERVAL_MS", 5000)?;
        let lease_ttl_secs: i64 = env_parse("HERMOD_LEASE_TTL_SECS", 30)?;

        Ok(Self {
            database_url,
            worker_id,
            workspace_ids,
            heartbeat_interval: Duration::from_millis(heartbeat_interval_ms),
            lease_ttl: ChronoDuration::seconds(lease_ttl_secs),
            cpu_budget_millis: env_parse("HERMOD_CPU_BUDGET_MILLIS", 4000)?,
            memory_budget_mb: env_parse("HERMOD_MEMORY_BUDGET_MB", 4096)?,
            reconcile_interval: Duration::from_secs(env_parse(
                "HERMOD_RECONCILE_INTERVAL_SECS",
                10,
            )?),
            channel_capacity: env_parse("HERMOD_CHANNEL_CAPACITY", 1024)?,
            shutdown_grace: Duration::from_secs(env_parse("HERMOD_SHUTDOWN_GRACE_SECS", 30)?),
            watchdog_interval: Duration::from_secs(env_parse(
                "HERMOD_WATCHDOG_INTERVAL_SECS",
                5,
            )?),
            publisher_interval: Duration::from_millis(env_parse(
                "HERMOD_PUBLISHER_INTERVAL_MS",
                1000,
            )?),
            publisher_batch_size: env_parse("HERMOD_PUBLISHER_BATCH_SIZE", 50)?,
            outbox_claim_ttl: ChronoDuration::seconds(env_parse(
                "HERMOD_OUTBOX_CLAIM_TTL_SECS",
                60,
            )?),
            reclaim_interval: Duration::from_secs(env_parse(
                "HERMOD_RECLAIM_INTERVAL_SECS",
                30,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        assert_eq!(env_or("HERMOD_DOES_NOT_EXIST", "fallback"), "fallback");
    }

    #[test]
    fn env_parse_rejects_malformed_values() {
        std::env::set_var("HERMOD_TEST_BAD_INT", "not-a-number");
        let result: Result<u32> = env_parse("HERMOD_TEST_BAD_INT", 1);
        assert!(result.is_err());
        std::env::remove_var("HERMOD_TEST_BAD_INT");
    }
}
