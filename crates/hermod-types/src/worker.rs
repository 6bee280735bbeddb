//! Worker entity (spec §3 "Worker").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub token: String,
    pub last_seen: DateTime<Utc>,
    pub cpu_usage: f64,
    pub mem_usage: f64,
}

impl Worker {
    /// spec §3: "A worker is *live* iff `last_seen > now − heartbeat_ttl`".
    pub fn is_live_at(&self, now: DateTime<Utc>, heartbeat_ttl: chrono::Duration) -> bool {
        self.last_seen > now - heartbeat_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(last_seen: DateTime<Utc>) -> Worker {
        Worker {
            id: "w1".into(),
            name: "worker-1".into(),
            host: "localhost".into(),
            port: 9000,
            token: "tok".into(),
            last_seen,
            cpu_usage: 0.1,
            mem_usage: 0.2,
        }
    }

    #[test]
    fn live_within_ttl() {
        let now = Utc::now();
        let w = worker(now - chrono::Duration::seconds(2));
        assert!(w.is_live_at(now, chrono::Duration::seconds(5)));
    }

    #[test]
    fn dead_past_ttl() {
        let now = Utc::now();
        let w = worker(now - chrono::Duration::seconds(10));
        assert!(!w.is_live_at(now, chrono::Duration::seconds(5)));
    }
}
