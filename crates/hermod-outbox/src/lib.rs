//! Durable outbox and retry/DLQ pipeline (spec §4.5, capability C6).

pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod publisher;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::OutboxError;
pub use publisher::{Publisher, PublisherConfig, SinkHandle, SinkResolver};
