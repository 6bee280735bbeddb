//! Workflow instance executor: the DAG runtime driving a single
//! workflow's sources/transformers/sinks/conditions/approvals (spec
//! §4.4, capability C5).

pub mod behavior;
pub mod error;
pub mod instance;
pub mod sampler;

pub use behavior::{Condition, Identity, Transformer};
pub use error::RuntimeError;
pub use instance::{Instance, InstanceConfig, NodeBindings};
pub use sampler::should_trace;
