// Hermod shared data model
//
// Decision: this crate is the source of truth for every entity in the
// metadata store plus the connector capability contracts consumed by the
// runtime and outbox. No storage or networking logic lives here.
// Decision: keep dependencies minimal (serde, uuid, chrono, thiserror).

pub mod audit;
pub mod capability;
pub mod connector;
pub mod error;
pub mod filter;
pub mod message;
pub mod node;
pub mod node_state;
pub mod outbox;
pub mod schema;
pub mod topology;
pub mod trace;
pub mod worker;
pub mod workflow;

pub use audit::{Approval, ApprovalStatus, AuditLogEntry, WebhookRequest, WorkflowVersionSnapshot};
pub use capability::{SinkCapability, SourceCapability};
pub use connector::{Connector, ConnectorType};
pub use error::{ErrorKind, FailureClass};
pub use filter::{ListFilter, Page};
pub use message::{Message, MessagePool, Operation};
pub use node::{Edge, NodeType, WorkflowNode};
pub use node_state::NodeState;
pub use outbox::{OutboxItem, OutboxStatus};
pub use schema::{Schema, SchemaType};
pub use topology::{validate_dag, TopologyError};
pub use trace::TraceStep;
pub use worker::Worker;
pub use workflow::{DlqPolicy, ResourceRequest, Workflow, WorkflowStatus};
