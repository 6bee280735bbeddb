//! Storage-agnostic metadata store (spec §4.1, capability C1).
//!
//! One capability trait, [`MetadataStore`], satisfiable by a relational
//! backend ([`PostgresMetadataStore`]) or an in-memory double
//! ([`InMemoryMetadataStore`]) used in tests across the other crates.

pub mod dialect;
pub mod error;
pub mod memory;
pub mod migrate;
pub mod postgres;
pub mod retry;
pub mod sensitive;
pub mod traits;

pub use dialect::{rewrite_placeholders, Dialect};
pub use error::{LeaseError, StoreError};
pub use memory::InMemoryMetadataStore;
pub use migrate::{self_migrate, TableDef};
pub use postgres::PostgresMetadataStore;
pub use retry::with_busy_retry;
pub use traits::MetadataStore;
