//! Engine abstractions and the record store.
//!
//! This module contains the pieces every operation flows through:
//!
//! - [`EngineKind`] / [`Dialect`] - which engine a tenant uses and how its queries are written
//! - [`EngineDriver`] - one live session, implemented per engine in [`backends`](crate::backends)
//! - [`ConnectionProvider`] / [`ConnectionHandle`] - per-operation sessions
//! - [`RecordStore`] - the insert / lookup / update façade
//!
//! # Operation Flow
//!
//! ```text
//! RecordStore::insert(tenant, record)
//!   ├─ strip confirm_password, hash the credential field
//!   ├─ ConnectionProvider::open(tenant)      → ConnectionHandle
//!   ├─ sanitize relation and field names
//!   ├─ relational engines:
//!   │    SchemaInferencer::infer(record)     → ColumnPlan
//!   │    TableProvisioner::ensure_table(...)
//!   ├─ EngineDriver::insert(...)             → RecordId
//!   └─ ConnectionHandle::close()
//! ```

mod connection;
mod driver;
mod engine;
mod store;

pub use connection::{ConnectionHandle, ConnectionProvider, document_database_name};
pub use driver::{BoundField, EngineDriver};
pub use engine::{ColumnType, Dialect, EngineKind, IdRetrieval, PlaceholderStyle};
pub use store::{DOCUMENT_KEY, RecordStore};
