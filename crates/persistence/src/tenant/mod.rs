//! Tenant storage targets.
//!
//! Every tenant (company) stores its submissions in a database it owns. The
//! persistence layer never shares connections or schema between tenants: each
//! operation receives the tenant's [`TenantConfig`] and opens a fresh session
//! to exactly that database.
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque tenant identifier
//! - [`TenantConfig`] - Engine, connection settings and relation names of one tenant
//! - [`ConnectionTarget`] - Parameters or connection-string mode
//!
//! # Configuration Format
//!
//! | Field | Required | Description |
//! |-------|----------|-------------|
//! | `tenant_id` | yes | Tenant identifier |
//! | `engine` | yes | `mongodb`, `postgresql`, `mysql` or `sqlite` |
//! | `connection_mode` | yes | `parameters` or `connection_string` |
//! | `connection_string` | string mode | Engine URL or DSN |
//! | `host`, `port`, `database_name`, `user`, `password` | parameters mode | Discrete settings |
//! | `target_relation` | yes | Table or collection for submissions |
//! | `user_relation_name` | no | Table or collection for credential lookups |
//! | `user_primary_key_name` | no | Primary key column, default `id` |

mod config;
mod id;

pub use config::{ConnectionParameters, ConnectionTarget, DEFAULT_PRIMARY_KEY, TenantConfig};
pub use id::TenantId;
