//! Formgate Persistence Layer
//!
//! This crate stores form submissions in databases owned by the tenants
//! themselves. Every tenant brings its own storage engine, credentials and
//! destination relation; the persistence layer connects on demand, infers a
//! table layout from the first submission of a given shape, creates it if
//! needed, and then reads and writes records through one uniform façade.
//!
//! # Features
//!
//! - **Multiple Engines**: MongoDB, PostgreSQL, MySQL and SQLite
//! - **Schema Inference**: Column types derived from the first record's shape
//! - **Lazy Provisioning**: Relations created on first insert, safe under races
//! - **Injection Safety**: Every identifier passes an allow-list sanitizer, every value is bound
//! - **Credential Hashing**: bcrypt for the password field, with legacy plaintext fallback
//!
//! # Engine Features
//!
//! Enable engines with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! formgate-persistence = { version = "0.1", features = ["postgres", "mongodb"] }
//! ```
//!
//! Available engine features:
//! - `sqlite` (default) - SQLite database files
//! - `postgres` - PostgreSQL via tokio-postgres
//! - `mysql` - MySQL via mysql_async
//! - `mongodb` - MongoDB document storage
//!
//! An engine that is not compiled in is reported as unsupported when a tenant
//! tries to use it.
//!
//! # Architecture
//!
//! - [`tenant`] - Tenant storage configuration
//! - [`types`] - Records, field values and record identifiers
//! - [`schema`] - Identifier sanitizing, schema inference and table provisioning
//! - [`core`] - Engine dialects, the driver trait, connections and the [`RecordStore`]
//! - [`credentials`] - Password hashing and verification
//! - [`backends`] - Engine drivers
//! - [`config`] - Timeouts and hashing settings
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! use formgate_persistence::tenant::TenantConfig;
//! use formgate_persistence::types::Record;
//! use formgate_persistence::{RecordStore, StoreSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tenant = TenantConfig::sqlite("acme", "acme.db", "signups");
//! let store = RecordStore::new(StoreSettings::default());
//!
//! let record = Record::new()
//!     .with("name", "Jo")
//!     .with("email", "jo@x.com")
//!     .with("password", "pw1")
//!     .with("confirm_password", "pw1");
//!
//! let id = store.insert(&tenant, record).await?;
//! let found = store
//!     .find_one(&tenant, &Record::new().with("email", "jo@x.com"))
//!     .await?;
//! assert!(found.is_some());
//! println!("stored as {id}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backends;
pub mod config;
pub mod core;
pub mod credentials;
pub mod error;
pub mod schema;
pub mod tenant;
pub mod types;

pub use config::StoreSettings;
pub use core::{ConnectionHandle, ConnectionProvider, EngineKind, RecordStore};
pub use credentials::CredentialHasher;
pub use error::{StoreError, StoreResult};
