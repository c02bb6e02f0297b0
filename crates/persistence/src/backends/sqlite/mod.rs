//! SQLite driver.
//!
//! Tenants point at a database file, either through `database_name` in
//! parameters mode or through a connection string holding the path, with an
//! optional `sqlite://` prefix. The file is created on first use.
//!
//! Each operation opens its own connection, so `:memory:` databases do not
//! survive between operations; use a file.
//!
//! # Example
//!
//! ```no_run
//! use formgate_persistence::tenant::TenantConfig;
//! use formgate_persistence::{RecordStore, StoreSettings};
//! use formgate_persistence::types::Record;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tenant = TenantConfig::sqlite("acme", "./data/acme.db", "signups");
//! let store = RecordStore::new(StoreSettings::default());
//! store.insert(&tenant, Record::new().with("name", "Jo")).await?;
//! # Ok(())
//! # }
//! ```

mod driver;

pub use driver::SqliteDriver;
