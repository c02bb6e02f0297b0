//! Engine driver implementations.
//!
//! Each engine implements [`EngineDriver`](crate::core::EngineDriver) and is
//! gated behind a feature flag.
//!
//! # Available Engines
//!
//! | Engine | Feature | Quote | Placeholders | Generated key |
//! |--------|---------|-------|--------------|---------------|
//! | SQLite | `sqlite` | `"` | `?1, ?2` | last insert rowid |
//! | PostgreSQL | `postgres` | `"` | `$1, $2` | `RETURNING` |
//! | MySQL | `mysql` | `` ` `` | `?` | last insert id |
//! | MongoDB | `mongodb` | none | none | ObjectId |

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "mongodb")]
pub mod mongodb;
