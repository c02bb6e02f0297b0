//! Core types for the persistence layer.
//!
//! - [`FieldValue`] - A scalar value stored in one field
//! - [`Record`] - An ordered mapping from field names to values
//! - [`RecordId`] - The identifier an engine assigned to a stored record
//! - [`RecordRef`] - Either a known identifier or a filter locating a record
//!
//! # Examples
//!
//! ```
//! use formgate_persistence::types::{FieldValue, Record};
//! use serde_json::json;
//!
//! let record = Record::try_from(json!({"age": 30, "active": true, "name": "Ann"})).unwrap();
//!
//! assert_eq!(record.get("age"), Some(&FieldValue::Integer(30)));
//! assert_eq!(record.keys().collect::<Vec<_>>(), vec!["age", "active", "name"]);
//! ```

mod record;
mod value;

pub use record::{CONFIRM_PASSWORD_FIELD, Record, RecordId, RecordRef};
pub use value::FieldValue;
