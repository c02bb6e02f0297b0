//! Identifier safety, schema inference and table provisioning.
//!
//! - [`sanitize`] / [`SafeIdentifier`] - allow-list check for every embedded name
//! - [`SchemaInferencer`] / [`ColumnPlan`] - column layout from a sample record
//! - [`TableProvisioner`] - create-if-absent, tolerant of concurrent creators
//! - [`sql`] - statement builders for the relational engines

mod infer;
mod provision;
mod sanitize;
pub mod sql;

pub use infer::{ColumnPlan, PlannedColumn, SchemaInferencer, infer_type};
pub use provision::{ProvisionOutcome, TableProvisioner};
pub use sanitize::{SafeIdentifier, sanitize};
pub use sql::SafeColumn;
