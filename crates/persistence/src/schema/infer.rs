//! Schema inference from a sample record.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::ColumnType;
use crate::tenant::DEFAULT_PRIMARY_KEY;
use crate::types::{CONFIRM_PASSWORD_FIELD, FieldValue, Record};

/// One column of a [`ColumnPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedColumn {
    /// Column name, not yet sanitized.
    pub name: String,
    /// Inferred column type.
    pub column_type: ColumnType,
}

/// Ordered column layout derived from one record.
///
/// The first column is always the auto-incrementing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPlan {
    columns: Vec<PlannedColumn>,
}

impl ColumnPlan {
    /// All columns, key first.
    pub fn columns(&self) -> &[PlannedColumn] {
        &self.columns
    }

    /// The key column.
    pub fn key(&self) -> &PlannedColumn {
        &self.columns[0]
    }

    /// Looks up a column by name.
    pub fn get(&self, name: &str) -> Option<&PlannedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Number of columns, including the key.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; a plan carries at least its key column.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Derives column plans for relational engines.
///
/// # Examples
///
/// ```
/// use formgate_persistence::core::ColumnType;
/// use formgate_persistence::schema::SchemaInferencer;
/// use formgate_persistence::types::Record;
///
/// let record = Record::new().with("age", 30).with("active", true).with("name", "Ann");
/// let plan = SchemaInferencer::default().infer(&record);
///
/// let types: Vec<_> = plan.columns().iter().map(|c| c.column_type).collect();
/// assert_eq!(types, vec![
///     ColumnType::AutoIncrementKey,
///     ColumnType::Integer,
///     ColumnType::Boolean,
///     ColumnType::Text,
/// ]);
/// ```
#[derive(Debug, Clone)]
pub struct SchemaInferencer {
    key_column: String,
}

impl Default for SchemaInferencer {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMARY_KEY)
    }
}

impl SchemaInferencer {
    /// Creates an inferencer that names the key column `key_column`.
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
        }
    }

    /// Infers a plan from `record`.
    ///
    /// `confirm_password` is never planned. A payload field named like the key
    /// column is skipped, since the engine assigns the key.
    pub fn infer(&self, record: &Record) -> ColumnPlan {
        let mut columns = Vec::with_capacity(record.len() + 1);
        columns.push(PlannedColumn {
            name: self.key_column.clone(),
            column_type: ColumnType::AutoIncrementKey,
        });

        for (name, value) in record.iter() {
            if name == CONFIRM_PASSWORD_FIELD {
                continue;
            }
            if name == self.key_column {
                warn!(field = %name, "Ignoring payload field that shadows the key column");
                continue;
            }
            columns.push(PlannedColumn {
                name: name.to_string(),
                column_type: infer_type(value),
            });
        }

        ColumnPlan { columns }
    }
}

/// The column type a value would be stored as.
pub fn infer_type(value: &FieldValue) -> ColumnType {
    match value {
        FieldValue::Integer(_) => ColumnType::Integer,
        FieldValue::Float(_) => ColumnType::Float,
        FieldValue::Bool(_) => ColumnType::Boolean,
        FieldValue::Text(_) | FieldValue::Null => ColumnType::Text,
    }
}
