//! Statement builders for the relational engines.
//!
//! Builders only accept [`SafeIdentifier`]s and never see values: every value
//! is bound through a placeholder in the engine's style.

use crate::core::{ColumnType, EngineKind, IdRetrieval};

use super::SafeIdentifier;

/// A sanitized column with its inferred type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeColumn {
    /// Column name.
    pub name: SafeIdentifier,
    /// Column type.
    pub column_type: ColumnType,
}

/// `CREATE TABLE` for a planned layout.
pub fn create_table(relation: &SafeIdentifier, columns: &[SafeColumn]) -> String {
    let dialect = relation.engine().dialect();
    let definitions: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", c.name.quoted(), dialect.column_type(c.column_type)))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        relation.quoted(),
        definitions.join(", ")
    )
}

/// Parameterized `INSERT`, returning the key where the engine supports it.
pub fn insert(relation: &SafeIdentifier, key: &SafeIdentifier, columns: &[SafeIdentifier]) -> String {
    let dialect = relation.engine().dialect();

    let mut sql = if columns.is_empty() {
        match dialect.engine {
            EngineKind::MySql => format!("INSERT INTO {} () VALUES ()", relation.quoted()),
            _ => format!("INSERT INTO {} DEFAULT VALUES", relation.quoted()),
        }
    } else {
        let names: Vec<String> = columns.iter().map(SafeIdentifier::quoted).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| dialect.placeholder(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            relation.quoted(),
            names.join(", "),
            placeholders.join(", ")
        )
    };

    if dialect.id_retrieval == IdRetrieval::Returning {
        sql.push_str(" RETURNING ");
        sql.push_str(&key.quoted());
    }
    sql
}

/// `SELECT` of the first row matching every filter column.
pub fn select_one(relation: &SafeIdentifier, filter: &[SafeIdentifier]) -> String {
    let dialect = relation.engine().dialect();
    let conditions: Vec<String> = filter
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = {}", column.quoted(), dialect.placeholder(i + 1)))
        .collect();
    format!(
        "SELECT * FROM {} WHERE {} LIMIT 1",
        relation.quoted(),
        conditions.join(" AND ")
    )
}

/// `UPDATE` of one field, keyed by the primary key.
pub fn update_by_key(relation: &SafeIdentifier, field: &SafeIdentifier, key: &SafeIdentifier) -> String {
    let dialect = relation.engine().dialect();
    format!(
        "UPDATE {} SET {} = {} WHERE {} = {}",
        relation.quoted(),
        field.quoted(),
        dialect.placeholder(1),
        key.quoted(),
        dialect.placeholder(2)
    )
}

/// Catalog query that yields a row when the relation named by parameter 1 exists.
pub fn exists_probe(engine: EngineKind) -> &'static str {
    match engine {
        EngineKind::Postgres => {
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name::text = $1"
        }
        EngineKind::MySql => {
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?"
        }
        EngineKind::Sqlite => "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        EngineKind::MongoDb => "",
    }
}
