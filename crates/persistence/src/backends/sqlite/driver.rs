//! SQLite engine driver.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::config::StoreSettings;
use crate::core::{BoundField, EngineDriver, EngineKind};
use crate::error::{ConnectionError, ProvisionError, StoreResult};
use crate::schema::{SafeColumn, SafeIdentifier, sql};
use crate::tenant::ConnectionTarget;
use crate::types::{FieldValue, Record, RecordId};

/// A connection to one SQLite database file.
pub struct SqliteDriver {
    conn: Connection,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteDriver {
    /// Opens the database file named by the tenant's connection target.
    pub fn connect(
        target: &ConnectionTarget,
        settings: &StoreSettings,
    ) -> Result<Self, ConnectionError> {
        let path = match target {
            ConnectionTarget::Parameters(params) => params.database_name.trim().to_string(),
            ConnectionTarget::ConnectionString { connection_string } => {
                database_path(connection_string)?
            }
        };
        Self::open(&path, settings.sqlite_busy_timeout)
    }

    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: &str, busy_timeout: Duration) -> Result<Self, ConnectionError> {
        let conn = Connection::open(path)
            .map_err(|e| ConnectionError::unreachable(EngineKind::Sqlite, e))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| ConnectionError::unreachable(EngineKind::Sqlite, e))?;

        debug!(path = %path, "Opened SQLite database");
        Ok(Self { conn })
    }

    /// Declared column types of `relation`, keyed by column name.
    fn declared_types(&self, relation: &SafeIdentifier) -> StoreResult<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let rows = stmt.query_map([relation.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }
}

/// Extracts the file path from a SQLite connection string.
fn database_path(connection_string: &str) -> Result<String, ConnectionError> {
    let path = connection_string
        .strip_prefix("sqlite://")
        .or_else(|| connection_string.strip_prefix("sqlite:"))
        .unwrap_or(connection_string)
        .trim();

    if path.is_empty() {
        return Err(ConnectionError::parse_failed(
            EngineKind::Sqlite,
            "connection string names no database file",
        ));
    }
    Ok(path.to_string())
}

#[async_trait]
impl EngineDriver for SqliteDriver {
    fn engine(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    async fn exists(&mut self, relation: &SafeIdentifier) -> StoreResult<bool> {
        let found = self
            .conn
            .query_row(
                sql::exists_probe(EngineKind::Sqlite),
                [relation.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn create(
        &mut self,
        relation: &SafeIdentifier,
        columns: &[SafeColumn],
    ) -> Result<(), ProvisionError> {
        let statement = sql::create_table(relation, columns);
        debug!(sql = %statement, "Creating relation");

        match self.conn.execute(&statement, []) {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => Err(ProvisionError::Conflict {
                relation: relation.to_string(),
            }),
            Err(e) => Err(ProvisionError::rejected(relation.as_str(), e)),
        }
    }

    async fn insert(
        &mut self,
        relation: &SafeIdentifier,
        key: &SafeIdentifier,
        fields: &[BoundField],
    ) -> StoreResult<RecordId> {
        let columns: Vec<SafeIdentifier> = fields.iter().map(|(c, _)| c.clone()).collect();
        let statement = sql::insert(relation, key, &columns);

        self.conn
            .execute(&statement, params_from_iter(fields.iter().map(|(_, v)| v)))?;
        Ok(RecordId::Key(self.conn.last_insert_rowid()))
    }

    async fn find(
        &mut self,
        relation: &SafeIdentifier,
        filter: &[BoundField],
    ) -> StoreResult<Option<Record>> {
        let declared = self.declared_types(relation)?;
        let columns: Vec<SafeIdentifier> = filter.iter().map(|(c, _)| c.clone()).collect();
        let statement = sql::select_one(relation, &columns);

        let mut stmt = self.conn.prepare(&statement)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(filter.iter().map(|(_, v)| v)))?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut record = Record::new();
        for (i, name) in names.iter().enumerate() {
            let boolean = declared
                .get(name)
                .is_some_and(|t| t.eq_ignore_ascii_case("BOOLEAN"));
            record.insert(name.clone(), read_value(row.get_ref(i)?, boolean));
        }
        Ok(Some(record))
    }

    async fn update(
        &mut self,
        relation: &SafeIdentifier,
        key: &SafeIdentifier,
        id: &RecordId,
        field: &SafeIdentifier,
        value: &FieldValue,
    ) -> StoreResult<bool> {
        let statement = sql::update_by_key(relation, field, key);
        let changed = self.conn.execute(&statement, params![value, id.to_value()])?;
        Ok(changed == 1)
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            FieldValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            FieldValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Converts a column value, restoring booleans from `BOOLEAN` columns.
fn read_value(value: ValueRef<'_>, boolean: bool) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(i) if boolean => FieldValue::Bool(i != 0),
        ValueRef::Integer(i) => FieldValue::Integer(i),
        ValueRef::Real(f) => FieldValue::Float(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            FieldValue::Text(String::from_utf8_lossy(t).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnType;
    use crate::schema::sanitize;
    use tempfile::TempDir;

    fn id(name: &str) -> SafeIdentifier {
        sanitize(name, EngineKind::Sqlite).unwrap()
    }

    fn open(dir: &TempDir) -> SqliteDriver {
        let path = dir.path().join("tenant.db");
        SqliteDriver::open(path.to_str().unwrap(), Duration::from_secs(1)).unwrap()
    }

    fn columns() -> Vec<SafeColumn> {
        vec![
            SafeColumn {
                name: id("id"),
                column_type: ColumnType::AutoIncrementKey,
            },
            SafeColumn {
                name: id("name"),
                column_type: ColumnType::Text,
            },
            SafeColumn {
                name: id("active"),
                column_type: ColumnType::Boolean,
            },
        ]
    }

    #[test]
    fn test_database_path() {
        assert_eq!(database_path("sqlite:///var/data/a.db").unwrap(), "/var/data/a.db");
        assert_eq!(database_path("sqlite://a.db").unwrap(), "a.db");
        assert_eq!(database_path("a.db").unwrap(), "a.db");
        assert!(database_path("sqlite://").is_err());
    }

    #[tokio::test]
    async fn test_create_insert_find_update() {
        let dir = TempDir::new().unwrap();
        let mut driver = open(&dir);
        let relation = id("signups");

        assert!(!driver.exists(&relation).await.unwrap());
        driver.create(&relation, &columns()).await.unwrap();
        assert!(driver.exists(&relation).await.unwrap());

        let fields = vec![
            (id("name"), FieldValue::from("Ann")),
            (id("active"), FieldValue::Bool(true)),
        ];
        let first = driver.insert(&relation, &id("id"), &fields).await.unwrap();
        let second = driver.insert(&relation, &id("id"), &fields).await.unwrap();
        assert_eq!(first, RecordId::Key(1));
        assert_eq!(second, RecordId::Key(2));

        let found = driver
            .find(&relation, &[(id("name"), FieldValue::from("Ann"))])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("id"), Some(&FieldValue::Integer(1)));
        assert_eq!(found.get("active"), Some(&FieldValue::Bool(true)));

        let updated = driver
            .update(&relation, &id("id"), &second, &id("name"), &FieldValue::from("Bob"))
            .await
            .unwrap();
        assert!(updated);

        let missing = driver
            .update(&relation, &id("id"), &RecordId::Key(99), &id("name"), &FieldValue::from("Cy"))
            .await
            .unwrap();
        assert!(!missing);

        Box::new(driver).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_create_is_conflict() {
        let dir = TempDir::new().unwrap();
        let mut driver = open(&dir);
        let relation = id("signups");

        driver.create(&relation, &columns()).await.unwrap();
        let err = driver.create(&relation, &columns()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Conflict { relation } if relation == "signups"));
    }

    #[tokio::test]
    async fn test_find_no_match() {
        let dir = TempDir::new().unwrap();
        let mut driver = open(&dir);
        let relation = id("signups");
        driver.create(&relation, &columns()).await.unwrap();

        let found = driver
            .find(&relation, &[(id("name"), FieldValue::from("nobody"))])
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
