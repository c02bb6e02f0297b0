//! Storage engines and their dialects.
//!
//! [`EngineKind`] is the closed set of engines a tenant may choose. Each kind
//! has a static [`Dialect`] describing how queries for that engine are
//! written: the identifier quote character, the placeholder style, how a
//! generated key is read back, and the column types used when provisioning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;

/// Identifies the storage engine of a tenant.
///
/// The serialized tags match the values tenants put in their configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// MongoDB (document store).
    #[serde(rename = "mongodb")]
    MongoDb,
    /// PostgreSQL database.
    #[serde(rename = "postgresql", alias = "postgres")]
    Postgres,
    /// MySQL database.
    #[serde(rename = "mysql")]
    MySql,
    /// SQLite database file.
    #[serde(rename = "sqlite")]
    Sqlite,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" => Ok(EngineKind::MongoDb),
            "postgresql" | "postgres" => Ok(EngineKind::Postgres),
            "mysql" => Ok(EngineKind::MySql),
            "sqlite" => Ok(EngineKind::Sqlite),
            _ => Err(ConnectionError::Unsupported {
                engine: s.to_string(),
            }),
        }
    }
}

impl EngineKind {
    /// All engines, in a stable order.
    pub const ALL: [EngineKind; 4] = [
        EngineKind::MongoDb,
        EngineKind::Postgres,
        EngineKind::MySql,
        EngineKind::Sqlite,
    ];

    /// Returns the configuration tag for this engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::MongoDb => "mongodb",
            EngineKind::Postgres => "postgresql",
            EngineKind::MySql => "mysql",
            EngineKind::Sqlite => "sqlite",
        }
    }

    /// Returns true for table-based engines that need provisioning.
    pub fn is_relational(&self) -> bool {
        !matches!(self, EngineKind::MongoDb)
    }

    /// Returns true if the driver for this engine is compiled in.
    pub fn is_enabled(&self) -> bool {
        match self {
            EngineKind::MongoDb => cfg!(feature = "mongodb"),
            EngineKind::Postgres => cfg!(feature = "postgres"),
            EngineKind::MySql => cfg!(feature = "mysql"),
            EngineKind::Sqlite => cfg!(feature = "sqlite"),
        }
    }

    /// Returns the dialect metadata for this engine.
    pub fn dialect(&self) -> &'static Dialect {
        match self {
            EngineKind::MongoDb => &DOCUMENT,
            EngineKind::Postgres => &POSTGRES,
            EngineKind::MySql => &MYSQL,
            EngineKind::Sqlite => &SQLITE,
        }
    }
}

/// How bound parameters are written in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Dollar,
    /// `?` for every parameter.
    QuestionMark,
    /// `?1`, `?2`, ...
    NumberedQuestionMark,
    /// No statement text (document engine).
    None,
}

/// How the engine reports the key of an inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRetrieval {
    /// `INSERT ... RETURNING key`.
    Returning,
    /// The session's last insert id after the statement.
    LastInsertId,
    /// The engine generates a document identifier.
    Generated,
}

/// Column types produced by schema inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Engine-assigned auto-incrementing primary key.
    AutoIncrementKey,
    /// Whole numbers.
    Integer,
    /// Fractional numbers.
    Float,
    /// Booleans.
    Boolean,
    /// Everything else, including null.
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::AutoIncrementKey => "key",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// Query conventions of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// The engine this dialect belongs to.
    pub engine: EngineKind,
    /// Character used to quote identifiers, if any.
    pub quote: Option<char>,
    /// Placeholder style for bound values.
    pub placeholders: PlaceholderStyle,
    /// How generated keys are read back.
    pub id_retrieval: IdRetrieval,
    /// Longest identifier the engine accepts.
    pub max_identifier_len: usize,
}

static POSTGRES: Dialect = Dialect {
    engine: EngineKind::Postgres,
    quote: Some('"'),
    placeholders: PlaceholderStyle::Dollar,
    id_retrieval: IdRetrieval::Returning,
    max_identifier_len: 63,
};

static MYSQL: Dialect = Dialect {
    engine: EngineKind::MySql,
    quote: Some('`'),
    placeholders: PlaceholderStyle::QuestionMark,
    id_retrieval: IdRetrieval::LastInsertId,
    max_identifier_len: 64,
};

static SQLITE: Dialect = Dialect {
    engine: EngineKind::Sqlite,
    quote: Some('"'),
    placeholders: PlaceholderStyle::NumberedQuestionMark,
    id_retrieval: IdRetrieval::LastInsertId,
    max_identifier_len: 128,
};

static DOCUMENT: Dialect = Dialect {
    engine: EngineKind::MongoDb,
    quote: None,
    placeholders: PlaceholderStyle::None,
    id_retrieval: IdRetrieval::Generated,
    max_identifier_len: 120,
};

impl Dialect {
    /// Returns the placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self.placeholders {
            PlaceholderStyle::Dollar => format!("${}", index),
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::NumberedQuestionMark => format!("?{}", index),
            PlaceholderStyle::None => String::new(),
        }
    }

    /// Returns the column definition used for `column_type`.
    pub fn column_type(&self, column_type: ColumnType) -> &'static str {
        match (self.engine, column_type) {
            (EngineKind::Postgres, ColumnType::AutoIncrementKey) => "BIGSERIAL PRIMARY KEY",
            (EngineKind::Postgres, ColumnType::Integer) => "BIGINT",
            (EngineKind::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (EngineKind::MySql, ColumnType::AutoIncrementKey) => {
                "BIGINT AUTO_INCREMENT PRIMARY KEY"
            }
            (EngineKind::MySql, ColumnType::Integer) => "BIGINT",
            (EngineKind::MySql, ColumnType::Float) => "DOUBLE",
            (_, ColumnType::AutoIncrementKey) => "INTEGER PRIMARY KEY AUTOINCREMENT",
            (_, ColumnType::Integer) => "INTEGER",
            (_, ColumnType::Float) => "REAL",
            (_, ColumnType::Boolean) => "BOOLEAN",
            (_, ColumnType::Text) => "TEXT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_tags() {
        for engine in EngineKind::ALL {
            assert_eq!(engine.as_str().parse::<EngineKind>().unwrap(), engine);
        }
        assert_eq!("postgres".parse::<EngineKind>().unwrap(), EngineKind::Postgres);
        assert_eq!(" MySQL ".parse::<EngineKind>().unwrap(), EngineKind::MySql);
    }

    #[test]
    fn test_unknown_engine_is_unsupported() {
        let err = "oracle".parse::<EngineKind>().unwrap_err();
        assert!(matches!(err, ConnectionError::Unsupported { engine } if engine == "oracle"));
    }

    #[test]
    fn test_engine_serde() {
        let engine: EngineKind = serde_json::from_str("\"postgresql\"").unwrap();
        assert_eq!(engine, EngineKind::Postgres);
        assert_eq!(
            serde_json::to_string(&EngineKind::MongoDb).unwrap(),
            "\"mongodb\""
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(EngineKind::Postgres.dialect().placeholder(2), "$2");
        assert_eq!(EngineKind::MySql.dialect().placeholder(2), "?");
        assert_eq!(EngineKind::Sqlite.dialect().placeholder(2), "?2");
    }

    #[test]
    fn test_dialect_metadata() {
        assert_eq!(EngineKind::MySql.dialect().quote, Some('`'));
        assert_eq!(EngineKind::MongoDb.dialect().quote, None);
        assert_eq!(
            EngineKind::Postgres.dialect().id_retrieval,
            IdRetrieval::Returning
        );
        assert!(!EngineKind::MongoDb.is_relational());
        assert!(EngineKind::Sqlite.is_relational());
    }

    #[test]
    fn test_column_types() {
        let pg = EngineKind::Postgres.dialect();
        assert_eq!(pg.column_type(ColumnType::AutoIncrementKey), "BIGSERIAL PRIMARY KEY");
        assert_eq!(pg.column_type(ColumnType::Float), "DOUBLE PRECISION");

        let sqlite = EngineKind::Sqlite.dialect();
        assert_eq!(
            sqlite.column_type(ColumnType::AutoIncrementKey),
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        );
        assert_eq!(sqlite.column_type(ColumnType::Boolean), "BOOLEAN");
    }
}
