//! Tenant storage configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::TenantId;
use crate::core::EngineKind;
use crate::error::ConnectionError;

/// Default name of the primary key column in user relations.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

/// Where and how to reach one tenant's database.
///
/// The connection mode is a tagged enum flattened into the config, so a
/// parameters-mode config cannot carry a connection string and vice versa.
///
/// # Examples
///
/// ```
/// use formgate_persistence::tenant::{ConnectionTarget, TenantConfig};
/// use formgate_persistence::EngineKind;
///
/// let config: TenantConfig = serde_json::from_str(r#"{
///     "tenant_id": "acme",
///     "engine": "postgresql",
///     "connection_mode": "parameters",
///     "host": "db.acme.internal",
///     "port": 5432,
///     "database_name": "forms",
///     "user": "formgate",
///     "password": "s3cret",
///     "target_relation": "signups",
///     "user_relation_name": "users"
/// }"#).unwrap();
///
/// assert_eq!(config.engine, EngineKind::Postgres);
/// assert_eq!(config.user_relation(), "users");
/// assert_eq!(config.user_primary_key_name, "id");
/// assert!(matches!(config.target, ConnectionTarget::Parameters(_)));
/// assert!(!format!("{:?}", config).contains("s3cret"));
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Tenant the configuration belongs to.
    pub tenant_id: TenantId,

    /// Storage engine.
    pub engine: EngineKind,

    /// Connection mode and its settings.
    #[serde(flatten)]
    pub target: ConnectionTarget,

    /// Table or collection that submissions are stored in.
    pub target_relation: String,

    /// Table or collection used for credential lookups.
    #[serde(default)]
    pub user_relation_name: Option<String>,

    /// Primary key column of the user relation.
    #[serde(default = "default_primary_key")]
    pub user_primary_key_name: String,
}

/// Connection settings, tagged by `connection_mode`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "connection_mode", rename_all = "snake_case")]
pub enum ConnectionTarget {
    /// Discrete host, port and credential parameters.
    Parameters(ConnectionParameters),
    /// An opaque, engine-specific connection string.
    ConnectionString {
        /// The connection string or URL.
        connection_string: String,
    },
}

/// Discrete connection parameters.
///
/// For SQLite only `database_name` is used, as the path of the database file.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    /// Server host name or address.
    #[serde(default)]
    pub host: String,

    /// Server port; the engine's default when absent.
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name, or the file path for SQLite.
    pub database_name: String,

    /// Login user.
    #[serde(default)]
    pub user: String,

    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
}

impl TenantConfig {
    /// Creates a parameters-mode configuration.
    pub fn with_parameters(
        tenant_id: impl Into<TenantId>,
        engine: EngineKind,
        parameters: ConnectionParameters,
        target_relation: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            engine,
            target: ConnectionTarget::Parameters(parameters),
            target_relation: target_relation.into(),
            user_relation_name: None,
            user_primary_key_name: default_primary_key(),
        }
    }

    /// Creates a connection-string configuration.
    pub fn with_connection_string(
        tenant_id: impl Into<TenantId>,
        engine: EngineKind,
        connection_string: impl Into<String>,
        target_relation: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            engine,
            target: ConnectionTarget::ConnectionString {
                connection_string: connection_string.into(),
            },
            target_relation: target_relation.into(),
            user_relation_name: None,
            user_primary_key_name: default_primary_key(),
        }
    }

    /// Creates a configuration for a SQLite database file.
    pub fn sqlite(
        tenant_id: impl Into<TenantId>,
        path: impl Into<String>,
        target_relation: impl Into<String>,
    ) -> Self {
        Self::with_parameters(
            tenant_id,
            EngineKind::Sqlite,
            ConnectionParameters {
                database_name: path.into(),
                ..Default::default()
            },
            target_relation,
        )
    }

    /// Sets the relation used for credential lookups.
    pub fn with_user_relation(mut self, name: impl Into<String>) -> Self {
        self.user_relation_name = Some(name.into());
        self
    }

    /// Sets the primary key column of the user relation.
    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        self.user_primary_key_name = name.into();
        self
    }

    /// The relation credential lookups and updates run against.
    ///
    /// Falls back to the target relation when no user relation is set.
    pub fn user_relation(&self) -> &str {
        self.user_relation_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.target_relation)
    }

    /// Checks that the settings required by the engine are present.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        let missing = |what: &str| ConnectionError::parse_failed(self.engine, format!("{what} is required"));

        match &self.target {
            ConnectionTarget::ConnectionString { connection_string } => {
                if connection_string.trim().is_empty() {
                    return Err(missing("connection_string"));
                }
            }
            ConnectionTarget::Parameters(params) => {
                if params.database_name.trim().is_empty() {
                    return Err(missing("database_name"));
                }
                if self.engine != EngineKind::Sqlite && params.host.trim().is_empty() {
                    return Err(missing("host"));
                }
            }
        }

        if self.target_relation.trim().is_empty() {
            return Err(missing("target_relation"));
        }
        if self.user_primary_key_name.trim().is_empty() {
            return Err(missing("user_primary_key_name"));
        }
        Ok(())
    }
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("tenant_id", &self.tenant_id)
            .field("engine", &self.engine)
            .field("target", &self.target)
            .field("target_relation", &self.target_relation)
            .field("user_relation_name", &self.user_relation_name)
            .field("user_primary_key_name", &self.user_primary_key_name)
            .finish()
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Parameters(params) => {
                f.debug_tuple("Parameters").field(params).finish()
            }
            // Connection strings usually embed credentials
            ConnectionTarget::ConnectionString { .. } => f
                .debug_struct("ConnectionString")
                .field("connection_string", &"<redacted>")
                .finish(),
        }
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
