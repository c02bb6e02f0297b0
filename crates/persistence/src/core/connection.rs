//! Per-operation connections to tenant databases.

use tracing::{debug, warn};

use crate::config::StoreSettings;
use crate::error::{ConnectionError, StoreResult};
use crate::tenant::TenantConfig;

use super::{EngineDriver, EngineKind};

/// One live session, owned by a single store operation.
///
/// Call [`close`](ConnectionHandle::close) when done. A handle that is merely
/// dropped still releases its session, but without waiting for the engine to
/// acknowledge.
pub struct ConnectionHandle {
    driver: Box<dyn EngineDriver>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("engine", &self.driver.engine())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Wraps an already-open driver.
    pub fn new(driver: Box<dyn EngineDriver>) -> Self {
        Self { driver }
    }

    /// The engine of this session.
    pub fn engine(&self) -> EngineKind {
        self.driver.engine()
    }

    /// The driver, for issuing statements.
    pub fn driver(&mut self) -> &mut dyn EngineDriver {
        self.driver.as_mut()
    }

    /// Releases the session.
    pub async fn close(self) -> StoreResult<()> {
        let engine = self.driver.engine();
        let result = self.driver.close().await;
        if let Err(e) = &result {
            warn!(engine = %engine, error = %e, "Closing connection failed");
        }
        result
    }
}

/// Opens sessions to tenant databases.
///
/// Nothing is cached: every call to [`open`](ConnectionProvider::open) starts
/// a new session from the tenant's configuration.
#[derive(Debug, Clone, Default)]
pub struct ConnectionProvider {
    settings: StoreSettings,
}

impl ConnectionProvider {
    /// Creates a provider using the given timeouts.
    pub fn new(settings: StoreSettings) -> Self {
        Self { settings }
    }

    /// The settings sessions are opened with.
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Opens a session to the tenant's configured engine.
    pub async fn open(&self, tenant: &TenantConfig) -> Result<ConnectionHandle, ConnectionError> {
        tenant.validate()?;
        debug!(tenant = %tenant.tenant_id, engine = %tenant.engine, "Opening connection");

        let driver: Box<dyn EngineDriver> = match tenant.engine {
            #[cfg(feature = "sqlite")]
            EngineKind::Sqlite => Box::new(
                crate::backends::sqlite::SqliteDriver::connect(&tenant.target, &self.settings)?,
            ),
            #[cfg(feature = "postgres")]
            EngineKind::Postgres => Box::new(
                crate::backends::postgres::PostgresDriver::connect(&tenant.target, &self.settings)
                    .await?,
            ),
            #[cfg(feature = "mysql")]
            EngineKind::MySql => Box::new(
                crate::backends::mysql::MySqlDriver::connect(&tenant.target, &self.settings)
                    .await?,
            ),
            #[cfg(feature = "mongodb")]
            EngineKind::MongoDb => Box::new(
                crate::backends::mongodb::MongoDriver::connect(&tenant.target, &self.settings)
                    .await?,
            ),
            #[allow(unreachable_patterns)]
            engine => {
                return Err(ConnectionError::Unsupported {
                    engine: engine.to_string(),
                });
            }
        };

        Ok(ConnectionHandle::new(driver))
    }
}

/// Extracts the database name from a document-store connection string.
///
/// The name is the path segment after the host list, up to any query
/// parameters: `mongodb://user:pw@host:27017/forms?authSource=admin` yields
/// `forms`.
///
/// # Examples
///
/// ```
/// use formgate_persistence::core::document_database_name;
///
/// assert_eq!(
///     document_database_name("mongodb+srv://u:p@cluster0.example.net/forms?retryWrites=true").unwrap(),
///     "forms"
/// );
/// assert!(document_database_name("mongodb://localhost:27017").is_err());
/// ```
pub fn document_database_name(connection_string: &str) -> Result<String, ConnectionError> {
    let fail = |message: &str| ConnectionError::parse_failed(EngineKind::MongoDb, message);

    let (_, rest) = connection_string
        .split_once("://")
        .ok_or_else(|| fail("connection string has no scheme"))?;
    let (_, path) = rest
        .split_once('/')
        .ok_or_else(|| fail("connection string names no database"))?;
    let name = path.split('?').next().unwrap_or_default();

    if name.is_empty() {
        return Err(fail("connection string names no database"));
    }
    Ok(name.to_string())
}
