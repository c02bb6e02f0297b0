//! PostgreSQL engine driver.

use async_trait::async_trait;
use postgres_types::{ToSql, Type};
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, warn};

use crate::config::StoreSettings;
use crate::core::{BoundField, EngineDriver, EngineKind};
use crate::error::{ConnectionError, ProvisionError, StoreError, StoreResult};
use crate::schema::{SafeColumn, SafeIdentifier, sql};
use crate::tenant::ConnectionTarget;
use crate::types::{FieldValue, Record, RecordId};

const DEFAULT_PORT: u16 = 5432;

/// Largest integer magnitude an `f64` represents exactly.
const F64_EXACT: i64 = 1 << 53;

/// Largest integer magnitude an `f32` represents exactly.
const F32_EXACT: i64 = 1 << 24;

type Param = Box<dyn ToSql + Sync + Send>;

/// A session with one PostgreSQL database.
pub struct PostgresDriver {
    client: Client,
    connection: JoinHandle<()>,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

impl PostgresDriver {
    /// Opens a session to the database named by the tenant's connection target.
    pub async fn connect(
        target: &ConnectionTarget,
        settings: &StoreSettings,
    ) -> Result<Self, ConnectionError> {
        let mut config = client_config(target)?;
        config.connect_timeout(settings.connect_timeout);

        let (client, connection) = config.connect(NoTls).await.map_err(connect_error)?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection error");
            }
        });

        client
            .batch_execute(&format!(
                "SET statement_timeout = {}",
                settings.statement_timeout.as_millis()
            ))
            .await
            .map_err(connect_error)?;

        debug!("Opened PostgreSQL session");
        Ok(Self { client, connection })
    }

    /// Prepares `statement` and binds `values` against the reported parameter types.
    async fn bind(
        &self,
        statement: &str,
        values: &[(&SafeIdentifier, &FieldValue)],
    ) -> StoreResult<(tokio_postgres::Statement, Vec<Param>)> {
        let prepared = self.client.prepare(statement).await?;
        let params = prepared
            .params()
            .iter()
            .zip(values)
            .map(|(ty, (column, value))| coerce(column, value, ty))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((prepared, params))
    }
}

fn client_config(target: &ConnectionTarget) -> Result<Config, ConnectionError> {
    match target {
        ConnectionTarget::Parameters(params) => {
            let mut config = Config::new();
            config
                .host(&params.host)
                .port(params.port.unwrap_or(DEFAULT_PORT))
                .dbname(&params.database_name);
            if !params.user.is_empty() {
                config.user(&params.user);
            }
            if let Some(password) = &params.password {
                config.password(password);
            }
            Ok(config)
        }
        ConnectionTarget::ConnectionString { connection_string } => connection_string
            .parse::<Config>()
            .map_err(|e| ConnectionError::parse_failed(EngineKind::Postgres, e.to_string())),
    }
}

fn connect_error(err: tokio_postgres::Error) -> ConnectionError {
    let auth = err.code().is_some_and(|code| {
        *code == SqlState::INVALID_PASSWORD || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
    });
    if auth {
        let message = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        return ConnectionError::AuthFailed {
            engine: EngineKind::Postgres,
            message,
        };
    }
    ConnectionError::unreachable(EngineKind::Postgres, err)
}

fn param_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl EngineDriver for PostgresDriver {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn exists(&mut self, relation: &SafeIdentifier) -> StoreResult<bool> {
        let row = self
            .client
            .query_opt(sql::exists_probe(EngineKind::Postgres), &[&relation.as_str()])
            .await?;
        Ok(row.is_some())
    }

    async fn create(
        &mut self,
        relation: &SafeIdentifier,
        columns: &[SafeColumn],
    ) -> Result<(), ProvisionError> {
        let statement = sql::create_table(relation, columns);
        debug!(sql = %statement, "Creating relation");

        match self.client.batch_execute(&statement).await {
            Ok(()) => Ok(()),
            // Racing creators collide on the table name or on its row type.
            Err(e)
                if e.code() == Some(&SqlState::DUPLICATE_TABLE)
                    || e.code() == Some(&SqlState::UNIQUE_VIOLATION) =>
            {
                Err(ProvisionError::Conflict {
                    relation: relation.to_string(),
                })
            }
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
        let values: Vec<_> = fields.iter().map(|(c, v)| (c, v)).collect();

        let (prepared, params) = self.bind(&statement, &values).await?;
        let row = self.client.query_one(&prepared, &param_refs(&params)).await?;
        read_key(&row, key)
    }

    async fn find(
        &mut self,
        relation: &SafeIdentifier,
        filter: &[BoundField],
    ) -> StoreResult<Option<Record>> {
        let columns: Vec<SafeIdentifier> = filter.iter().map(|(c, _)| c.clone()).collect();
        let statement = sql::select_one(relation, &columns);
        let values: Vec<_> = filter.iter().map(|(c, v)| (c, v)).collect();

        let (prepared, params) = self.bind(&statement, &values).await?;
        let row = self.client.query_opt(&prepared, &param_refs(&params)).await?;
        row.as_ref().map(read_record).transpose()
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
        let id = id.to_value();

        let (prepared, params) = self.bind(&statement, &[(field, value), (key, &id)]).await?;
        let changed = self.client.execute(&prepared, &param_refs(&params)).await?;
        Ok(changed == 1)
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        let PostgresDriver { client, connection } = *self;
        drop(client);
        connection
            .await
            .map_err(|e| StoreError::engine_rejected(EngineKind::Postgres, e))
    }
}

/// Binds `value` to a parameter of type `ty`, converting only without loss.
fn coerce(column: &SafeIdentifier, value: &FieldValue, ty: &Type) -> StoreResult<Param> {
    let mismatch = || StoreError::TypeMismatch {
        column: column.to_string(),
        expected: ty.name().to_string(),
    };
    let null = value.is_null();

    let param: Param = if *ty == Type::INT8 {
        Box::new(if null { None } else { Some(whole(value).ok_or_else(mismatch)?) })
    } else if *ty == Type::INT4 {
        let v = if null { None } else { Some(narrow::<i32>(value).ok_or_else(mismatch)?) };
        Box::new(v)
    } else if *ty == Type::INT2 {
        let v = if null { None } else { Some(narrow::<i16>(value).ok_or_else(mismatch)?) };
        Box::new(v)
    } else if *ty == Type::FLOAT8 {
        Box::new(if null { None } else { Some(double(value).ok_or_else(mismatch)?) })
    } else if *ty == Type::FLOAT4 {
        Box::new(if null { None } else { Some(single(value).ok_or_else(mismatch)?) })
    } else if *ty == Type::BOOL {
        Box::new(if null { None } else { Some(value.as_bool().ok_or_else(mismatch)?) })
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        Box::new((!null).then(|| value.to_string()))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        Box::new((!null).then(|| value.to_json()))
    } else {
        return Err(mismatch());
    };
    Ok(param)
}

fn whole(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Integer(i) => Some(*i),
        FieldValue::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
        _ => None,
    }
}

fn narrow<T: TryFrom<i64>>(value: &FieldValue) -> Option<T> {
    whole(value).and_then(|i| T::try_from(i).ok())
}

fn double(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Float(f) => Some(*f),
        FieldValue::Integer(i) if i.unsigned_abs() <= F64_EXACT.unsigned_abs() => Some(*i as f64),
        _ => None,
    }
}

fn single(value: &FieldValue) -> Option<f32> {
    match value {
        FieldValue::Float(f) if f64::from(*f as f32) == *f => Some(*f as f32),
        FieldValue::Integer(i) if i.unsigned_abs() <= F32_EXACT.unsigned_abs() => Some(*i as f32),
        _ => None,
    }
}

fn read_key(row: &Row, key: &SafeIdentifier) -> StoreResult<RecordId> {
    let id = match row.columns().first().map(|c| c.type_().clone()) {
        Some(Type::INT8) => row.try_get::<_, i64>(0)?,
        Some(Type::INT4) => i64::from(row.try_get::<_, i32>(0)?),
        Some(Type::INT2) => i64::from(row.try_get::<_, i16>(0)?),
        _ => {
            return Err(StoreError::TypeMismatch {
                column: key.to_string(),
                expected: "integer key".to_string(),
            });
        }
    };
    Ok(RecordId::Key(id))
}

fn read_record(row: &Row) -> StoreResult<Record> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value: FieldValue = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(i)?.into()
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(i)?.into()
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(i)?.into()
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(i)?.map(i64::from).into()
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(i)?.into()
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(i)?.map(f64::from).into()
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            row.try_get::<_, Option<serde_json::Value>>(i)?
                .map(|v| FieldValue::Text(v.to_string()))
                .unwrap_or(FieldValue::Null)
        } else if let Ok(text) = row.try_get::<_, Option<String>>(i) {
            text.into()
        } else {
            debug!(column = column.name(), ty = %ty, "Skipping column of unsupported type");
            continue;
        };
        record.insert(column.name(), value);
    }
    Ok(record)
}
