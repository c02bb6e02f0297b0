//! MongoDB engine driver.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::{Client, Collection, Database};
use tracing::debug;

use crate::config::StoreSettings;
use crate::core::{BoundField, DOCUMENT_KEY, EngineDriver, EngineKind, document_database_name};
use crate::error::{ConnectionError, ProvisionError, StoreResult};
use crate::schema::{SafeColumn, SafeIdentifier};
use crate::tenant::ConnectionTarget;
use crate::types::{FieldValue, Record, RecordId};

const DEFAULT_PORT: u16 = 27017;

/// A session with one MongoDB database.
#[derive(Debug)]
pub struct MongoDriver {
    client: Client,
    database: Database,
}

impl MongoDriver {
    /// Opens a session to the database named by the tenant's connection target.
    ///
    /// The server is pinged once so that bad credentials and unreachable
    /// hosts surface here rather than on the first statement.
    pub async fn connect(
        target: &ConnectionTarget,
        settings: &StoreSettings,
    ) -> Result<Self, ConnectionError> {
        let (options, database_name) = client_options(target, settings).await?;

        let client = Client::with_options(options).map_err(connect_error)?;
        let database = client.database(&database_name);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connect_error)?;

        debug!(database = %database_name, "Opened MongoDB session");
        Ok(Self { client, database })
    }

    fn collection(&self, relation: &SafeIdentifier) -> Collection<Document> {
        self.database.collection(relation.as_str())
    }
}

async fn client_options(
    target: &ConnectionTarget,
    settings: &StoreSettings,
) -> Result<(ClientOptions, String), ConnectionError> {
    let (mut options, database_name) = match target {
        ConnectionTarget::Parameters(params) => {
            let mut options = ClientOptions::default();
            options.hosts = vec![ServerAddress::Tcp {
                host: params.host.clone(),
                port: Some(params.port.unwrap_or(DEFAULT_PORT)),
            }];
            if !params.user.is_empty() {
                let mut credential = Credential::default();
                credential.username = Some(params.user.clone());
                credential.password = params.password.clone();
                options.credential = Some(credential);
            }
            (options, params.database_name.clone())
        }
        ConnectionTarget::ConnectionString { connection_string } => {
            let database_name = document_database_name(connection_string)?;
            let options = ClientOptions::parse(connection_string)
                .await
                .map_err(connect_error)?;
            (options, database_name)
        }
    };

    options.connect_timeout.get_or_insert(settings.connect_timeout);
    options
        .server_selection_timeout
        .get_or_insert(settings.connect_timeout);
    Ok((options, database_name))
}

fn connect_error(err: mongodb::error::Error) -> ConnectionError {
    match err.kind.as_ref() {
        ErrorKind::Authentication { message, .. } => ConnectionError::AuthFailed {
            engine: EngineKind::MongoDb,
            message: message.clone(),
        },
        ErrorKind::InvalidArgument { message, .. } => {
            ConnectionError::parse_failed(EngineKind::MongoDb, message.clone())
        }
        _ => ConnectionError::unreachable(EngineKind::MongoDb, err),
    }
}

#[async_trait]
impl EngineDriver for MongoDriver {
    fn engine(&self) -> EngineKind {
        EngineKind::MongoDb
    }

    async fn exists(&mut self, _relation: &SafeIdentifier) -> StoreResult<bool> {
        // An absent collection reads as empty.
        Ok(true)
    }

    async fn create(
        &mut self,
        _relation: &SafeIdentifier,
        _columns: &[SafeColumn],
    ) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn insert(
        &mut self,
        relation: &SafeIdentifier,
        _key: &SafeIdentifier,
        fields: &[BoundField],
    ) -> StoreResult<RecordId> {
        let document: Document = fields
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), to_bson(value)))
            .collect();

        let result = self.collection(relation).insert_one(document).await?;
        match result.inserted_id {
            Bson::ObjectId(oid) => Ok(RecordId::Document(oid.to_hex())),
            Bson::Int64(i) => Ok(RecordId::Key(i)),
            Bson::Int32(i) => Ok(RecordId::Key(i64::from(i))),
            other => Ok(RecordId::Document(other.to_string())),
        }
    }

    async fn find(
        &mut self,
        relation: &SafeIdentifier,
        filter: &[BoundField],
    ) -> StoreResult<Option<Record>> {
        let found = self
            .collection(relation)
            .find_one(filter_document(filter))
            .await?;
        Ok(found.map(read_document))
    }

    async fn update(
        &mut self,
        relation: &SafeIdentifier,
        _key: &SafeIdentifier,
        id: &RecordId,
        field: &SafeIdentifier,
        value: &FieldValue,
    ) -> StoreResult<bool> {
        let id = match id {
            RecordId::Document(hex) => id_bson(hex),
            RecordId::Key(k) => Bson::Int64(*k),
        };
        let mut query = Document::new();
        query.insert(DOCUMENT_KEY, id);
        let mut set = Document::new();
        set.insert(field.as_str(), to_bson(value));

        let result = self
            .collection(relation)
            .update_one(query, doc! { "$set": set })
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        self.client.shutdown().await;
        Ok(())
    }
}

/// Parses an identifier back into an `ObjectId` where it is one.
/// Only text `_id` values may name an ObjectId; other values match as stored.
fn filter_document(filter: &[BoundField]) -> Document {
    filter
        .iter()
        .map(|(name, value)| {
            let value = match value {
                FieldValue::Text(id) if name.as_str() == DOCUMENT_KEY => id_bson(id),
                _ => to_bson(value),
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

fn id_bson(id: &str) -> Bson {
    ObjectId::parse_str(id)
        .map(Bson::ObjectId)
        .unwrap_or_else(|_| Bson::String(id.to_string()))
}

fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Integer(i) => Bson::Int64(*i),
        FieldValue::Float(f) => Bson::Double(*f),
        FieldValue::Text(s) => Bson::String(s.clone()),
    }
}

fn read_document(document: Document) -> Record {
    document
        .into_iter()
        .map(|(name, value)| (name, read_bson(value)))
        .collect()
}

fn read_bson(value: Bson) -> FieldValue {
    match value {
        Bson::Null | Bson::Undefined => FieldValue::Null,
        Bson::Boolean(b) => FieldValue::Bool(b),
        Bson::Int32(i) => FieldValue::Integer(i64::from(i)),
        Bson::Int64(i) => FieldValue::Integer(i),
        Bson::Double(d) => FieldValue::Float(d),
        Bson::String(s) => FieldValue::Text(s),
        Bson::ObjectId(oid) => FieldValue::Text(oid.to_hex()),
        Bson::DateTime(dt) => FieldValue::Text(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        other => FieldValue::Text(other.into_relaxed_extjson().to_string()),
    }
}
