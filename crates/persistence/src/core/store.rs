//! The record store façade.

use std::future::Future;

use tracing::{debug, info, instrument, warn};

use crate::config::StoreSettings;
use crate::credentials::CredentialHasher;
use crate::error::{StoreError, StoreResult};
use crate::schema::{SchemaInferencer, TableProvisioner, sanitize};
use crate::tenant::TenantConfig;
use crate::types::{CONFIRM_PASSWORD_FIELD, FieldValue, Record, RecordId, RecordRef};

use super::{BoundField, ConnectionHandle, ConnectionProvider, EngineDriver, EngineKind};

/// Identifier field of documents in the document store.
pub const DOCUMENT_KEY: &str = "_id";

/// Uniform insert, lookup and update over every supported engine.
///
/// The store holds no connections and no schema state. Each operation opens a
/// session from the tenant's configuration, does its work under the
/// configured deadline, and closes the session on every exit path. Clones are
/// cheap and may be shared freely between tasks.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    provider: ConnectionProvider,
    hasher: CredentialHasher,
}

impl RecordStore {
    /// Creates a store with the given settings.
    pub fn new(settings: StoreSettings) -> Self {
        let hasher = CredentialHasher::new(settings.hash_cost);
        Self {
            provider: ConnectionProvider::new(settings),
            hasher,
        }
    }

    /// The store's settings.
    pub fn settings(&self) -> &StoreSettings {
        self.provider.settings()
    }

    /// The hasher applied to the credential field.
    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Stores `record` in the tenant's target relation.
    ///
    /// `confirm_password` is dropped and the credential field is hashed. For
    /// relational engines the relation is created from the record's shape if
    /// it does not exist yet. Returns the identifier the engine assigned.
    #[instrument(
        skip_all,
        fields(tenant = %tenant.tenant_id, engine = %tenant.engine, relation = %tenant.target_relation)
    )]
    pub async fn insert(&self, tenant: &TenantConfig, record: Record) -> StoreResult<RecordId> {
        let record = self.prepare_record(tenant, record).await?;
        let mut handle = self.open(tenant).await?;
        let result = self
            .bounded("insert", insert_record(handle.driver(), tenant, &record))
            .await;
        release(handle, result).await
    }

    /// Returns the first record in the tenant's user relation matching every
    /// field of `filter`, or `None` if there is none or the relation does not
    /// exist yet.
    #[instrument(
        skip_all,
        fields(tenant = %tenant.tenant_id, engine = %tenant.engine, relation = %tenant.user_relation())
    )]
    pub async fn find_one(&self, tenant: &TenantConfig, filter: &Record) -> StoreResult<Option<Record>> {
        if filter.is_empty() {
            return Err(StoreError::EmptyRecord { what: "filter" });
        }
        let mut handle = self.open(tenant).await?;
        let result = self
            .bounded("find_one", find_record(handle.driver(), tenant, filter))
            .await;
        release(handle, result).await
    }

    /// Sets one field of one record in the tenant's user relation.
    ///
    /// `target` is either the identifier returned by [`insert`](Self::insert)
    /// or a filter, in which case the first matching record is updated and no
    /// match is [`StoreError::NotFound`]. The credential field is hashed.
    /// Returns true if exactly one record was modified, and false if the
    /// relation does not exist.
    #[instrument(
        skip_all,
        fields(tenant = %tenant.tenant_id, engine = %tenant.engine, relation = %tenant.user_relation(), field = %field)
    )]
    pub async fn update_field(
        &self,
        tenant: &TenantConfig,
        target: impl Into<RecordRef>,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> StoreResult<bool> {
        let target = target.into();
        if let RecordRef::Filter(filter) = &target
            && filter.is_empty()
        {
            return Err(StoreError::EmptyRecord { what: "filter" });
        }
        let value = self.prepare_value(field, value.into()).await?;

        let mut handle = self.open(tenant).await?;
        let result = self
            .bounded(
                "update_field",
                update_record(handle.driver(), tenant, &target, field, &value),
            )
            .await;
        release(handle, result).await
    }

    /// Replaces the credential of one record. See [`update_field`](Self::update_field).
    pub async fn update_password(
        &self,
        tenant: &TenantConfig,
        target: impl Into<RecordRef>,
        new_password: &str,
    ) -> StoreResult<bool> {
        let field = self.settings().credential_field.clone();
        self.update_field(tenant, target, &field, new_password).await
    }

    /// Looks up a record by `filter` and checks `plaintext` against its
    /// stored credential.
    ///
    /// Returns the record, without its credential field, when the credential
    /// matches.
    pub async fn verify_credential(
        &self,
        tenant: &TenantConfig,
        filter: &Record,
        plaintext: &str,
    ) -> StoreResult<Option<Record>> {
        let Some(record) = self.find_one(tenant, filter).await? else {
            return Ok(None);
        };

        let field = &self.settings().credential_field;
        let Some(stored) = record.get_str(field) else {
            debug!(tenant = %tenant.tenant_id, "Matched record has no stored credential");
            return Ok(None);
        };

        let matched = self
            .hasher
            .verify_blocking(plaintext.to_string(), stored.to_string())
            .await?;
        Ok(matched.then(|| record.without(field)))
    }

    async fn open(&self, tenant: &TenantConfig) -> StoreResult<ConnectionHandle> {
        self.bounded("connect", async {
            self.provider.open(tenant).await.map_err(StoreError::from)
        })
        .await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        future: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        let limit = self.settings().operation_timeout;
        tokio::time::timeout(limit, future).await.unwrap_or_else(|_| {
            warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Operation deadline exceeded"
            );
            Err(StoreError::Timeout {
                operation: operation.to_string(),
            })
        })
    }

    /// Drops fields that must not be stored and hashes the credential.
    async fn prepare_record(&self, tenant: &TenantConfig, mut record: Record) -> StoreResult<Record> {
        record.remove(CONFIRM_PASSWORD_FIELD);

        let key = key_name(tenant, tenant.engine);
        if record.remove(key).is_some() {
            warn!(field = %key, "Dropping payload field that shadows the key column");
        }

        if record.is_empty() {
            return Err(StoreError::EmptyRecord { what: "record" });
        }

        let field = &self.settings().credential_field;
        if let Some(FieldValue::Text(plain)) = record.get(field)
            && !CredentialHasher::is_hashed(plain)
        {
            let hashed = self.hasher.hash_blocking(plain.clone()).await?;
            record.insert(field.clone(), hashed);
        }

        Ok(record)
    }

    async fn prepare_value(&self, field: &str, value: FieldValue) -> StoreResult<FieldValue> {
        if field != self.settings().credential_field {
            return Ok(value);
        }
        match value {
            FieldValue::Text(plain) => Ok(FieldValue::Text(self.hasher.hash_blocking(plain).await?)),
            _ => Err(StoreError::TypeMismatch {
                column: field.to_string(),
                expected: "text".to_string(),
            }),
        }
    }
}

async fn insert_record(
    driver: &mut dyn EngineDriver,
    tenant: &TenantConfig,
    record: &Record,
) -> StoreResult<RecordId> {
    let engine = driver.engine();
    let relation = sanitize(&tenant.target_relation, engine)?;
    let key = sanitize(key_name(tenant, engine), engine)?;
    let fields = bind_fields(record, engine)?;

    if engine.is_relational() {
        let plan = SchemaInferencer::new(&tenant.user_primary_key_name).infer(record);
        TableProvisioner::ensure_table(driver, &relation, &plan).await?;
    }

    let id = driver.insert(&relation, &key, &fields).await?;
    info!(id = %id, fields = fields.len(), "Stored record");
    Ok(id)
}

async fn find_record(
    driver: &mut dyn EngineDriver,
    tenant: &TenantConfig,
    filter: &Record,
) -> StoreResult<Option<Record>> {
    let engine = driver.engine();
    let relation = sanitize(tenant.user_relation(), engine)?;
    let filter = bind_fields(filter, engine)?;

    if !driver.exists(&relation).await? {
        debug!("Relation does not exist yet");
        return Ok(None);
    }
    driver.find(&relation, &filter).await
}

async fn update_record(
    driver: &mut dyn EngineDriver,
    tenant: &TenantConfig,
    target: &RecordRef,
    field: &str,
    value: &FieldValue,
) -> StoreResult<bool> {
    let engine = driver.engine();
    let relation = sanitize(tenant.user_relation(), engine)?;
    let key_name = key_name(tenant, engine);
    let key = sanitize(key_name, engine)?;
    let field = sanitize(field, engine)?;

    if !driver.exists(&relation).await? {
        debug!("Relation does not exist yet");
        return Ok(false);
    }

    let id = match target {
        RecordRef::Id(id) => id.clone(),
        RecordRef::Filter(filter) => {
            let filter = bind_fields(filter, engine)?;
            let record = driver
                .find(&relation, &filter)
                .await?
                .ok_or_else(|| StoreError::NotFound {
                    relation: relation.to_string(),
                })?;
            record_id(&record, key_name)?
        }
    };

    let updated = driver.update(&relation, &key, &id, &field, value).await?;
    debug!(id = %id, updated, "Updated field");
    Ok(updated)
}

/// Closes the session and returns the operation's outcome.
async fn release<T>(handle: ConnectionHandle, result: StoreResult<T>) -> StoreResult<T> {
    // Close failures are logged by `close` and do not change the outcome.
    let _ = handle.close().await;
    result
}

fn key_name(tenant: &TenantConfig, engine: EngineKind) -> &str {
    if engine.is_relational() {
        &tenant.user_primary_key_name
    } else {
        DOCUMENT_KEY
    }
}

fn bind_fields(record: &Record, engine: EngineKind) -> StoreResult<Vec<BoundField>> {
    record
        .iter()
        .map(|(name, value)| Ok((sanitize(name, engine)?, value.clone())))
        .collect()
}

fn record_id(record: &Record, key: &str) -> StoreResult<RecordId> {
    match record.get(key) {
        Some(FieldValue::Integer(k)) => Ok(RecordId::Key(*k)),
        Some(FieldValue::Text(d)) => Ok(RecordId::Document(d.clone())),
        _ => Err(StoreError::TypeMismatch {
            column: key.to_string(),
            expected: "record identifier".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordStore {
        RecordStore::new(StoreSettings::default().with_hash_cost(4))
    }

    fn tenant() -> TenantConfig {
        TenantConfig::sqlite("acme", "unused.db", "signups")
    }

    #[tokio::test]
    async fn test_prepare_drops_confirm_password_and_hashes() {
        let record = Record::new()
            .with("name", "Jo")
            .with("password", "pw1")
            .with("confirm_password", "pw1");
        let prepared = store().prepare_record(&tenant(), record).await.unwrap();

        assert!(!prepared.contains("confirm_password"));
        let stored = prepared.get_str("password").unwrap();
        assert_ne!(stored, "pw1");
        assert!(CredentialHasher::is_hashed(stored));
        assert_eq!(prepared.keys().collect::<Vec<_>>(), vec!["name", "password"]);
    }

    #[tokio::test]
    async fn test_prepare_keeps_existing_hash() {
        let hash = CredentialHasher::new(4).hash("pw1").unwrap();
        let record = Record::new().with("password", hash.clone());
        let prepared = store().prepare_record(&tenant(), record).await.unwrap();
        assert_eq!(prepared.get_str("password"), Some(hash.as_str()));
    }

    #[tokio::test]
    async fn test_prepare_drops_key_field() {
        let record = Record::new().with("id", 99).with("name", "Jo");
        let prepared = store().prepare_record(&tenant(), record).await.unwrap();
        assert!(!prepared.contains("id"));
    }

    #[tokio::test]
    async fn test_prepare_rejects_empty() {
        let record = Record::new().with("confirm_password", "pw1");
        let err = store().prepare_record(&tenant(), record).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyRecord { what: "record" }));
    }

    #[tokio::test]
    async fn test_credential_value_must_be_text() {
        let err = store()
            .prepare_value("password", FieldValue::Integer(5))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));

        let untouched = store()
            .prepare_value("nickname", FieldValue::Integer(5))
            .await
            .unwrap();
        assert_eq!(untouched, FieldValue::Integer(5));
    }

    #[tokio::test]
    async fn test_empty_filter_is_rejected_before_connecting() {
        let err = store().find_one(&tenant(), &Record::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyRecord { what: "filter" }));

        let err = store()
            .update_field(&tenant(), Record::new(), "password", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyRecord { what: "filter" }));
    }

    #[test]
    fn test_record_id_from_key() {
        let record = Record::new().with("id", 7).with("_id", "65a1");
        assert_eq!(record_id(&record, "id").unwrap(), RecordId::Key(7));
        assert_eq!(
            record_id(&record, "_id").unwrap(),
            RecordId::Document("65a1".to_string())
        );
        assert!(record_id(&record, "missing").is_err());
    }
}
