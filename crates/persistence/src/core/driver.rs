//! The engine driver abstraction.
//!
//! An [`EngineDriver`] owns one live session with one engine and translates
//! the record store's abstract calls into that engine's native statements.
//! Identifiers arrive already sanitized; values arrive as [`FieldValue`]s and
//! are always bound, never formatted into statement text.
//!
//! Adding an engine means implementing this trait and teaching the
//! [`ConnectionProvider`](super::ConnectionProvider) how to open it.

use async_trait::async_trait;

use crate::error::{ProvisionError, StoreResult};
use crate::schema::{SafeColumn, SafeIdentifier};
use crate::types::{FieldValue, Record, RecordId};

use super::EngineKind;

/// A sanitized field name with the value to bind for it.
pub type BoundField = (SafeIdentifier, FieldValue);

/// One live session with a storage engine.
#[async_trait]
pub trait EngineDriver: Send {
    /// The engine this driver talks to.
    fn engine(&self) -> EngineKind;

    /// Returns true if the relation exists. Always true for document stores.
    async fn exists(&mut self, relation: &SafeIdentifier) -> StoreResult<bool>;

    /// Creates the relation with the given columns.
    ///
    /// A relation created concurrently by another session must surface as
    /// [`ProvisionError::Conflict`].
    async fn create(
        &mut self,
        relation: &SafeIdentifier,
        columns: &[SafeColumn],
    ) -> Result<(), ProvisionError>;

    /// Inserts one record and returns the identifier the engine assigned.
    async fn insert(
        &mut self,
        relation: &SafeIdentifier,
        key: &SafeIdentifier,
        fields: &[BoundField],
    ) -> StoreResult<RecordId>;

    /// Returns the first record matching every filter field.
    async fn find(
        &mut self,
        relation: &SafeIdentifier,
        filter: &[BoundField],
    ) -> StoreResult<Option<Record>>;

    /// Sets one field of the record keyed by `id`. Returns true if exactly one
    /// record was modified.
    async fn update(
        &mut self,
        relation: &SafeIdentifier,
        key: &SafeIdentifier,
        id: &RecordId,
        field: &SafeIdentifier,
        value: &FieldValue,
    ) -> StoreResult<bool>;

    /// Releases the session.
    async fn close(self: Box<Self>) -> StoreResult<()>;
}
