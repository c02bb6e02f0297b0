//! Lazy table provisioning.

use tracing::{debug, info};

use crate::core::EngineDriver;
use crate::error::{ProvisionError, StoreResult};

use super::{ColumnPlan, SafeColumn, SafeIdentifier, sanitize};

/// What [`TableProvisioner::ensure_table`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The relation already existed.
    AlreadyPresent,
    /// The relation was created by this call.
    Created,
    /// Another session created the relation between the check and the create.
    CreatedConcurrently,
}

/// Creates destination relations on first use.
pub struct TableProvisioner;

impl TableProvisioner {
    /// Makes sure `relation` exists, creating it from `plan` if it does not.
    ///
    /// Every planned column is sanitized before the statement is built. If
    /// the create loses a race with another session the existence check is
    /// repeated once; if the relation is still missing the conflict is
    /// returned. Document stores always report [`ProvisionOutcome::AlreadyPresent`].
    pub async fn ensure_table(
        driver: &mut dyn EngineDriver,
        relation: &SafeIdentifier,
        plan: &ColumnPlan,
    ) -> StoreResult<ProvisionOutcome> {
        if driver.exists(relation).await? {
            return Ok(ProvisionOutcome::AlreadyPresent);
        }

        let engine = driver.engine();
        let columns = plan
            .columns()
            .iter()
            .map(|c| -> StoreResult<SafeColumn> {
                Ok(SafeColumn {
                    name: sanitize(&c.name, engine)?,
                    column_type: c.column_type,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        match driver.create(relation, &columns).await {
            Ok(()) => {
                info!(
                    engine = %engine,
                    relation = %relation,
                    columns = columns.len(),
                    "Created relation"
                );
                Ok(ProvisionOutcome::Created)
            }
            Err(ProvisionError::Conflict { relation: name }) => {
                debug!(relation = %name, "Relation created concurrently, re-checking");
                if driver.exists(relation).await? {
                    Ok(ProvisionOutcome::CreatedConcurrently)
                } else {
                    Err(ProvisionError::Conflict { relation: name }.into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
