//! Subcommand implementations.
//!
//! Every command returns the JSON document printed on stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use formgate_gateway::{
    GatewayError, InMemoryTenantDirectory, InMemoryVerificationStore, LoggingNotifier,
    SubmissionService, TenantDirectory, TenantProfile,
};
use formgate_persistence::tenant::TenantId;
use formgate_persistence::types::Record;
use formgate_persistence::{ConnectionProvider, RecordStore, StoreSettings};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::Command;

/// Loads the tenant directory and wires a submission service around it.
pub fn build_service(
    tenants: &Path,
    settings: StoreSettings,
) -> anyhow::Result<(SubmissionService, Arc<InMemoryTenantDirectory>)> {
    let directory = Arc::new(InMemoryTenantDirectory::load(tenants)?);
    info!(path = %tenants.display(), tenants = directory.len(), "Tenant directory loaded");

    let service = SubmissionService::new(
        RecordStore::new(settings),
        directory.clone(),
        Arc::new(InMemoryVerificationStore::new()),
        Arc::new(LoggingNotifier::new()),
    );
    Ok((service, directory))
}

/// Runs one command.
pub async fn run(
    command: Command,
    service: &SubmissionService,
    directory: &InMemoryTenantDirectory,
) -> anyhow::Result<Value> {
    match command {
        Command::Submit { tenant, data } => {
            let record = parse_record("data", &data)?;
            let outcome = service.submit(&tenant, record).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        Command::Find { tenant, filter } => {
            let filter = parse_record("filter", &filter)?;
            let profile = profile(directory, &tenant).await?;
            let found = service
                .store()
                .find_one(&profile.storage, &filter)
                .await
                .map_err(GatewayError::from)?;
            Ok(found.map_or(Value::Null, |record| record.to_json()))
        }
        Command::SetPassword {
            tenant,
            filter,
            password,
        } => {
            let filter = parse_record("filter", &filter)?;
            if password.is_empty() {
                return Err(GatewayError::missing("password").into());
            }
            let profile = profile(directory, &tenant).await?;
            let updated = service
                .store()
                .update_password(&profile.storage, filter, &password)
                .await
                .map_err(GatewayError::from)?;
            Ok(json!({ "updated": updated }))
        }
        Command::CheckPassword {
            tenant,
            filter,
            password,
        } => {
            let filter = parse_record("filter", &filter)?;
            let user = service
                .check_credentials(&tenant, &filter, &password)
                .await?;
            Ok(match user {
                Some(user) => json!({ "matched": true, "user": user.to_json() }),
                None => json!({ "matched": false }),
            })
        }
        Command::VerifyConfig { connect } => {
            verify_config(directory, service.store().settings(), connect).await
        }
    }
}

async fn profile(
    directory: &InMemoryTenantDirectory,
    tenant: &TenantId,
) -> Result<TenantProfile, GatewayError> {
    directory
        .lookup(tenant)
        .await
        .ok_or_else(|| GatewayError::TenantNotFound {
            tenant_id: tenant.to_string(),
        })
}

async fn verify_config(
    directory: &InMemoryTenantDirectory,
    settings: &StoreSettings,
    connect: bool,
) -> anyhow::Result<Value> {
    let provider = ConnectionProvider::new(settings.clone());
    let mut tenants = Vec::new();
    let mut failures = 0;

    for profile in directory.profiles() {
        let storage = &profile.storage;
        let mut entry = json!({
            "tenant_id": storage.tenant_id,
            "name": profile.name,
            "engine": storage.engine,
            "target_relation": storage.target_relation,
            "user_relation": storage.user_relation(),
            "verification": profile.verification,
            "rules": profile.rules.len(),
        });

        if connect {
            let reachable = match provider.open(storage).await {
                Ok(handle) => {
                    if let Err(err) = handle.close().await {
                        warn!(tenant = %storage.tenant_id, error = %err, "Closing probe session failed");
                    }
                    Value::Bool(true)
                }
                Err(err) => {
                    warn!(tenant = %storage.tenant_id, error = %err, "Tenant engine unreachable");
                    failures += 1;
                    Value::String(err.to_string())
                }
            };
            entry["reachable"] = reachable;
        }
        tenants.push(entry);
    }

    if failures > 0 {
        anyhow::bail!("{failures} tenant(s) could not be reached");
    }
    Ok(json!({ "tenants": tenants }))
}

fn parse_record(what: &str, text: &str) -> anyhow::Result<Record> {
    let value: Value =
        serde_json::from_str(text).with_context(|| format!("--{what} is not valid JSON"))?;
    Record::try_from(value).map_err(|err| anyhow::anyhow!("--{what} must be a JSON object: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> StoreSettings {
        StoreSettings::default().with_hash_cost(4)
    }

    fn write_tenants(dir: &TempDir) -> std::path::PathBuf {
        let db = dir.path().join("acme.db");
        let tenants = json!([{
            "name": "Acme",
            "storage": {
                "tenant_id": "acme",
                "engine": "sqlite",
                "connection_mode": "parameters",
                "database_name": db.to_string_lossy(),
                "target_relation": "users"
            },
            "rules": { "email": { "required": true, "type": "email" } }
        }]);
        let path = dir.path().join("tenants.json");
        std::fs::write(&path, tenants.to_string()).unwrap();
        path
    }

    fn acme() -> TenantId {
        TenantId::new("acme")
    }

    #[test]
    fn test_parse_record() {
        let record = parse_record("data", r#"{"email": "jo@x.com", "age": 30}"#).unwrap();
        assert_eq!(record.get_str("email"), Some("jo@x.com"));

        let err = parse_record("data", "{email").unwrap_err();
        assert_eq!(err.to_string(), "--data is not valid JSON");

        let err = parse_record("filter", "[1, 2]").unwrap_err();
        assert!(err.to_string().starts_with("--filter must be a JSON object"));
    }

    #[test]
    fn test_missing_tenant_file() {
        let dir = TempDir::new().unwrap();
        let result = build_service(&dir.path().join("absent.json"), settings());
        assert!(result.is_err());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_submit_find_and_passwords() {
        let dir = TempDir::new().unwrap();
        let (service, directory) = build_service(&write_tenants(&dir), settings()).unwrap();

        let submit = Command::Submit {
            tenant: acme(),
            data: r#"{"name": "Jo", "email": "jo@x.com", "password": "pw1", "confirm_password": "pw1"}"#
                .to_string(),
        };
        let outcome = run(submit, &service, &directory).await.unwrap();
        assert_eq!(outcome["status"], "stored");

        let find = Command::Find {
            tenant: acme(),
            filter: r#"{"email": "jo@x.com"}"#.to_string(),
        };
        let found = run(find, &service, &directory).await.unwrap();
        assert_eq!(found["name"], "Jo");
        assert_ne!(found["password"], "pw1");

        let set = Command::SetPassword {
            tenant: acme(),
            filter: r#"{"email": "jo@x.com"}"#.to_string(),
            password: "pw2".to_string(),
        };
        let updated = run(set, &service, &directory).await.unwrap();
        assert_eq!(updated, json!({"updated": true}));

        let check = |password: &str| Command::CheckPassword {
            tenant: acme(),
            filter: r#"{"email": "jo@x.com"}"#.to_string(),
            password: password.to_string(),
        };
        let matched = run(check("pw2"), &service, &directory).await.unwrap();
        assert_eq!(matched["matched"], true);
        assert_eq!(matched["user"]["email"], "jo@x.com");
        assert!(matched["user"].get("password").is_none());

        let stale = run(check("pw1"), &service, &directory).await.unwrap();
        assert_eq!(stale, json!({"matched": false}));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_find_before_first_submission() {
        let dir = TempDir::new().unwrap();
        let (service, directory) = build_service(&write_tenants(&dir), settings()).unwrap();

        let find = Command::Find {
            tenant: acme(),
            filter: r#"{"email": "jo@x.com"}"#.to_string(),
        };
        assert_eq!(run(find, &service, &directory).await.unwrap(), Value::Null);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_gateway_errors_surface() {
        let dir = TempDir::new().unwrap();
        let (service, directory) = build_service(&write_tenants(&dir), settings()).unwrap();

        let submit = Command::Submit {
            tenant: acme(),
            data: r#"{"email": "nope"}"#.to_string(),
        };
        let err = run(submit, &service, &directory).await.unwrap_err();
        let err = err.downcast_ref::<GatewayError>().unwrap();
        assert_eq!(err.status_code(), 400);

        let find = Command::Find {
            tenant: TenantId::new("globex"),
            filter: r#"{"email": "jo@x.com"}"#.to_string(),
        };
        let err = run(find, &service, &directory).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::TenantNotFound { .. })
        ));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_verify_config() {
        let dir = TempDir::new().unwrap();
        let (service, directory) = build_service(&write_tenants(&dir), settings()).unwrap();

        let report = run(Command::VerifyConfig { connect: true }, &service, &directory)
            .await
            .unwrap();
        let acme = &report["tenants"][0];
        assert_eq!(acme["tenant_id"], "acme");
        assert_eq!(acme["engine"], "sqlite");
        assert_eq!(acme["user_relation"], "users");
        assert_eq!(acme["verification"], "none");
        assert_eq!(acme["rules"], 1);
        assert_eq!(acme["reachable"], true);
    }
}
