//! Command line configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FORMGATE_TENANTS` | tenants.json | Tenant directory file |
//! | `FORMGATE_LOG_LEVEL` | warn | Log level (error, warn, info, debug, trace) |
//! | `FORMGATE_CONNECT_TIMEOUT` | 5s | Time allowed to open a session |
//! | `FORMGATE_STATEMENT_TIMEOUT` | 30s | Server-side statement limit |
//! | `FORMGATE_OPERATION_TIMEOUT` | 60s | Deadline for a whole store operation |
//! | `FORMGATE_HASH_COST` | 10 | bcrypt cost factor |
//!
//! Logs go to stderr so that stdout carries only JSON results.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use formgate_persistence::StoreSettings;
use formgate_persistence::tenant::TenantId;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Formgate operator command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "formgate")]
#[command(version)]
#[command(about = "Submit, look up and manage records in Formgate tenant storage")]
pub struct Cli {
    /// Path to the tenant directory (a JSON array of tenant profiles).
    #[arg(long, env = "FORMGATE_TENANTS", default_value = "tenants.json")]
    pub tenants: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "FORMGATE_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Time allowed to open a session.
    #[arg(long, env = "FORMGATE_CONNECT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    /// Server-side statement limit.
    #[arg(long, env = "FORMGATE_STATEMENT_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub statement_timeout: Duration,

    /// Deadline for a whole insert, lookup or update.
    #[arg(long, env = "FORMGATE_OPERATION_TIMEOUT", default_value = "60s", value_parser = humantime::parse_duration)]
    pub operation_timeout: Duration,

    /// bcrypt cost factor for stored credentials.
    #[arg(long, env = "FORMGATE_HASH_COST", default_value = "10")]
    pub hash_cost: u32,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations the CLI can run.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate a submission and store it, or send a verification code.
    Submit {
        /// Tenant identifier.
        #[arg(long)]
        tenant: TenantId,

        /// Submission as a JSON object.
        #[arg(long)]
        data: String,
    },

    /// Print the first user record matching a filter.
    Find {
        /// Tenant identifier.
        #[arg(long)]
        tenant: TenantId,

        /// Filter as a JSON object.
        #[arg(long)]
        filter: String,
    },

    /// Replace the password of the user matching a filter.
    SetPassword {
        /// Tenant identifier.
        #[arg(long)]
        tenant: TenantId,

        /// Filter as a JSON object.
        #[arg(long)]
        filter: String,

        /// New password.
        #[arg(long, env = "FORMGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Check a password against the user matching a filter.
    CheckPassword {
        /// Tenant identifier.
        #[arg(long)]
        tenant: TenantId,

        /// Filter as a JSON object.
        #[arg(long)]
        filter: String,

        /// Password to check.
        #[arg(long, env = "FORMGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Load the tenant directory and report every tenant.
    VerifyConfig {
        /// Also open and close a session to every tenant's engine.
        #[arg(long)]
        connect: bool,
    },
}

impl Cli {
    /// Store settings from the command line, with the remaining settings
    /// taken from the environment.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            connect_timeout: self.connect_timeout,
            statement_timeout: self.statement_timeout,
            operation_timeout: self.operation_timeout,
            hash_cost: self.hash_cost,
            ..StoreSettings::from_env()
        }
    }

    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Log level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }

        if self.tenants.as_os_str().is_empty() {
            errors.push("Tenant directory path cannot be empty".to_string());
        }

        if let Err(store_errors) = self.store_settings().validate() {
            errors.extend(store_errors);
        }

        if let Some(tenant) = self.command.tenant() {
            if tenant.is_blank() {
                errors.push("Tenant cannot be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Command {
    /// The tenant the command runs against, if any.
    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            Command::Submit { tenant, .. }
            | Command::Find { tenant, .. }
            | Command::SetPassword { tenant, .. }
            | Command::CheckPassword { tenant, .. } => Some(tenant),
            Command::VerifyConfig { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("formgate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["verify-config"]);
        assert_eq!(cli.tenants, PathBuf::from("tenants.json"));
        assert_eq!(cli.connect_timeout, Duration::from_secs(5));
        assert_eq!(cli.operation_timeout, Duration::from_secs(60));
        assert!(matches!(cli.command, Command::VerifyConfig { connect: false }));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_submit_arguments() {
        let cli = parse(&[
            "--tenants",
            "/etc/formgate/tenants.json",
            "--connect-timeout",
            "750ms",
            "submit",
            "--tenant",
            "acme",
            "--data",
            r#"{"email": "jo@x.com"}"#,
        ]);
        assert_eq!(cli.connect_timeout, Duration::from_millis(750));
        assert_eq!(cli.command.tenant(), Some(&TenantId::new("acme")));
        let Command::Submit { data, .. } = &cli.command else {
            panic!("expected submit, got {:?}", cli.command);
        };
        assert!(data.contains("jo@x.com"));
    }

    #[test]
    fn test_store_settings_follow_arguments() {
        let cli = parse(&["--hash-cost", "4", "--statement-timeout", "2s", "verify-config"]);
        let settings = cli.store_settings();
        assert_eq!(settings.hash_cost, 4);
        assert_eq!(settings.statement_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let result = Cli::try_parse_from(["formgate", "--operation-timeout", "soon", "verify-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_collects_errors() {
        let cli = parse(&[
            "--log-level",
            "loud",
            "--hash-cost",
            "2",
            "--operation-timeout",
            "0s",
            "find",
            "--tenant",
            " ",
            "--filter",
            "{}",
        ]);
        let errors = cli.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].starts_with("Log level must be one of"));
        assert!(errors.iter().any(|e| e == "Operation timeout cannot be 0"));
        assert!(errors.iter().any(|e| e.starts_with("Hash cost must be between")));
        assert_eq!(errors[3], "Tenant cannot be empty");
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["formgate"]).is_err());
    }
}
