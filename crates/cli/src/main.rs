//! Formgate operator CLI.
//!
//! Runs submissions and user lookups against the tenants listed in a tenant
//! directory file. Results are printed to stdout as JSON.

mod commands;
mod config;

use clap::Parser;
use formgate_gateway::{GatewayError, init_logging};
use tracing::info;

use crate::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(errors) = cli.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let settings = cli.store_settings();
    info!(
        tenants = %cli.tenants.display(),
        operation_timeout = ?settings.operation_timeout,
        "Starting formgate"
    );

    let (service, directory) = commands::build_service(&cli.tenants, settings)?;

    match commands::run(cli.command, &service, &directory).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => match err.downcast_ref::<GatewayError>() {
            Some(gateway) => {
                eprintln!("{}", gateway.to_json());
                std::process::exit(exit_code(gateway));
            }
            None => Err(err),
        },
    }
}

/// Exit status for a gateway error: 2 for caller mistakes, 1 otherwise.
fn exit_code(err: &GatewayError) -> i32 {
    match err.status_code() {
        400..=499 => 2,
        _ => 1,
    }
}
