//! pg-adapter CLI - run one statement through the pooled adapter.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pg_adapter::adapter::Adapter;
use pg_adapter::config::Config;
use pg_adapter::db::PgDriver;
use pg_adapter::models::ParamValue;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn main() -> ExitCode {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        capacity = config.effective_capacity(),
        "Starting pg-adapter v{}",
        env!("CARGO_PKG_VERSION")
    );

    let adapter = Arc::new(Adapter::new(Arc::new(PgDriver::new())));
    adapter.set_pool_capacity(config.effective_capacity());
    adapter.set_connection_target(&config.target);

    if !adapter.connect() {
        error!("No connections could be established");
        return ExitCode::FAILURE;
    }

    let params: Vec<ParamValue> = config
        .params
        .iter()
        .map(|p| ParamValue::Text(p.clone()))
        .collect();

    let code = if config.non_query {
        match adapter.try_execute_non_query(&config.statement, &params) {
            Ok(affected) => {
                println!("{affected}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Non-query failed");
                ExitCode::FAILURE
            }
        }
    } else {
        match adapter.try_execute_query(&config.statement, &params) {
            Ok(rows) => match serde_json::to_string_pretty(&rows) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "Failed to render result");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                error!(error = %e, "Query failed");
                ExitCode::FAILURE
            }
        }
    };

    adapter.disconnect();
    code
}
