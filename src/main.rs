//! benchkv: a minimal in-memory key-value server.
//!
//! Serves a length-prefixed TCP protocol where each connection carries
//! exactly one request:
//! - `get:<key>`: answered with the raw value bytes on a hit
//! - `set:<key>:<value>`: never answered
//! - `del:<key>`: never answered
//!
//! Connections are served strictly one at a time; an optional deadline
//! or a termination signal stops the accept loop between connections.

use benchkv::config::Config;
use benchkv::server::Server;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        deadline = config.deadline,
        capacity = config.capacity,
        "Starting benchkv server"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    // Table creation failure at startup is fatal: nothing to serve.
    let mut server = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to create table");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server.run()) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failures) => {
            error!(failures, "Finished with storage failures");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "Fatal I/O error");
            ExitCode::FAILURE
        }
    }
}
