//! Offline benchmark: the synthetic workload driven straight against
//! the table, no network in between.

use benchkv::table::Table;
use benchkv::workload::{Request, RunStats, Workload, DEFAULT_SEED};
use clap::Parser;
use std::hint::black_box;
use std::process::ExitCode;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "benchkv-standalone")]
#[command(version = "0.1.0")]
#[command(about = "Offline table benchmark for benchkv", long_about = None)]
struct CliArgs {
    /// Number of benchmark requests to issue
    requests: u64,

    /// Number of distinct keys in the workload
    keyspace: u32,

    /// Workload generator seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if args.requests == 0 || args.keyspace == 0 {
        eprintln!("requests and keyspace must be positive");
        return ExitCode::FAILURE;
    }

    // Sized mode: capacity derived from the keyspace hint, so the
    // pre-populated table sits at or below ~50% load.
    let mut table = match Table::with_expected_items(args.keyspace as usize) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("failed to allocate table: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut workload = Workload::new(args.seed, args.keyspace);
    let mut stats = RunStats::default();

    info!(
        requests = args.requests,
        keyspace = args.keyspace,
        capacity = table.capacity(),
        "Standalone benchmark"
    );

    for (key, value) in workload.populate_pairs() {
        if table.set(key.as_bytes(), value.as_bytes()).is_err() {
            stats.failures += 1;
        }
    }

    let start = Instant::now();

    for _ in 0..args.requests {
        let request = workload.next_request();
        let t0 = Instant::now();
        match &request {
            Request::Get { key } => {
                black_box(table.get(key.as_bytes()));
            }
            Request::Set { key, value } => {
                if table.set(key.as_bytes(), value.as_bytes()).is_err() {
                    stats.failures += 1;
                }
            }
            Request::Del { key } => table.delete(key.as_bytes()),
        }
        stats.stat_mut(request.op()).record(t0.elapsed());
    }

    print!("{}", stats.report(args.requests, start.elapsed()));
    info!(
        occupied = table.len(),
        capacity = table.capacity(),
        "Table state at exit"
    );

    if stats.failures > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
