//! Load-generating benchmark client.
//!
//! Pre-populates the keyspace, then fires a 70/20/10 get/set/del mix
//! at the server, one connection per request, timing each category.

use benchkv::workload::{Op, RunStats, Workload, DEFAULT_SEED};
use clap::Parser;
use std::io;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// How long to wait for a `get` reply before treating it as absent.
/// The server never answers a miss, so the timeout is the miss signal
/// when the close races the read.
const REPLY_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "benchkv-client")]
#[command(version = "0.1.0")]
#[command(about = "Load-generating benchmark client for benchkv", long_about = None)]
struct CliArgs {
    /// Server host
    host: String,

    /// Server TCP port
    port: u16,

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

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to build runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: CliArgs) -> ExitCode {
    let addr = format!("{}:{}", args.host, args.port);
    let mut workload = Workload::new(args.seed, args.keyspace);
    let mut stats = RunStats::default();

    info!(
        target = %addr,
        requests = args.requests,
        keyspace = args.keyspace,
        "Starting benchmark"
    );

    // Warm up: populate the keyspace so gets have a hit rate.
    for (key, value) in workload.populate_pairs() {
        let body = format!("set:{key}:{value}");
        if let Err(e) = send_request(&addr, body.as_bytes(), false).await {
            debug!(error = %e, key = %key, "Populate request failed");
            stats.failures += 1;
        }
    }

    let bench_start = Instant::now();

    for _ in 0..args.requests {
        let request = workload.next_request();
        let body = request.body();
        let want_reply = request.op() == Op::Get;

        let t0 = Instant::now();
        if let Err(e) = send_request(&addr, body.as_bytes(), want_reply).await {
            debug!(error = %e, "Request failed");
            stats.failures += 1;
        }
        stats.stat_mut(request.op()).record(t0.elapsed());
    }

    print!("{}", stats.report(args.requests, bench_start.elapsed()));

    if stats.failures > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

/// Issue one framed request on a fresh connection, optionally reading
/// the reply until the server closes.
async fn send_request(addr: &str, body: &[u8], want_reply: bool) -> io::Result<Option<Vec<u8>>> {
    let mut stream = TcpStream::connect(addr).await?;

    let mut packet = Vec::with_capacity(body.len() + 24);
    packet.extend_from_slice(format!("{}:", body.len()).as_bytes());
    packet.extend_from_slice(body);
    stream.write_all(&packet).await?;

    if !want_reply {
        return Ok(None);
    }

    let mut reply = Vec::new();
    match tokio::time::timeout(REPLY_TIMEOUT, stream.read_to_end(&mut reply)).await {
        Ok(Ok(_)) => Ok(Some(reply)),
        Ok(Err(e)) => Err(e),
        // No reply inside the window reads as a miss.
        Err(_) => Ok(None),
    }
}
