//! TCP server for the length-prefixed key-value protocol.
//!
//! One connection carries exactly one request. The accept loop is
//! strictly serial: a connection is read, dispatched, optionally
//! answered, and closed before the next accept, so the table never
//! sees concurrent access and needs no locking.

use crate::config::Config;
use crate::protocol::{self, Command, LengthParse};
use crate::table::{Table, TableError};
use bytes::{Buf, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 1024;

/// Server instance: listener configuration plus the table it serves.
pub struct Server {
    config: Config,
    table: Table,
    failures: u64,
}

impl Server {
    /// Create a server with a fixed-capacity table.
    ///
    /// Table creation failure is fatal to the caller: there is nothing
    /// to serve without backing storage.
    pub fn new(config: Config) -> Result<Self, TableError> {
        let table = Table::fixed(config.capacity)?;
        Ok(Server {
            config,
            table,
            failures: 0,
        })
    }

    /// Count of storage operations that failed since startup.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Bind the configured address and serve until shutdown, returning
    /// the failure count.
    pub async fn run(&mut self) -> io::Result<u64> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        info!(address = %self.config.listen, "Server listening");
        self.serve(listener).await
    }

    /// Drive the accept loop on an already-bound listener.
    pub async fn serve(&mut self, listener: TcpListener) -> io::Result<u64> {
        let shutdown = shutdown_signal(self.config.deadline);
        tokio::pin!(shutdown);

        loop {
            // Shutdown is consulted only between connections; an
            // in-flight request is always served to completion.
            let (stream, addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted?,
            };

            debug!(peer = %addr, "New connection");
            self.handle_connection(stream).await?;
        }

        info!(failures = self.failures, "Server stopped");
        Ok(self.failures)
    }

    /// Serve exactly one request on `stream`, then drop it.
    async fn handle_connection(&mut self, mut stream: TcpStream) -> io::Result<()> {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        // Length header: accumulate until the `:` delimiter shows up.
        let (body_len, header_len) = loop {
            match protocol::parse_length(&buffer) {
                LengthParse::Complete {
                    body_len,
                    header_len,
                } => break (body_len, header_len),
                LengthParse::Incomplete => {
                    let n = stream.read_buf(&mut buffer).await?;
                    if n == 0 {
                        trace!("Connection closed before length delimiter");
                        return Ok(());
                    }
                }
                LengthParse::Malformed => {
                    debug!("Malformed length prefix");
                    return Ok(());
                }
            }
        };
        buffer.advance(header_len);
        trace!(body_len, "Frame header parsed");

        // Body: read up to the declared length. A peer that closes
        // early gets whatever bytes it managed to send dispatched
        // instead of blocking against the declared length.
        while buffer.len() < body_len {
            let n = stream.read_buf(&mut buffer).await?;
            if n == 0 {
                debug!(
                    declared = body_len,
                    received = buffer.len(),
                    "Short body, peer closed early"
                );
                break;
            }
        }
        let body = if buffer.len() < body_len {
            buffer.split()
        } else {
            buffer.split_to(body_len)
        };

        self.dispatch(&body, &mut stream).await
    }

    /// Map a request body onto a table operation and write the reply,
    /// if the command arms one.
    async fn dispatch(&mut self, body: &[u8], stream: &mut TcpStream) -> io::Result<()> {
        let Some(command) = protocol::parse_command(body) else {
            debug!("Ignoring unrecognized request");
            return Ok(());
        };

        match command {
            Command::Get { key } => {
                trace!(key = %String::from_utf8_lossy(&key), "get");
                if let Some(value) = self.table.get(&key) {
                    // Raw value bytes, no framing; absence of a reply is
                    // the miss signal.
                    stream.write_all(value).await?;
                }
            }
            Command::Set { key, value } => {
                trace!(key = %String::from_utf8_lossy(&key), "set");
                if let Err(e) = self.table.set(&key, &value) {
                    debug!(error = %e, "Dropped set");
                    self.failures += 1;
                }
            }
            Command::Del { key } => {
                trace!(key = %String::from_utf8_lossy(&key), "del");
                self.table.delete(&key);
            }
        }

        Ok(())
    }
}

/// Resolves when the configured deadline passes or a termination
/// signal (SIGTERM or Ctrl-C) arrives.
async fn shutdown_signal(deadline_secs: i64) {
    let deadline = async {
        if deadline_secs > 0 {
            tokio::time::sleep(Duration::from_secs(deadline_secs as u64)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = deadline => info!("Deadline reached"),
        _ = terminate => info!("Termination signal received"),
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "Ctrl-C handler failed");
            }
            info!("Interrupted");
        }
    }
}
