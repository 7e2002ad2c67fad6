//! Decoy listener: accept, answer, then analyze.
//!
//! Every connection gets the same canned response before any scanning
//! happens, so detection work is never observable from the outside.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chrono::Utc;
use lurepot_core::{Config, Event, Sink};

use crate::detect::Detector;
use crate::http::{self, RequestHead, MAX_HEAD_BYTES};

/// Slow peers get this long to finish sending a request head.
const HEAD_READ_TIMEOUT: Duration = Duration::from_secs(10);

struct Shared {
    detector: Detector,
    sink: Arc<dyn Sink>,
    server_header: Option<String>,
}

/// The decoy service: one listener per configured port, one task per
/// connection.
pub struct Server {
    listeners: Vec<TcpListener>,
    shared: Arc<Shared>,
}

impl Server {
    /// Bind all configured ports. Fails fast if any port is unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if any listening socket cannot be bound.
    pub async fn bind(config: &Config, sink: Arc<dyn Sink>) -> eyre::Result<Self> {
        let mut listeners = Vec::with_capacity(config.ports.len());
        for port in &config.ports {
            let listener = TcpListener::bind(("0.0.0.0", *port)).await?;
            info!(addr = %listener.local_addr()?, "listening");
            listeners.push(listener);
        }

        let shared = Arc::new(Shared {
            detector: Detector::new(Arc::clone(&sink), config.fetch.clone()),
            sink,
            server_header: config.server_header.clone(),
        });

        Ok(Self { listeners, shared })
    }

    /// Bound addresses, in configuration order. Useful when a port was
    /// configured as 0.
    ///
    /// # Errors
    ///
    /// Returns an error if a socket cannot report its local address.
    pub fn local_addrs(&self) -> std::io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(TcpListener::local_addr).collect()
    }

    /// Serve until the surrounding task is cancelled.
    pub async fn run(self) {
        let mut tasks = Vec::with_capacity(self.listeners.len());
        for listener in self.listeners {
            let shared = Arc::clone(&self.shared);
            tasks.push(tokio::spawn(accept_loop(listener, shared)));
        }
        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    let server_port = listener.local_addr().map(|a| a.port()).unwrap_or(0);
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, server_port, "accepted connection");
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    handle_connection(stream, peer, server_port, shared).await;
                });
            }
            Err(e) => {
                warn!(%e, server_port, "accept error");
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    server_port: u16,
    shared: Arc<Shared>,
) {
    let correlation_id = Uuid::new_v4();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half.take(MAX_HEAD_BYTES));

    let head = match timeout(HEAD_READ_TIMEOUT, http::read_request_head(&mut reader)).await {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => {
            debug!(%peer, "connection closed without a request");
            return;
        }
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "failed reading request head");
            return;
        }
        Err(_) => {
            debug!(%peer, "request head read timed out");
            return;
        }
    };

    // Respond and hang up before any analysis runs.
    if let Err(e) = write_response(&mut write_half, correlation_id, &shared.server_header).await {
        debug!(%peer, error = %e, "failed writing response");
    }
    let _ = write_half.shutdown().await;

    log_request(&shared, correlation_id, &peer, server_port, &head);
    shared.detector.scan_request(correlation_id, &head).await;
}

async fn write_response(
    write_half: &mut OwnedWriteHalf,
    correlation_id: Uuid,
    server_header: &Option<String>,
) -> std::io::Result<()> {
    let body = format!("{{ \"status\": \"ok\", \"id\": \"{correlation_id}\" }}\n");
    let mut response = String::from("HTTP/1.1 200 OK\r\n");
    if let Some(header) = server_header {
        response.push_str(&format!("Server: {header}\r\n"));
    }
    response.push_str("Content-Type: text/json\r\n");
    response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    response.push_str("Connection: close\r\n\r\n");
    response.push_str(&body);

    write_half.write_all(response.as_bytes()).await
}

fn log_request(
    shared: &Shared,
    correlation_id: Uuid,
    peer: &SocketAddr,
    server_port: u16,
    head: &RequestHead,
) {
    let event = Event::Request {
        timestamp: Utc::now(),
        correlation_id,
        client: peer.ip().to_string(),
        client_port: peer.port(),
        server_port,
        request: head.request_line.clone(),
        headers: head.headers.clone(),
    };
    if let Err(e) = shared.sink.append(&event) {
        warn!(%correlation_id, error = %e, "failed to append request event");
    }
}
