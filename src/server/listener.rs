//! Connection Listener
//!
//! Accept loop over a unix-domain socket (preferred) or TCP, with one
//! spawned task per connection. Each connection reads newline-delimited
//! JSON requests and writes one response line per request; malformed JSON
//! gets an error response and the connection closes.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::ServerConfig;
use crate::models::{WireRequest, WireResponse};
use crate::server::commands;

/// Binds the configured transport and serves connections until the task
/// is cancelled.
pub async fn serve(cache: Cache, config: ServerConfig) -> std::io::Result<()> {
    if use_tcp(&config) {
        serve_tcp(cache, &config.tcp_addr).await
    } else {
        #[cfg(unix)]
        {
            serve_unix(cache, &config.socket_path).await
        }
        #[cfg(not(unix))]
        {
            serve_tcp(cache, &config.tcp_addr).await
        }
    }
}

fn use_tcp(config: &ServerConfig) -> bool {
    config.force_tcp || cfg!(not(unix))
}

#[cfg(unix)]
async fn serve_unix(cache: Cache, path: &std::path::Path) -> std::io::Result<()> {
    // A previous run may have left the socket file behind
    let _ = std::fs::remove_file(path);
    let listener = tokio::net::UnixListener::bind(path)?;
    info!(path = %path.display(), "listening on unix socket");
    loop {
        let (stream, _) = listener.accept().await?;
        let cache = cache.clone();
        tokio::spawn(async move {
            handle_connection(cache, stream).await;
        });
    }
}

async fn serve_tcp(cache: Cache, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "listening on tcp");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "connection accepted");
        let cache = cache.clone();
        tokio::spawn(async move {
            handle_connection(cache, stream).await;
        });
    }
}

/// Serves one connection until the client disconnects or sends a line
/// that does not parse.
pub async fn handle_connection<S>(cache: Cache, stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WireRequest>(&line) {
                    Ok(request) => {
                        let response = commands::dispatch(&cache, request);
                        if write_response(&mut write_half, &response).await.is_err() {
                            debug!("client went away mid-response");
                            break;
                        }
                    }
                    Err(e) => {
                        let response =
                            WireResponse::failure(format!("malformed request: {}", e));
                        let _ = write_response(&mut write_half, &response).await;
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "connection read failed");
                break;
            }
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &WireResponse,
) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}
