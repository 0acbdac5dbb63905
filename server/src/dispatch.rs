//! Routes an accepted connection to the right session handler by method and path.
//!
//! Grounded on `original_source/src/server/server.go`'s `handler` dispatch rules and
//! `server/src/quic/connection_manager.rs`'s per-connection task shape (substituting
//! `TcpStream` for the QUIC connection handle this relay has no use for).

use std::net::SocketAddr;
use std::sync::Arc;

use icy_core::{log_error, log_warn, RelayError, ServerState};
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::http::{write_status_line, HttpRequest};
use crate::session::{listener, metadata, source};

/// The configured path that routes to the metadata updater, mirroring the original
/// `metadataCommand` config option (`"metadata"` by default, fixed here since this relay's
/// configuration does not expose it as a separate knob).
const METADATA_COMMAND: &str = "metadata";

/// Reads one request off `socket` and dispatches it to a session handler.
pub async fn dispatch(socket: TcpStream, peer: SocketAddr, state: Arc<ServerState>) {
    let mut reader = BufReader::new(socket);

    let req = match HttpRequest::parse(&mut reader).await {
        Ok(req) => req,
        Err(err) => {
            log_warn!(peer = %peer, error = %err, "failed to parse request");
            let _ = write_status_line(&mut reader, err.status_code(), err.reason_phrase()).await;
            return;
        }
    };

    let result = match req.method.as_str() {
        "SOURCE" | "PUT" => {
            let mount_name = req.mount_name().to_string();
            match state.mount(&mount_name) {
                Some(mount) => source::handle(reader, peer, req, mount, state.clone()).await,
                None => {
                    let _ = write_status_line(&mut reader, 404, "Not Found").await;
                    Err(RelayError::UnknownMount(mount_name))
                }
            }
        }
        "GET" if req.mount_name() == METADATA_COMMAND
            && req.query_param("mode").as_deref() == Some("updinfo") =>
        {
            metadata::handle(reader, peer, req, state.clone()).await
        }
        "GET" => {
            let mount_name = req.mount_name().to_string();
            match state.mount(&mount_name) {
                Some(mount) => listener::handle(reader, peer, req, mount, state.clone()).await,
                None => {
                    let _ = write_status_line(&mut reader, 404, "Not Found").await;
                    Err(RelayError::UnknownMount(mount_name))
                }
            }
        }
        other => {
            let _ = write_status_line(&mut reader, 400, "Bad Request").await;
            Err(RelayError::Protocol(format!("unsupported method {other}")))
        }
    };

    if let Err(err) = result {
        log_error!(peer = %peer, error = %err, "session ended with error");
    }
}
