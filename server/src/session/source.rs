//! Source ingestion: authenticate, then loop reading bit-rate-sized chunks into the mount's
//! page queue.
//!
//! Grounded step for step on `original_source/src/server/protocol.go`'s `writeMount`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use icy_core::mount::AuthOutcome;
use icy_core::{log_error, log_info, log_warn, Mount, RelayError, ServerState};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::access_log::{log_session_end, SessionKind};
use crate::http::{write_status_line, HttpRequest};

use super::{MountClearGuard, SourceAdmissionGuard};

/// Handles one source (`SOURCE`/`PUT`) connection end to end.
pub async fn handle(
    mut reader: BufReader<TcpStream>,
    peer: SocketAddr,
    req: HttpRequest,
    mount: Arc<Mount>,
    state: Arc<ServerState>,
) -> Result<(), RelayError> {
    if !state.try_admit_source() {
        write_status_line(&mut reader, 403, "Forbidden").await?;
        return Err(RelayError::Admission("source limit reached"));
    }
    let _admission = SourceAdmissionGuard(state.clone());
    log_info!(mount = %mount.name, peer = %peer, "source session starting");

    match mount.auth(&req.credentials()) {
        AuthOutcome::Ok => {}
        AuthOutcome::NoCredentials => {
            // Legacy handshake probe: some encoders connect once with no credentials just to
            // check reachability before reconnecting with real ones.
            write_status_line(&mut reader, 200, "OK").await?;
            return Ok(());
        }
        AuthOutcome::Rejected => {
            write_status_line(&mut reader, 401, "Unauthorized").await?;
            return Err(RelayError::Auth(mount.name.clone()));
        }
    }

    if let Err(err) = mount.mark_started() {
        write_status_line(&mut reader, 403, "Forbidden").await?;
        return Err(err);
    }
    let _clear_guard = MountClearGuard(mount.clone());

    apply_source_headers(&mount, &req);

    write_ingestion_headers(&mut reader, &mount).await?;

    let started = Instant::now();
    let mut total_bytes: u64 = 0;
    let read_chunk_size = (mount.bit_rate_kbps as usize * 128).max(1);
    let mut buf = vec![0u8; read_chunk_size];
    let mut idle_iterations: u64 = 0;
    let idle_limit = state.limits.source_idle_timeout_secs.max(1);
    let mut exit_reason = "source disconnected".to_string();

    loop {
        if !state.is_running() {
            exit_reason = "server shutdown".to_string();
            break;
        }

        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                idle_iterations += 1;
                if idle_iterations >= idle_limit {
                    let err = RelayError::SourceIdleTimeout(mount.name.clone());
                    log_warn!(mount = %mount.name, peer = %peer, "{}", err);
                    exit_reason = err.to_string();
                    break;
                }
                0
            }
            Ok(n) => {
                idle_iterations = 0;
                n
            }
            Err(err) => {
                log_warn!(mount = %mount.name, peer = %peer, error = %err, "recoverable read error on source connection");
                continue;
            }
        };

        if n > 0 {
            mount.append(&buf[..n]);
            total_bytes += n as u64;
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        mount.queue.truncate_head_if_oversize();
    }

    log_session_end(
        SessionKind::Source,
        &mount.name,
        peer,
        total_bytes,
        started.elapsed(),
        None,
        &exit_reason,
    );

    Ok(())
}

fn apply_source_headers(mount: &Mount, req: &HttpRequest) {
    let content_type = req.header("content-type").unwrap_or("audio/mpeg").to_string();
    let genre = req.header("ice-genre");
    let description = req.header("ice-description");
    mount.set_source_headers(&content_type, genre, description);

    if let Some(reported) = parse_reported_bit_rate(req) {
        if reported != mount.bit_rate_kbps {
            log_warn!(
                mount = %mount.name,
                configured = mount.bit_rate_kbps,
                reported,
                "source-reported bit-rate differs from configured bit-rate; configured value is authoritative"
            );
        }
    }
}

fn parse_reported_bit_rate(req: &HttpRequest) -> Option<u32> {
    if let Some(raw) = req.header("ice-bitrate") {
        if let Ok(v) = raw.trim().parse() {
            return Some(v);
        }
    }
    if let Some(info) = req.header("ice-audio-info") {
        for field in info.split(';') {
            if let Some(value) = field.trim().strip_prefix("bitrate=") {
                if let Ok(v) = value.trim().parse() {
                    return Some(v);
                }
            }
        }
    }
    None
}

async fn write_ingestion_headers(
    writer: &mut BufReader<TcpStream>,
    mount: &Mount,
) -> Result<(), RelayError> {
    let head = format!(
        "HTTP/1.0 200 OK\r\n\
         Server: {server}\r\n\
         Connection: Keep-Alive\r\n\
         Allow: GET, SOURCE\r\n\
         Cache-Control: no-cache\r\n\
         Pragma: no-cache\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Transfer-Encoding: chunked\r\n\
         \r\n",
        server = icy_core::constants::DEFAULT_SERVER_NAME,
    );
    writer.write_all(head.as_bytes()).await.map_err(|e| {
        log_error!(mount = %mount.name, error = %e, "failed to write source ingestion headers");
        RelayError::Io(e)
    })
}
