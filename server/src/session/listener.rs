//! Listener delivery: headers, burst-start cursor, paced page delivery with ICY metadata
//! interleaved at a fixed byte stride.
//!
//! The interleaving arithmetic (`no_meta_bytes`/`delta` residue tracking) is a direct port of
//! `original_source/src/server/protocol.go`'s `readMount`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use icy_core::{log_info, log_warn, Mount, Page, PinGuard, RelayError, ServerState};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::access_log::{log_session_end, SessionKind};
use crate::http::HttpRequest;

use super::ListenerAdmissionGuard;

const EMPTY_QUEUE_POLL: Duration = Duration::from_millis(250);

/// Handles one listener (`GET`) connection end to end.
pub async fn handle(
    mut reader: BufReader<TcpStream>,
    peer: SocketAddr,
    req: HttpRequest,
    mount: Arc<Mount>,
    state: Arc<ServerState>,
) -> Result<(), RelayError> {
    if !state.try_admit_listener() {
        crate::http::write_status_line(&mut reader, 403, "Forbidden").await?;
        return Err(RelayError::Admission("listener limit reached"));
    }
    if let Some(max) = mount.max_listeners {
        if mount.listener_count() as u32 >= max {
            crate::http::write_status_line(&mut reader, 403, "Forbidden").await?;
            state.release_listener();
            return Err(RelayError::Admission("mount listener limit reached"));
        }
    }
    let _admission = ListenerAdmissionGuard::new(state.clone(), mount.clone());
    log_info!(mount = %mount.name, peer = %peer, "listener session starting");

    let icy_enabled = req.header(icy_core::constants::ICY_METADATA_HEADER) == Some("1");
    write_listener_headers(&mut reader, &mount, icy_enabled).await?;

    let started = Instant::now();
    let mut total_bytes: u64 = 0;

    let Some(first_page) = mount.queue.start_cursor(mount.burst_size) else {
        log_session_end(
            SessionKind::Listener,
            &mount.name,
            peer,
            0,
            started.elapsed(),
            Some(icy_enabled),
            "empty buffer at connect",
        );
        return Ok(());
    };

    let write_timeout = Duration::from_secs(state.limits.write_timeout_secs.max(1));
    let mut guard = PinGuard::new(first_page);
    let mut no_meta_bytes: usize = 0;
    let mut delta: i64 = 0;
    let mut exit_reason = "listener disconnected".to_string();

    loop {
        if !state.is_running() {
            exit_reason = "server shutdown".to_string();
            break;
        }

        let page = guard.page().clone();
        let write_result = tokio::time::timeout(
            write_timeout,
            deliver_page(&mut reader, &mount, &page, icy_enabled, &mut no_meta_bytes, &mut delta),
        )
        .await;

        let written = match write_result {
            Ok(Ok(written)) => written,
            Ok(Err(err)) => {
                log_warn!(mount = %mount.name, peer = %peer, error = %err, "listener write failed");
                exit_reason = "write error".to_string();
                break;
            }
            Err(_) => {
                let err = RelayError::WriteTimeout;
                log_warn!(mount = %mount.name, peer = %peer, "{}", err);
                exit_reason = err.to_string();
                break;
            }
        };
        total_bytes += written as u64;

        if total_bytes > mount.burst_size as u64 {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let remainder_ms = 1000 - (elapsed_ms % 1000);
            if remainder_ms > 0 && remainder_ms < 1000 {
                tokio::time::sleep(Duration::from_millis(remainder_ms)).await;
            }
        }

        match wait_for_next(&mount, &page, &state).await {
            NextOutcome::Advanced(next_page) => {
                guard = PinGuard::new(next_page);
            }
            NextOutcome::IdleTimeout => {
                let err = RelayError::ListenerIdleTimeout(mount.name.clone());
                log_warn!(mount = %mount.name, peer = %peer, "{}", err);
                exit_reason = err.to_string();
                break;
            }
            NextOutcome::ServerStopped => {
                exit_reason = "server shutdown".to_string();
                break;
            }
        }
    }

    log_session_end(
        SessionKind::Listener,
        &mount.name,
        peer,
        total_bytes,
        started.elapsed(),
        Some(icy_enabled),
        &exit_reason,
    );

    Ok(())
}

enum NextOutcome {
    Advanced(Page),
    IdleTimeout,
    ServerStopped,
}

async fn wait_for_next(mount: &Mount, page: &Page, state: &ServerState) -> NextOutcome {
    let idle_limit_ms = state.limits.empty_buffer_idle_timeout_secs.max(1) * 1000;
    let mut idle_ms: u64 = 0;
    loop {
        if !state.is_running() {
            return NextOutcome::ServerStopped;
        }
        if let Some(next_page) = mount.queue.next(page) {
            return NextOutcome::Advanced(next_page);
        }
        tokio::time::sleep(EMPTY_QUEUE_POLL).await;
        idle_ms += EMPTY_QUEUE_POLL.as_millis() as u64;
        if idle_ms >= idle_limit_ms {
            return NextOutcome::IdleTimeout;
        }
    }
}

/// Writes one page, splicing in the current metadata block if `no_meta_bytes + L + delta`
/// would cross the mount's stride. Returns the number of bytes written (audio + metadata).
async fn deliver_page(
    writer: &mut BufReader<TcpStream>,
    mount: &Mount,
    page: &Page,
    icy_enabled: bool,
    no_meta_bytes: &mut usize,
    delta: &mut i64,
) -> Result<usize, RelayError> {
    let bytes = page.bytes();
    let len = bytes.len();

    if !icy_enabled {
        writer.write_all(bytes).await.map_err(RelayError::Io)?;
        return Ok(len);
    }

    let meta = mount.get_icy_meta();
    let stride = mount.stride as i64;

    if *no_meta_bytes as i64 + len as i64 + *delta > stride {
        let raw_offset = stride - *no_meta_bytes as i64 - *delta;
        let offset = raw_offset.clamp(0, len as i64) as usize;

        writer.write_all(&bytes[..offset]).await.map_err(RelayError::Io)?;
        writer.write_all(meta.bytes()).await.map_err(RelayError::Io)?;
        writer.write_all(&bytes[offset..]).await.map_err(RelayError::Io)?;

        let total_written = len + meta.len();
        *delta = total_written as i64 - offset as i64 - meta.len() as i64;
        *no_meta_bytes = 0;
        Ok(total_written)
    } else {
        writer.write_all(bytes).await.map_err(RelayError::Io)?;
        *no_meta_bytes += len;
        Ok(len)
    }
}

async fn write_listener_headers(
    writer: &mut BufReader<TcpStream>,
    mount: &Mount,
    icy_enabled: bool,
) -> Result<(), RelayError> {
    let mut head = format!(
        "HTTP/1.0 200 OK\r\n\
         Server: {server}\r\n\
         Content-Type: {content_type}\r\n\
         Connection: Keep-Alive\r\n\
         X-Audiocast-Bitrate: {bit_rate}\r\n\
         X-Audiocast-Name: {name}\r\n\
         X-Audiocast-Genre: {genre}\r\n\
         X-Audiocast-Url: {url}\r\n\
         X-Audiocast-Public: 0\r\n\
         X-Audiocast-Description: {description}\r\n",
        server = icy_core::constants::DEFAULT_SERVER_NAME,
        content_type = mount.content_type(),
        bit_rate = mount.bit_rate_kbps,
        name = mount.name,
        genre = mount.genre(),
        url = mount.stream_url(),
        description = mount.description(),
    );
    if icy_enabled {
        head.push_str(&format!("Icy-Metaint: {}\r\n", mount.stride));
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes()).await.map_err(RelayError::Io)
}
