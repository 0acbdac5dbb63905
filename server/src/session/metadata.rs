//! Metadata updates: `GET /<metadata-command>?mode=updinfo&mount=<name>&song=<text>`.

use std::net::SocketAddr;
use std::sync::Arc;

use icy_core::{RelayError, ServerState};
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::access_log::log_metadata_update;
use crate::http::{write_status_line, HttpRequest};

/// Handles one metadata-update request.
pub async fn handle(
    mut reader: BufReader<TcpStream>,
    peer: SocketAddr,
    req: HttpRequest,
    state: Arc<ServerState>,
) -> Result<(), RelayError> {
    let mount_name = req
        .query_param("mount")
        .ok_or_else(|| RelayError::Protocol("metadata update missing mount param".into()))?;

    let Some(mount) = state.mount(&mount_name) else {
        write_status_line(&mut reader, 404, "Not Found").await?;
        return Err(RelayError::UnknownMount(mount_name));
    };

    let song = req.query_param_bytes("song").unwrap_or_default();
    match mount.update_meta(&req.credentials(), &song) {
        Ok(()) => {
            log_metadata_update(&mount.name, peer, &mount.title());
            write_status_line(&mut reader, 200, "OK").await?;
            Ok(())
        }
        Err(err) => {
            write_status_line(&mut reader, err.status_code(), err.reason_phrase()).await?;
            Err(err)
        }
    }
}
