//! Minimal HTTP/1.0 request-line and header parsing over a raw socket.
//!
//! Deliberately not built on `axum`: the wire protocol needs a non-standard method
//! (`SOURCE`) and, once headers are read, to stop being treated as HTTP at all and become a
//! raw byte pipe with its own write-deadline and framing rules. That "hijack" doesn't map
//! cleanly onto a `Request`/`Response` body abstraction, so this module reads exactly the
//! request line and headers (nothing more) and hands the still-open socket back to the
//! caller.

use std::collections::HashMap;
use std::io;

use base64::Engine;
use icy_core::mount::Credentials;
use icy_core::RelayError;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};

/// A parsed request line plus headers, stopping at the blank line that ends the header block.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method, upper-cased (`GET`, `PUT`, `SOURCE`, ...).
    pub method: String,
    /// Decoded path, without the query string.
    pub path: String,
    /// Raw (not percent-decoded) query string, without the leading `?`.
    pub query: String,
    /// Headers, keyed by lower-cased name.
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Reads a request line and headers from `reader`, stopping at the first blank line.
    pub async fn parse<R: AsyncRead + Unpin>(
        reader: &mut BufReader<R>,
    ) -> Result<Self, RelayError> {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(RelayError::Io)?;
        if n == 0 {
            return Err(RelayError::Protocol("connection closed before request line".into()));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ' ');
        let method = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Protocol("missing method".into()))?
            .to_uppercase();
        let target = parts
            .next()
            .ok_or_else(|| RelayError::Protocol("missing request target".into()))?;
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (target.to_string(), String::new()),
        };

        let mut headers = HashMap::new();
        loop {
            let mut header_line = String::new();
            let n = reader
                .read_line(&mut header_line)
                .await
                .map_err(RelayError::Io)?;
            if n == 0 {
                return Err(RelayError::Protocol("connection closed mid-headers".into()));
            }
            let header_line = header_line.trim_end_matches(['\r', '\n']);
            if header_line.is_empty() {
                break;
            }
            if let Some((name, value)) = header_line.split_once(':') {
                headers.insert(name.trim().to_lowercase(), value.trim().to_string());
            }
        }

        Ok(Self {
            method,
            path,
            query,
            headers,
        })
    }

    /// Header value by lower-cased name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    /// The mount name, i.e. the path with its leading slash stripped.
    pub fn mount_name(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    /// Parses `Authorization: Basic base64(user:pass)` into [`Credentials`]. Absence of the
    /// header (not a malformed one) is [`Credentials::Absent`], matching the legacy
    /// handshake-probe behavior the spec calls out.
    pub fn credentials(&self) -> Credentials {
        let Some(raw) = self.header("authorization") else {
            return Credentials::Absent;
        };
        let Some(b64) = raw.strip_prefix("Basic ") else {
            return Credentials::Absent;
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(b64) else {
            return Credentials::Absent;
        };
        let Ok(text) = String::from_utf8(decoded) else {
            return Credentials::Absent;
        };
        match text.split_once(':') {
            Some((user, password)) => Credentials::Basic {
                user: user.to_string(),
                password: password.to_string(),
            },
            None => Credentials::Absent,
        }
    }

    /// Looks up `key` in the (un-decoded) query string and percent-decodes its value,
    /// lossily converting to UTF-8. Use [`HttpRequest::query_param_bytes`] for values (like
    /// `song`) that may carry a non-UTF-8 charset and must reach their decoder unmangled.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query_param_bytes(key)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Looks up `key` in the (un-decoded) query string and percent-decodes its value to raw
    /// bytes, without forcing a UTF-8 interpretation.
    pub fn query_param_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            if k == key {
                Some(percent_decode(v))
            } else {
                None
            }
        })
    }
}

/// Writes a minimal HTTP/1.0 status line + headers + trailing blank line.
pub async fn write_status_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u16,
    reason: &str,
) -> io::Result<()> {
    use tokio::io::AsyncWriteExt;
    let head = format!("HTTP/1.0 {status} {reason}\r\n\r\n");
    writer.write_all(head.as_bytes()).await
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn parses_source_request_line_and_headers() {
        let raw = b"SOURCE /RockRadio96 HTTP/1.0\r\nice-bitrate: 128\r\ncontent-type: audio/mpeg\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let req = HttpRequest::parse(&mut reader).await.unwrap();
        assert_eq!(req.method, "SOURCE");
        assert_eq!(req.mount_name(), "RockRadio96");
        assert_eq!(req.header("ice-bitrate"), Some("128"));
        assert_eq!(req.header("content-type"), Some("audio/mpeg"));
    }

    #[tokio::test]
    async fn parses_query_string_and_decodes_values() {
        let raw = b"GET /metadata?mode=updinfo&mount=Main&song=Hello%20World HTTP/1.0\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let req = HttpRequest::parse(&mut reader).await.unwrap();
        assert_eq!(req.query_param("mount").as_deref(), Some("Main"));
        assert_eq!(req.query_param("song").as_deref(), Some("Hello World"));
    }

    #[test]
    fn credentials_absent_without_header() {
        let req = HttpRequest {
            method: "GET".to_string(),
            path: "/mount".to_string(),
            query: String::new(),
            headers: HashMap::new(),
        };
        assert_eq!(req.credentials(), Credentials::Absent);
    }

    #[test]
    fn credentials_decodes_basic_auth() {
        let mut headers = HashMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("source:hunter2");
        headers.insert("authorization".to_string(), format!("Basic {encoded}"));
        let req = HttpRequest {
            method: "SOURCE".to_string(),
            path: "/mount".to_string(),
            query: String::new(),
            headers,
        };
        assert_eq!(
            req.credentials(),
            Credentials::Basic {
                user: "source".to_string(),
                password: "hunter2".to_string()
            }
        );
    }
}
