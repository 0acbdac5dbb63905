//! Error taxonomy shared by the core library and the server binary.

/// Errors that can surface while serving a mount or loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A listener or source connection was rejected because a configured limit was already
    /// saturated.
    #[error("admission rejected: {0}")]
    Admission(&'static str),

    /// Basic-Auth credentials did not match the mount's configured user/password pair.
    #[error("authentication failed for mount {0}")]
    Auth(String),

    /// A source tried to connect to a mount that already has a live source attached.
    #[error("mount {0} already has a source connected")]
    SourceConflict(String),

    /// The request referenced a mount name that is not in the configured mount table.
    #[error("unknown mount {0}")]
    UnknownMount(String),

    /// A request could not be parsed as a well-formed ICY/HTTP request line or header block.
    #[error("malformed request: {0}")]
    Protocol(String),

    /// A source connection produced no audio for longer than the configured idle timeout.
    #[error("source for mount {0} timed out waiting for audio")]
    SourceIdleTimeout(String),

    /// A listener's buffer stayed empty past the configured idle timeout (typically because
    /// the source dropped without the mount noticing yet).
    #[error("listener on mount {0} timed out waiting for data")]
    ListenerIdleTimeout(String),

    /// A write to a listener socket did not complete within the configured write deadline.
    #[error("write to listener timed out")]
    WriteTimeout,

    /// The on-disk or embedded configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transparent wrapper for I/O failures against sockets or files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Maps this error onto the HTTP status line the server should send back, when the error
    /// occurs before the response has been hijacked.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::Admission(_) => 403,
            RelayError::Auth(_) => 401,
            RelayError::SourceConflict(_) => 403,
            RelayError::UnknownMount(_) => 404,
            RelayError::Protocol(_) => 400,
            RelayError::SourceIdleTimeout(_) => 408,
            RelayError::ListenerIdleTimeout(_) => 408,
            RelayError::WriteTimeout => 408,
            RelayError::Config(_) => 500,
            RelayError::Io(_) => 500,
        }
    }

    /// Short reason phrase paired with [`RelayError::status_code`].
    pub fn reason_phrase(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            408 => "Request Timeout",
            _ => "Internal Server Error",
        }
    }
}
