use thiserror::Error;

/// Errors surfaced by IPC framing, the single-instance server, and its client.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IPC line did not begin with the `wit` magic identifier")]
    InvalidFraming,
    #[error("unrecognized IPC message type code {0}")]
    UnsupportedType(u32),
    #[error("IPC content field count below the declared minimum arity")]
    ArityMismatch,
    #[error("IPC content field contains an embedded newline, which the wire format cannot carry")]
    EmbeddedNewline,
    #[error("no port in the configured range was available to bind")]
    NoPortAvailable,
    #[error("IPC operation timed out")]
    Timeout,
    #[error("IPC line exceeded the maximum line length ({0} bytes)")]
    LineTooLong(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
