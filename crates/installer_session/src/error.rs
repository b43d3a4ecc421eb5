use std::process::ExitStatus;

use thiserror::Error;

/// Errors surfaced by [`crate::session::ProcessSession`] and the streaming decoder.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("argv must be non-empty and its first element must be non-empty")]
    InvalidArguments,
    #[error("start() was already called on this session")]
    AlreadyStarted,
    #[error("failed to spawn installer process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to wait for installer process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("failed to kill installer process: {0}")]
    Kill(#[source] std::io::Error),
    #[error("failed to write to installer stdin: {0}")]
    StdinWrite(#[source] std::io::Error),
    #[error("installer stdin is unavailable")]
    StdinUnavailable,
    #[error("installer stdout is unavailable")]
    StdoutUnavailable,
    #[error("failed to join background task: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("malformed byte sequence under the active charset")]
    MalformedEncoding,
}

/// Summary of how a [`crate::session::ProcessSession`] ended, echoed on the
/// `Terminated` event and as the resolved value of `start()`'s future.
#[derive(Debug, Clone, Copy)]
pub struct SessionExit {
    pub status: ExitStatus,
}
