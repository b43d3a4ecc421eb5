use thiserror::Error;

/// Aggregate error type for the composition root, wrapping each leaf crate's
/// own taxonomy plus the handful of errors that only make sense once they're
/// wired together (binary identity, startup validation).
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] installer_session::SessionError),
    #[error(transparent)]
    Probe(#[from] installer_probe::ProbeError),
    #[error(transparent)]
    Ipc(#[from] installer_ipc::IpcError),
    #[error("no candidate installer binary passed validation")]
    BinaryNotFound,
    #[error("installer binary hash is not present in the allow-list")]
    BinaryNotAllowed,
    #[error("a process session is already running in this instance")]
    SessionAlreadyRunning,
}
