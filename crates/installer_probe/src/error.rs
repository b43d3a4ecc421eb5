use thiserror::Error;

/// Errors surfaced by the metadata probe and the binary identity gate.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("argv must be non-empty and its first element must be non-empty")]
    InvalidArguments,
    #[error("failed to spawn installer process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("no candidate installer binary passed validation")]
    BinaryNotFound,
    #[error("candidate binary hash is not present in the allow-list")]
    BinaryNotAllowed,
    #[error("duplicate fingerprint in allow-list")]
    DuplicateFingerprint,
    #[error("probe invocation timed out")]
    Timeout,
    #[error("installer output did not match the expected pattern: {0}")]
    ParseFailure(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session error: {0}")]
    Session(#[from] installer_session::SessionError),
    #[error("malformed allow-list JSON: {0}")]
    AllowListJson(serde_json::Error),
    #[error("malformed component listing JSON: {0}")]
    ComponentJson(#[source] serde_json::Error),
    #[error("duplicate component number {0} in installer component listing")]
    DuplicateComponentId(u32),
}
