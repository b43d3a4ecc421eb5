use std::{process::ExitStatus, sync::Arc};

/// Events broadcast by a [`crate::session::ProcessSession`] over its lifetime.
///
/// Delivered via `tokio::sync::broadcast`, so every subscriber sees its own
/// copy of the stream from the point it subscribed; none can block another.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started,
    Output(Arc<[u8]>),
    Terminated(ExitStatus),
}
