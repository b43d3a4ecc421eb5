use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::IpcError;
use crate::framing::{IpcMessage, MessageType};
use crate::line_reader::BoundedLineReader;

const DEFAULT_BASE_PORT: u16 = 50505;
const DEFAULT_PORT_SPAN: u16 = 10;
const DEFAULT_ACCEPT_PERMITS: usize = 20;
const DEFAULT_MAX_LINE_BYTES: usize = 16 * 1024;

/// Callbacks the single-instance server dispatches into. Implemented by the
/// UI-facing controller (`installer_app`); this crate never assumes one.
///
/// Every method schedules work and returns immediately, matching the
/// "observer callbacks never block the I/O critical section" rule from the
/// original concurrency model — none of them are awaited by the accept loop.
pub trait IpcHandler: Send + Sync {
    /// Whether a Process Session is currently Running in this instance.
    /// Drives the `REQ_EXEC` `accepted` decision.
    fn is_session_running(&self) -> bool;
    /// A `REQ_PING` arrived; `bring_to_front` is the sender's hint.
    fn on_ping(&self, bring_to_front: bool);
    /// A `REQ_EXEC` was accepted with a non-empty argv.
    fn on_exec(&self, argv: Vec<String>);
    /// A `REQ_TERM` was received; the response has not yet been sent.
    fn on_terminate(&self);
}

/// Builder for [`IpcServer`], carrying the port range, accept concurrency
/// cap, and line-length bound as explicit tunables.
#[derive(Clone, Debug)]
pub struct IpcServerBuilder {
    base_port: u16,
    port_span: u16,
    accept_permits: usize,
    max_line_bytes: usize,
}

impl Default for IpcServerBuilder {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            port_span: DEFAULT_PORT_SPAN,
            accept_permits: DEFAULT_ACCEPT_PERMITS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl IpcServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// First port tried; `base_port..=base_port + port_span` is the full
    /// range attempted (default `[50505, 50515]`).
    pub fn base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    pub fn port_span(mut self, span: u16) -> Self {
        self.port_span = span;
        self
    }

    /// In-process cap on concurrently handled connections, on top of the
    /// OS accept backlog (default 20, matching original §4.8).
    pub fn accept_permits(mut self, permits: usize) -> Self {
        self.accept_permits = permits;
        self
    }

    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes;
        self
    }

    /// Binds loopback-only, trying `base_port..=base_port + port_span` in
    /// order. Returns [`IpcError::NoPortAvailable`] if every port in the
    /// range is taken; the caller then proceeds as a standalone instance.
    pub async fn try_start(self, handler: Arc<dyn IpcHandler>) -> Result<IpcServer, IpcError> {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut listener = None;
        for offset in 0..=self.port_span {
            let port = self.base_port.saturating_add(offset);
            let addr = SocketAddr::new(loopback, port);
            match TcpListener::bind(addr).await {
                Ok(bound) => {
                    listener = Some(bound);
                    break;
                }
                Err(err) => {
                    debug!(port, ?err, "IPC port unavailable, trying next");
                }
            }
        }
        let listener = listener.ok_or(IpcError::NoPortAvailable)?;
        let local_port = listener.local_addr()?.port();

        let shutdown = Arc::new(Notify::new());
        let semaphore = Arc::new(Semaphore::new(self.accept_permits));
        let max_line_bytes = self.max_line_bytes;
        let task_shutdown = shutdown.clone();

        let accept_task = tokio::spawn(async move {
            accept_loop(listener, handler, semaphore, max_line_bytes, task_shutdown).await;
        });

        Ok(IpcServer {
            local_port,
            shutdown,
            accept_task,
        })
    }
}

/// A running single-instance IPC server.
///
/// Binding to loopback only is structural here: the listener is always
/// constructed against `Ipv4Addr::LOCALHOST`, so it can never be reachable
/// from other hosts.
pub struct IpcServer {
    local_port: u16,
    shutdown: Arc<Notify>,
    accept_task: JoinHandle<()>,
}

impl IpcServer {
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Cooperatively stops the accept loop without waiting for a `REQ_TERM`.
    /// Equivalent, in effect, to the listener-close path original §5
    /// describes for `REQ_TERM`: the loop observes the shutdown request at
    /// its next `select!` wakeup and exits instead of accepting again.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn join(self) {
        let _ = self.accept_task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn IpcHandler>,
    semaphore: Arc<Semaphore>,
    max_line_bytes: usize,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("IPC accept loop shutting down cooperatively");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let Ok(permit) = semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        let handler = handler.clone();
                        let connection_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(err) =
                                handle_connection(stream, &*handler, max_line_bytes, &connection_shutdown).await
                            {
                                debug!(?err, "IPC connection ended with an error");
                            }
                        });
                    }
                    Err(err) => {
                        warn!(?err, "IPC accept loop exiting after a fatal accept-side error");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    handler: &dyn IpcHandler,
    max_line_bytes: usize,
    shutdown: &Notify,
) -> Result<(), IpcError> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BoundedLineReader::new(read_half, max_line_bytes);

    let Some(line) = reader.read_line().await? else {
        return Ok(());
    };

    let request = match IpcMessage::decode(&line) {
        Ok(message) => message,
        Err(err) => {
            debug!(?err, "rejected a malformed IPC request");
            return Err(err);
        }
    };

    let response = match request.message_type {
        MessageType::ReqPing => {
            let bring_to_front = request.bool_content(0).unwrap_or(false);
            handler.on_ping(bring_to_front);
            IpcMessage::ack_ping()
        }
        MessageType::ReqExec => {
            let accepted = !handler.is_session_running();
            if accepted && !request.content.is_empty() {
                handler.on_exec(request.content.clone());
            }
            IpcMessage::ack_exec(accepted)
        }
        MessageType::ReqTerm => {
            handler.on_terminate();
            IpcMessage::ack_term()
        }
        other => {
            debug!(?other, "IPC server received a response-only message type as a request");
            return Err(IpcError::UnsupportedType(other.code()));
        }
    };

    let is_term = response.message_type == MessageType::AckTerm;
    let wire = response.encode()?;
    write_half.write_all(wire.as_bytes()).await?;
    write_half.flush().await?;

    if is_term {
        shutdown.notify_one();
    }

    Ok(())
}
