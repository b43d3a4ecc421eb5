use std::{
    ffi::OsString,
    path::PathBuf,
    process::ExitStatus,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex,
    },
};

use tokio::{
    process::Child,
    sync::{broadcast, Mutex as AsyncMutex},
};
use tracing::debug;

use crate::{
    buffer::RawOutputBuffer,
    consumer,
    decoder::{Charset, DecodePolicy, StreamingDecoder},
    error::SessionError,
    events::SessionEvent,
    process::build_command,
    producer::InputProducer,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Starting,
    Running,
    Terminated,
    Failed,
}

/// Owns one installer child process end to end: spawning it, pumping its
/// stdin/stdout, and exposing its lifecycle as a broadcast event stream.
///
/// `start()` may only be called once; every later call returns
/// `AlreadyStarted`. The session transitions `Idle -> Starting -> Running ->
/// Terminated` on a clean exit, or `-> Failed` if waiting on the child itself
/// errors.
pub struct ProcessSession {
    argv: Vec<OsString>,
    working_dir: Option<PathBuf>,
    include_stderr: bool,
    state: StdMutex<SessionState>,
    started: AtomicBool,
    running: AtomicBool,
    buffer: Arc<RawOutputBuffer>,
    decoder: Arc<AsyncMutex<StreamingDecoder>>,
    events: broadcast::Sender<SessionEvent>,
    producer: StdMutex<Option<InputProducer>>,
    child: AsyncMutex<Option<Child>>,
}

impl ProcessSession {
    /// `argv[0]` is the installer binary; `argv` must be non-empty with a
    /// non-empty first element.
    pub fn new(
        working_dir: Option<PathBuf>,
        argv: Vec<OsString>,
        include_stderr: bool,
    ) -> Result<Arc<Self>, SessionError> {
        if argv.is_empty() || argv[0].is_empty() {
            return Err(SessionError::InvalidArguments);
        }
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self {
            argv,
            working_dir,
            include_stderr,
            state: StdMutex::new(SessionState::Idle),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            buffer: Arc::new(RawOutputBuffer::new()),
            decoder: Arc::new(AsyncMutex::new(StreamingDecoder::new(
                Charset::Utf8,
                DecodePolicy::Replace,
            ))),
            events,
            producer: StdMutex::new(None),
            child: AsyncMutex::new(None),
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the Raw Output Buffer: every byte received from the child
    /// so far, undecoded. At any point in time this is a prefix of the full
    /// byte stream the child eventually writes.
    pub fn get_output(&self) -> Vec<u8> {
        self.buffer.snapshot()
    }

    /// Decoded text mirror maintained by the streaming decoder under the
    /// currently selected charset.
    pub async fn decoded_text(&self) -> String {
        self.decoder.lock().await.mirror_text().to_string()
    }

    pub async fn set_charset(&self, charset: Charset) -> Result<(), SessionError> {
        self.decoder.lock().await.set_charset(charset)
    }

    pub async fn set_decode_policy(&self, policy: DecodePolicy) -> Result<(), SessionError> {
        self.decoder.lock().await.set_policy(policy)
    }

    /// Spawns the installer process, starts its I/O pumps, and resolves once
    /// the child exits. Other methods (`send_input`, `get_output`, `kill`,
    /// ...) remain usable from other task handles on the same `Arc` while
    /// this future is still pending.
    pub async fn start(self: &Arc<Self>) -> Result<ExitStatus, SessionError> {
        {
            let mut state = self.state.lock().expect("session state mutex poisoned");
            if *state != SessionState::Idle {
                return Err(SessionError::AlreadyStarted);
            }
            *state = SessionState::Starting;
        }
        self.started.store(true, Ordering::Release);

        let mut command =
            build_command(&self.argv, self.working_dir.as_ref(), self.include_stderr);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                *self.state.lock().expect("session state mutex poisoned") =
                    SessionState::Failed;
                return Err(SessionError::Spawn(err));
            }
        };

        let stdin = child.stdin.take().ok_or(SessionError::StdinUnavailable)?;
        let stdout = child.stdout.take().ok_or(SessionError::StdoutUnavailable)?;
        let stderr = if self.include_stderr {
            Some(child.stderr.take().ok_or(SessionError::StdoutUnavailable)?)
        } else {
            None
        };

        let producer = InputProducer::spawn(stdin);
        *self.producer.lock().expect("producer mutex poisoned") = Some(producer);

        let stdout_poller = consumer::spawn(stdout, self.buffer.clone(), self.events.clone());
        let stderr_poller =
            stderr.map(|stderr| consumer::spawn(stderr, self.buffer.clone(), self.events.clone()));
        self.spawn_decode_worker();

        {
            let mut state = self.state.lock().expect("session state mutex poisoned");
            *state = SessionState::Running;
        }
        self.running.store(true, Ordering::Release);
        let _ = self.events.send(SessionEvent::Started);

        *self.child.lock().await = Some(child);

        // Output reaches EOF once the child closes stdout/stderr, which
        // normally precedes the wait()-observable exit by very little.
        // `ConsumerHandle::join` waits for both the reader and its broadcast
        // forwarder, so every `Output` event for this stream has already
        // been sent before we move on — the happens-before edge `reap()`
        // depends on to fire `Terminated` only after the last `Output`.
        stdout_poller.join().await;
        if let Some(stderr_poller) = stderr_poller {
            stderr_poller.join().await;
        }
        self.reap().await
    }

    /// Subscribes to its own event stream and feeds every output chunk
    /// through the streaming decoder, keeping `decoded_text()` current
    /// without coupling the decoder to the I/O poller itself.
    fn spawn_decode_worker(self: &Arc<Self>) {
        let decoder = self.decoder.clone();
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(SessionEvent::Output(bytes)) => {
                        let mut decoder = decoder.lock().await;
                        if let Err(err) = decoder.decode(&bytes) {
                            debug!(?err, "failed to decode installer output chunk");
                        }
                    }
                    Ok(SessionEvent::Terminated(_)) => break,
                    Ok(SessionEvent::Started) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "decode worker lagged behind output events");
                    }
                }
            }
        });
    }

    async fn reap(self: &Arc<Self>) -> Result<ExitStatus, SessionError> {
        let mut guard = self.child.lock().await;
        let result = if let Some(child) = guard.as_mut() {
            child.wait().await.map_err(SessionError::Wait)
        } else {
            Err(SessionError::StdoutUnavailable)
        };
        drop(guard);

        self.running.store(false, Ordering::Release);
        if let Some(producer) = self
            .producer
            .lock()
            .expect("producer mutex poisoned")
            .as_ref()
        {
            producer.mark_terminated();
        }

        {
            let mut state = self.state.lock().expect("session state mutex poisoned");
            *state = match &result {
                Ok(_) => SessionState::Terminated,
                Err(_) => SessionState::Failed,
            };
        }

        if let Ok(status) = result {
            let _ = self.events.send(SessionEvent::Terminated(status));
        }

        result
    }

    /// Enqueues `bytes` for delivery to the installer's stdin. A silent
    /// no-op once the session has terminated.
    pub fn send_input(&self, bytes: &[u8]) {
        if let Some(producer) = self
            .producer
            .lock()
            .expect("producer mutex poisoned")
            .as_ref()
        {
            producer.send_input(bytes);
        }
    }

    /// Forcibly kills the child process, if it is still running.
    pub async fn kill(&self) -> Result<(), SessionError> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            child.kill().await.map_err(SessionError::Kill)?;
        }
        Ok(())
    }
}
