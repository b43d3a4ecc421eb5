use std::sync::Arc;
use std::time::Duration;

use tokio::{io::AsyncRead, io::AsyncReadExt, sync::broadcast, task::JoinHandle};
use tracing::debug;

use crate::{buffer::RawOutputBuffer, events::SessionEvent};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(20);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);
const POLL_STEP: Duration = Duration::from_millis(10);
const READ_CHUNK_SIZE: usize = 8192;

/// The two background tasks [`spawn`] starts: the reader loop that polls
/// `reader` and the forwarder that broadcasts what it read. Both must be
/// awaited via [`ConsumerHandle::join`] before a caller treats the stream as
/// fully drained — the reader hitting EOF only means no more bytes will be
/// queued, not that every queued chunk has been broadcast yet.
pub(crate) struct ConsumerHandle {
    reader: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Waits for the reader to reach EOF and then for the forwarder to
    /// broadcast every chunk the reader queued, in that order. The forwarder
    /// only returns once its channel is closed, which happens exactly when
    /// the reader task (the channel's sole sender) has exited — so this
    /// establishes the happens-before edge between the last `Output` event
    /// and whatever the caller does next (original §5).
    pub(crate) async fn join(self) {
        let _ = self.reader.await;
        let _ = self.forwarder.await;
    }
}

/// Spawns a poller over `reader` (the child's stdout, or its stderr when
/// `include_stderr` is set) and its event-emitting worker, returning both
/// task handles bundled as a [`ConsumerHandle`].
///
/// Both streams append into the same [`RawOutputBuffer`] and the same
/// `Output` event stream; stdout and stderr bytes interleave in whatever
/// order the two pollers happen to read them, not in any source-labeled
/// order, since the Raw Output Buffer has no concept of a stream origin.
///
/// The poller races a `tokio::time::timeout` against `reader.read`, shrinking
/// the timeout by half on every chunk received and growing it by 10ms on
/// every empty poll, bounded to `[20ms, 100ms]`. Broadcasting each chunk
/// happens on a separate task fed over an unbounded channel, so a slow
/// subscriber can never stall the read loop; the channel's sender lives only
/// inside the reader task, so the forwarder drains to completion and exits
/// on its own once the reader does.
pub(crate) fn spawn<R>(
    mut reader: R,
    buffer: Arc<RawOutputBuffer>,
    events: broadcast::Sender<SessionEvent>,
) -> ConsumerHandle
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();

    let forwarder = tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            let _ = events.send(SessionEvent::Output(Arc::from(data.into_boxed_slice())));
        }
    });

    let reader = tokio::spawn(async move {
        let mut interval = MAX_POLL_INTERVAL;
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match tokio::time::timeout(interval, reader.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    let data = chunk[..n].to_vec();
                    buffer.append(&data);
                    let _ = tx.send(data);
                    interval = halve(interval);
                }
                Ok(Err(err)) => {
                    debug!(?err, "error reading installer output");
                    break;
                }
                Err(_elapsed) => {
                    interval = grow(interval);
                }
            }
        }
    });

    ConsumerHandle { reader, forwarder }
}

fn halve(interval: Duration) -> Duration {
    let next = interval / 2;
    if next < MIN_POLL_INTERVAL {
        MIN_POLL_INTERVAL
    } else {
        next
    }
}

fn grow(interval: Duration) -> Duration {
    let next = interval + POLL_STEP;
    if next > MAX_POLL_INTERVAL {
        MAX_POLL_INTERVAL
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halve_never_drops_below_minimum() {
        let mut interval = MAX_POLL_INTERVAL;
        for _ in 0..10 {
            interval = halve(interval);
        }
        assert_eq!(interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn grow_never_exceeds_maximum() {
        let mut interval = MIN_POLL_INTERVAL;
        for _ in 0..20 {
            interval = grow(interval);
        }
        assert_eq!(interval, MAX_POLL_INTERVAL);
    }
}
