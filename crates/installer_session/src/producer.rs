use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::{
    io::AsyncWriteExt,
    process::ChildStdin,
    sync::{mpsc, Notify},
};
use tracing::debug;

const WAKE_INTERVAL: Duration = Duration::from_secs(1);

/// Queues byte chunks for delivery to the child's stdin in enqueue order.
///
/// A background task wakes on a 1-second timer or immediately when
/// `send_input` is called, drains whatever is queued, and flushes after any
/// chunk containing a `0x0A` byte. Enqueues after the session has
/// terminated are silently discarded.
pub struct InputProducer {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    wake: Arc<Notify>,
    terminated: Arc<AtomicBool>,
}

impl InputProducer {
    pub(crate) fn spawn(mut stdin: ChildStdin) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
        let wake = Arc::new(Notify::new());
        let terminated = Arc::new(AtomicBool::new(false));

        let task_wake = wake.clone();
        let task_terminated = terminated.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_wake.notified() => {}
                    _ = tokio::time::sleep(WAKE_INTERVAL) => {}
                }

                let mut flush_needed = false;
                let mut write_failed = false;
                while let Ok(chunk) = receiver.try_recv() {
                    if let Err(err) = stdin.write_all(&chunk).await {
                        debug!(?err, "failed writing queued input to installer stdin");
                        write_failed = true;
                        break;
                    }
                    if chunk.contains(&0x0A) {
                        flush_needed = true;
                    }
                }
                if flush_needed {
                    let _ = stdin.flush().await;
                }
                if write_failed {
                    task_terminated.store(true, Ordering::Release);
                }

                if task_terminated.load(Ordering::Acquire) {
                    let _ = stdin.flush().await;
                    break;
                }
            }
        });

        Self {
            sender,
            wake,
            terminated,
        }
    }

    /// Enqueues `bytes` for delivery to the child's stdin. Never blocks.
    /// Silently discarded if the session has already terminated.
    pub fn send_input(&self, bytes: &[u8]) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        if self.sender.send(bytes.to_vec()).is_ok() {
            self.wake.notify_one();
        }
    }

    /// Marks the producer terminated, forcing the background task to flush
    /// whatever is queued and exit. Called once the session observes the
    /// child's exit.
    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    async fn spawn_cat() -> tokio::process::Child {
        Command::new("cat")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn cat")
    }

    #[tokio::test]
    async fn enqueues_after_termination_are_discarded_without_error() {
        let mut child = spawn_cat().await;
        let stdin = child.stdin.take().unwrap();
        let producer = InputProducer::spawn(stdin);
        producer.mark_terminated();
        // Should not panic or block.
        producer.send_input(b"ignored\n");
        let _ = child.kill().await;
    }
}
