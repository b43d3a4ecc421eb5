use std::sync::Mutex;

/// Append-only accumulator for everything an installer process has written
/// to stdout (and, when requested, stderr) since the session started.
///
/// The invariant this type exists to hold: the buffer always equals the
/// concatenation of every chunk appended so far. It is never truncated
/// during a session; a new session gets a new buffer.
#[derive(Default)]
pub struct RawOutputBuffer {
    bytes: Mutex<Vec<u8>>,
}

impl RawOutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` to the end of the buffer.
    pub fn append(&self, chunk: &[u8]) {
        let mut bytes = self.bytes.lock().expect("RawOutputBuffer mutex poisoned");
        bytes.extend_from_slice(chunk);
    }

    /// Returns a clone of everything accumulated so far.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().expect("RawOutputBuffer mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().expect("RawOutputBuffer mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
