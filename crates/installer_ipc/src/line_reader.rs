use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::IpcError;

const CHUNK_SIZE: usize = 4096;

/// Reads newline-terminated lines off an async stream with a bounded line
/// length, so a malformed or malicious peer can't grow an unbounded buffer.
///
/// Narrowed to "read exactly one line" since IPC connections are
/// one-request-one-response and short-lived.
pub struct BoundedLineReader<R> {
    reader: R,
    max_line_bytes: usize,
    buffer: [u8; CHUNK_SIZE],
    buffer_pos: usize,
    buffer_len: usize,
}

impl<R: AsyncRead + Unpin> BoundedLineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
            buffer: [0u8; CHUNK_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
        }
    }

    /// Reads one `\n`-terminated line (the newline itself is not included).
    /// Returns `Ok(None)` on a clean EOF with nothing pending.
    pub async fn read_line(&mut self) -> Result<Option<String>, IpcError> {
        let mut line = Vec::new();
        loop {
            if self.buffer_pos >= self.buffer_len {
                let n = self.reader.read(&mut self.buffer).await?;
                if n == 0 {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                self.buffer_len = n;
                self.buffer_pos = 0;
            }

            let slice = &self.buffer[self.buffer_pos..self.buffer_len];
            match slice.iter().position(|&b| b == b'\n') {
                Some(newline_idx) => {
                    line.extend_from_slice(&slice[..newline_idx]);
                    self.buffer_pos += newline_idx + 1;
                    if line.len() > self.max_line_bytes {
                        return Err(IpcError::LineTooLong(line.len()));
                    }
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                None => {
                    line.extend_from_slice(slice);
                    self.buffer_pos = self.buffer_len;
                    if line.len() > self.max_line_bytes {
                        return Err(IpcError::LineTooLong(line.len()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_single_line_without_the_trailing_newline() {
        let mut reader = BoundedLineReader::new(std::io::Cursor::new(b"wit;9;\nrest".to_vec()), 1024);
        let line = reader.read_line().await.unwrap().unwrap();
        assert_eq!(line, "wit;9;");
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let mut reader = BoundedLineReader::new(std::io::Cursor::new(vec![b'a'; 100]), 10);
        let err = reader.read_line().await.unwrap_err();
        assert!(matches!(err, IpcError::LineTooLong(_)));
    }

    #[tokio::test]
    async fn clean_eof_with_nothing_pending_is_none() {
        let mut reader = BoundedLineReader::new(std::io::Cursor::new(Vec::new()), 1024);
        assert!(reader.read_line().await.unwrap().is_none());
    }
}
