//! Turns the inbound half of a connection into a sequence of message lines.
//!
//! A single background task owns the read half. Every read of at least
//! [`MIN_LINE_BYTES`] bytes becomes one line; shorter reads are dropped. The
//! sequence ends (the receiver yields `None`) on end-of-stream or on the first
//! read error, after which the connection is not read again.

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, warn};

/// Size of the buffer handed to each read.
pub const READ_CHUNK_SIZE: usize = 1028;

/// Reads shorter than this are treated as stray packets and never forwarded.
pub const MIN_LINE_BYTES: usize = 2;

const LINE_TERMINATOR: &str = "\r\n";

pub struct LineReader {
    lines: mpsc::Receiver<String>,
    task: JoinHandle<()>,
}

impl LineReader {
    pub fn spawn<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        // Single-slot handoff: the read task waits until the previous line is consumed.
        let (tx, lines) = mpsc::channel(1);
        let task = tokio::spawn(read_lines(reader, tx));
        Self { lines, task }
    }

    /// Next decoded line, or `None` once the connection is closed.
    ///
    /// Cancel safe, so it can sit in a `select!` branch.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        // Releases the read half even if the peer never sends another byte.
        self.task.abort();
    }
}

async fn read_lines<R>(mut reader: R, lines: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("connection reached end of stream");
                return;
            }
            Ok(n) => {
                let Some(line) = decode_chunk(&buf[..n]) else {
                    continue;
                };
                if lines.send(line).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(error = ?err, "failed to read from connection");
                return;
            }
        }
    }
}

/// Decodes one read into a message line.
///
/// Returns `None` for reads below [`MIN_LINE_BYTES`]. A single trailing
/// `\r\n` is stripped; invalid UTF-8 is replaced rather than rejected.
pub fn decode_chunk(chunk: &[u8]) -> Option<String> {
    if chunk.len() < MIN_LINE_BYTES {
        return None;
    }
    let text = String::from_utf8_lossy(chunk);
    let line = text.strip_suffix(LINE_TERMINATOR).unwrap_or(&text);
    Some(line.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{io::AsyncWriteExt, time::timeout};

    use super::*;

    #[test]
    fn short_reads_are_dropped() {
        assert_eq!(decode_chunk(b""), None);
        assert_eq!(decode_chunk(b"x"), None);
        assert_eq!(decode_chunk(b"\n"), None);
    }

    #[test]
    fn strips_one_trailing_crlf() {
        assert_eq!(decode_chunk(b"hi\r\n").as_deref(), Some("hi"));
        assert_eq!(decode_chunk(b"hi\r\n\r\n").as_deref(), Some("hi\r\n"));
        assert_eq!(decode_chunk(b"\r\n").as_deref(), Some(""));
    }

    #[test]
    fn bare_newline_is_kept() {
        assert_eq!(decode_chunk(b"hi\n").as_deref(), Some("hi\n"));
        assert_eq!(decode_chunk(b"hi").as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn yields_lines_then_closes_on_eof() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = LineReader::spawn(server);

        client.write_all(b"hello\r\n").await.expect("write");
        let first = timeout(Duration::from_secs(1), reader.next_line())
            .await
            .expect("line in time");
        assert_eq!(first.as_deref(), Some("hello"));

        client.write_all(b"world").await.expect("write");
        let second = timeout(Duration::from_secs(1), reader.next_line())
            .await
            .expect("line in time");
        assert_eq!(second.as_deref(), Some("world"));

        drop(client);
        let end = timeout(Duration::from_secs(1), reader.next_line())
            .await
            .expect("close in time");
        assert_eq!(end, None);
    }
}
