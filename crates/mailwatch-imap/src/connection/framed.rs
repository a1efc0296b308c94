//! Response framing.
//!
//! A response is a CRLF line, and when that line ends in a `{n}` literal
//! announcement, the `n` literal bytes plus the line that follows them,
//! repeated until a line carries no announcement.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

const READ_CHUNK: usize = 8 * 1024;
const MAX_LINE: usize = 1024 * 1024;
const MAX_LITERAL: usize = 100 * 1024 * 1024;

/// A stream split into whole IMAP responses.
pub struct FramedStream<S> {
    io: S,
    buffer: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(io: S) -> Self {
        Self {
            io,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Reads one response with its literals inlined.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on EOF before the response is complete, and on
    /// lines or literals over the size limits.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(len) = complete_response_len(&self.buffer)? {
                let response = self.buffer[..len].to_vec();
                self.buffer.advance(len);
                return Ok(response);
            }

            self.buffer.reserve(READ_CHUNK);
            if self.io.read_buf(&mut self.buffer).await? == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }

    /// Reads responses up to and including the one tagged `tag`.
    ///
    /// # Errors
    ///
    /// See [`FramedStream::read_response`].
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        loop {
            let response = self.read_response().await?;
            let done = is_tagged(&response, tag);
            responses.push(response);
            if done {
                return Ok(responses);
            }
        }
    }

    /// Writes and flushes a serialized command.
    ///
    /// # Errors
    ///
    /// Fails if the write or flush fails.
    pub async fn write_command(&mut self, command: &[u8]) -> Result<()> {
        self.io.write_all(command).await?;
        self.io.flush().await?;
        Ok(())
    }
}

fn is_tagged(response: &[u8], tag: &str) -> bool {
    response
        .strip_prefix(tag.as_bytes())
        .is_some_and(|rest| rest.starts_with(b" "))
}

/// Length of the first complete response in `buf`, `None` if more bytes
/// are needed.
fn complete_response_len(buf: &[u8]) -> Result<Option<usize>> {
    let mut at = 0;
    loop {
        let rest = &buf[at..];
        let Some(crlf) = rest.windows(2).position(|w| w == b"\r\n") else {
            if rest.len() > MAX_LINE {
                return Err(Error::Protocol(format!("line exceeds {MAX_LINE} bytes")));
            }
            return Ok(None);
        };
        let line_end = at + crlf + 2;

        let Some(literal) = parse_literal_length(&buf[at..line_end]) else {
            return Ok(Some(line_end));
        };
        if literal > MAX_LITERAL {
            return Err(Error::Protocol(format!(
                "literal of {literal} bytes exceeds {MAX_LITERAL}"
            )));
        }
        if buf.len() < line_end + literal {
            return Ok(None);
        }
        at = line_end + literal;
    }
}

/// `n` from a line ending in `{n}\r\n` or `{n+}\r\n`.
pub(crate) fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let inner = line.strip_suffix(b"}\r\n")?;
    let inner = inner.strip_suffix(b"+").unwrap_or(inner);
    let open = inner.iter().rposition(|&b| b == b'{')?;
    let digits = &inner[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
