// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Line Reassembly
//!
//! Turns a non-blocking byte stream into complete `\n`-terminated lines, no matter
//! how the peer's writes were fragmented on the wire.
//!
//! ```text
//! "simple | e1 | 00:0" + "0:01:000000 | A\nsimple | e2" → ["simple | e1 | 00:00:01:000000 | A"]
//! ```
//!
//! Bytes after the last delimiter stay buffered until the next [`LineReader::pull`].

use std::io::{self, ErrorKind, Read};

pub const LINE_DELIMITER: u8 = b'\n';
const READ_CHUNK_SIZE: usize = 4096;
/// Reads per `pull`, so one busy peer cannot starve the others
const MAX_READS_PER_PULL: usize = 16;

/// A byte stream that can be read without blocking.
///
/// `try_read` follows the usual contract: `Ok(0)` is end-of-stream and
/// `ErrorKind::WouldBlock` means no data is available right now.
pub trait ByteSource {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl ByteSource for tokio::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }
}

/// Requires the stream to be in non-blocking mode.
impl ByteSource for std::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}

/// Reassembles lines from a [`ByteSource`]
#[derive(Debug)]
pub struct LineReader<S> {
    source: S,
    buffer: Vec<u8>,
    /// Bytes before this offset are known to contain no delimiter
    scanned: usize,
    exhausted: bool,
    /// Read error held back until the lines read before it were returned
    pending_error: Option<io::Error>,
}

impl<S: ByteSource> LineReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::with_capacity(READ_CHUNK_SIZE),
            scanned: 0,
            exhausted: false,
            pending_error: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Whether the next [`pull`](Self::pull) has something to report without
    /// waiting for the source to become readable
    pub fn has_pending(&self) -> bool {
        self.pending_error.is_some()
    }

    /// Read everything currently available and return the lines completed by it.
    ///
    /// * `Ok(Some(lines))` - complete lines, delimiter removed; empty when no line
    ///   has been completed yet
    /// * `Ok(None)` - the stream has ended and nothing is left to return
    ///
    /// When the stream ends with an unterminated fragment, that fragment is returned
    /// once as the last line. A read error that follows complete lines is returned
    /// by the next call. At most `MAX_READS_PER_PULL` reads are made per call.
    pub fn pull(&mut self) -> io::Result<Option<Vec<String>>> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        if self.exhausted {
            return Ok(None);
        }

        let mut lines = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut end_of_stream = false;
        for _ in 0..MAX_READS_PER_PULL {
            match self.source.try_read(&mut chunk) {
                Ok(0) => {
                    end_of_stream = true;
                    break;
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    self.take_complete_lines(&mut lines);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if lines.is_empty() => return Err(e),
                Err(e) => {
                    self.pending_error = Some(e);
                    break;
                }
            }
        }

        if end_of_stream {
            self.exhausted = true;
            if !self.buffer.is_empty() {
                lines.push(String::from_utf8_lossy(&self.buffer).into_owned());
                self.buffer.clear();
                self.scanned = 0;
            }
            if lines.is_empty() {
                return Ok(None);
            }
        }
        Ok(Some(lines))
    }

    fn take_complete_lines(&mut self, lines: &mut Vec<String>) {
        let mut start = 0;
        for i in self.scanned..self.buffer.len() {
            if self.buffer[i] == LINE_DELIMITER {
                lines.push(String::from_utf8_lossy(&self.buffer[start..i]).into_owned());
                start = i + 1;
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
    }
}
