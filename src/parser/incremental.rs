//! Incremental request parsing.
//!
//! A [`RequestParser`] is fed bytes as they come off the socket, in chunks of any size, and
//! yields a [`HttpRequest`] once the head and the whole `Content-Length` body are buffered.
//! Bytes past the end of a request stay buffered until [`RequestParser::reset`] is called,
//! so pipelined requests are parsed one at a time and in order.

use std::mem;

use log::trace;

use crate::parser::error::Error;
use crate::parser::request::{parse_head, HttpRequest};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Externally visible parser progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the blank line that ends the request head.
    Head,
    /// Head parsed, waiting for the rest of the body.
    Body,
    /// A request was produced and the parser waits for [`RequestParser::reset`].
    Complete,
}

enum Stage {
    Head,
    Body { request: HttpRequest, length: usize },
    Complete,
}

/// Incremental HTTP/1.x request parser.
pub struct RequestParser {
    buffer: Vec<u8>,
    stage: Stage,
    /// Prefix of `buffer` already searched for the head terminator.
    scanned: usize,
    max_size: usize,
}

impl RequestParser {
    /// Create a parser that rejects requests (head plus body) larger than `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            stage: Stage::Head,
            scanned: 0,
            max_size,
        }
    }

    /// Current progress.
    pub fn state(&self) -> ParseState {
        match self.stage {
            Stage::Head => ParseState::Head,
            Stage::Body { .. } => ParseState::Body,
            Stage::Complete => ParseState::Complete,
        }
    }

    /// Number of bytes received but not yet consumed by a completed request.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append `bytes` and advance.
    ///
    /// Returns the request the moment it becomes complete; every later call returns `Ok(None)`
    /// until [`reset`](Self::reset). An error leaves the parser unusable.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<HttpRequest>, Error> {
        self.buffer.extend_from_slice(bytes);

        if matches!(self.stage, Stage::Complete) {
            if self.buffer.len() > self.max_size {
                return Err(Error::RequestTooLarge { limit: self.max_size });
            }
            trace!("buffered {} bytes behind a complete request", bytes.len());
            return Ok(None);
        }

        self.advance()
    }

    /// Start on the next request, parsing whatever is already buffered.
    pub fn reset(&mut self) -> Result<Option<HttpRequest>, Error> {
        self.stage = Stage::Head;
        self.scanned = 0;
        self.advance()
    }

    fn advance(&mut self) -> Result<Option<HttpRequest>, Error> {
        if matches!(self.stage, Stage::Head) && !self.complete_head()? {
            return Ok(None);
        }

        match mem::replace(&mut self.stage, Stage::Complete) {
            Stage::Body { mut request, length } if self.buffer.len() >= length => {
                request.body = self.buffer.drain(..length).collect();
                Ok(Some(request))
            }
            stage => {
                self.stage = stage;
                Ok(None)
            }
        }
    }

    /// Returns `true` once the head has been parsed and the stage moved to `Body`.
    fn complete_head(&mut self) -> Result<bool, Error> {
        // Stray CRLFs between pipelined requests, possibly split across reads
        let skip = self.buffer.chunks(2).take_while(|pair| *pair == b"\r\n").count() * 2;
        if skip > 0 {
            self.buffer.drain(..skip);
            self.scanned = 0;
        }

        let Some(end) = self.find_head_end() else {
            if self.buffer.len() > self.max_size {
                return Err(Error::RequestTooLarge { limit: self.max_size });
            }
            return Ok(false);
        };

        let head_len = end + HEAD_TERMINATOR.len();
        if head_len > self.max_size {
            return Err(Error::RequestTooLarge { limit: self.max_size });
        }

        let head = std::str::from_utf8(&self.buffer[..end]).map_err(|_| Error::InvalidEncoding)?;
        let request = parse_head(head)?;

        if let Some(coding) = request.get_header("Transfer-Encoding") {
            return Err(Error::UnsupportedTransferEncoding(coding.clone()));
        }

        let length = match request.get_header("Content-Length") {
            Some(value) => parse_content_length(value)?,
            None => 0,
        };

        if head_len.saturating_add(length) > self.max_size {
            return Err(Error::RequestTooLarge { limit: self.max_size });
        }

        trace!("parsed head of {} {} ({head_len} bytes, body {length})", request.method, request.path);

        self.buffer.drain(..head_len);
        self.scanned = 0;
        self.stage = Stage::Body { request, length };
        Ok(true)
    }

    fn find_head_end(&mut self) -> Option<usize> {
        // A terminator may straddle the previous scan boundary
        let start = self.scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        let found = self.buffer[start..]
            .windows(HEAD_TERMINATOR.len())
            .position(|window| window == HEAD_TERMINATOR)
            .map(|position| start + position);

        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }
}

fn parse_content_length(value: &str) -> Result<usize, Error> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidContentLength(value.to_string()));
    }
    value.parse().map_err(|_| Error::InvalidContentLength(value.to_string()))
}
