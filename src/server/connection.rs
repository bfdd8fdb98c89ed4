//! Per-socket connection state.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

use log::{debug, trace};
use mio::net::TcpStream;
use mio::Token;

use crate::parser::{Error as ParserError, HttpRequest, Method, ParseState, RequestParser};
use crate::server::error::Error;
use crate::server::response::HttpResponse;

/// Identifies a connection for as long as the server runs. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) usize);

impl ConnectionId {
    pub(crate) fn token(self) -> Token {
        Token(self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a connection as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no bytes received yet.
    Accepted,
    ParsingHeaders,
    ParsingBody,
    /// A request is complete and waits for a response.
    Complete,
    Closed,
}

/// One accepted socket and the request currently being parsed on it.
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    parser: RequestParser,
    request: Option<HttpRequest>,
    received: bool,
    awaiting_response: bool,
    close_after_flush: bool,
    /// Serialized responses; the first `written` bytes are already on the wire.
    outbound: Vec<u8>,
    written: usize,
    writable: bool,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, stream: TcpStream, peer: SocketAddr, max_request_size: usize) -> Self {
        Self {
            id,
            stream,
            peer,
            parser: RequestParser::new(max_request_size),
            request: None,
            received: false,
            awaiting_response: false,
            close_after_flush: false,
            outbound: Vec::new(),
            written: 0,
            writable: false,
            closed: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed {
            return ConnectionState::Closed;
        }
        if self.awaiting_response {
            return ConnectionState::Complete;
        }
        match self.parser.state() {
            ParseState::Head if !self.received => ConnectionState::Accepted,
            ParseState::Head | ParseState::Complete => ConnectionState::ParsingHeaders,
            ParseState::Body => ConnectionState::ParsingBody,
        }
    }

    /// The most recently completed request, if any.
    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    pub fn request_method(&self) -> Option<Method> {
        self.request.as_ref().map(|request| request.method)
    }

    pub fn request_uri(&self) -> Option<&str> {
        self.request.as_ref().map(|request| request.path.as_str())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Serialize `response` and queue it for writing.
    ///
    /// Only valid while a complete request waits for its answer. The bytes are written by the
    /// reactor as the socket accepts them, after the current callback returns.
    pub fn send_response(&mut self, response: &HttpResponse) -> Result<(), Error> {
        self.check_answerable()?;
        let bytes = response.to_bytes()?;
        self.queue_response(bytes, response.closes_connection())
    }

    /// Close the socket. Idempotent; the reactor removes the connection once control returns to it.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.awaiting_response = false;
        self.outbound.clear();
        self.written = 0;

        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!("shutdown of {} failed: {e}", self.id);
        }
        debug!("connection {} from {} closed", self.id, self.peer);
    }

    fn check_answerable(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::ConnectionClosed(self.id));
        }
        if !self.awaiting_response {
            return Err(Error::RequestNotComplete(self.id));
        }
        Ok(())
    }

    /// Queue an already serialized response.
    pub(crate) fn queue_response(&mut self, bytes: Vec<u8>, close: bool) -> Result<(), Error> {
        self.check_answerable()?;

        trace!("queued {} response bytes on {}", bytes.len(), self.id);
        self.outbound.extend_from_slice(&bytes);
        self.awaiting_response = false;
        self.close_after_flush |= close;
        Ok(())
    }

    /// Feed freshly read bytes to the parser. Returns `true` when a request just became complete.
    pub(crate) fn parse(&mut self, bytes: &[u8]) -> Result<bool, ParserError> {
        if self.closed {
            return Ok(false);
        }
        self.received = true;

        let request = self.parser.feed(bytes)?;
        Ok(self.complete(request))
    }

    /// Move on to the next buffered request once the current one has been answered.
    pub(crate) fn resume(&mut self) -> Result<bool, ParserError> {
        if self.closed || self.awaiting_response || self.close_after_flush {
            return Ok(false);
        }
        if self.parser.state() != ParseState::Complete {
            return Ok(false);
        }

        let request = self.parser.reset()?;
        Ok(self.complete(request))
    }

    fn complete(&mut self, request: Option<HttpRequest>) -> bool {
        let Some(request) = request else {
            return false;
        };

        self.close_after_flush |= request.wants_close();
        self.request = Some(request);
        self.awaiting_response = true;
        true
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    /// Write queued bytes until the socket would block or the queue is empty.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        while self.written < self.outbound.len() {
            match self.stream.write(&self.outbound[self.written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if self.written == self.outbound.len() {
            self.outbound.clear();
            self.written = 0;
        }
        Ok(())
    }

    /// One non-blocking write attempt; whatever does not fit is dropped.
    pub(crate) fn write_once(&mut self, bytes: &[u8]) {
        if let Err(e) = self.stream.write(bytes) {
            trace!("best-effort write to {} failed: {e}", self.id);
        }
    }

    pub(crate) fn has_pending_output(&self) -> bool {
        self.written < self.outbound.len()
    }

    /// The exchange is over and either side asked for the connection to end with it.
    pub(crate) fn finished(&self) -> bool {
        self.close_after_flush && !self.awaiting_response && !self.has_pending_output()
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub(crate) fn is_write_registered(&self) -> bool {
        self.writable
    }

    pub(crate) fn set_write_registered(&mut self, writable: bool) {
        self.writable = writable;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
