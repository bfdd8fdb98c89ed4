//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::Error as ParserError;
use crate::server::connection::ConnectionId;

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A response was serialized before the named part was set.
    #[error("Malformed response: {0} was never set")]
    IncompleteResponse(&'static str),

    /// The response head contains non-ASCII bytes or embedded line breaks.
    #[error("Invalid response head: {0:?}")]
    InvalidHead(String),

    /// A response was sent while no complete request was waiting for one.
    #[error("Connection {0} has no complete request to answer")]
    RequestNotComplete(ConnectionId),

    /// The connection was already closed.
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// The reactor thread is gone and can no longer take commands.
    #[error("Server is shut down")]
    ShutDown,

    /// The reactor thread panicked, most likely inside an application callback.
    #[error("Reactor thread panicked")]
    ReactorPanicked,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
