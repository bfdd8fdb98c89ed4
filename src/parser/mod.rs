//! HTTP request parser.
//!
//! Requests are parsed incrementally: the reactor hands every chunk read from a socket to a
//! [`RequestParser`], which produces an [`HttpRequest`] once the head and body are complete.
//! The accepted grammar is a strict subset of RFC 7230: single-space separated request line,
//! HTTP/1.0 and HTTP/1.1 only, token header names, no obsolete line folding, no transfer codings.

mod request;
mod incremental;
mod method;
mod version;
mod error;
mod tests;

// Re-export public items
pub use request::{HttpRequest, parse_request};
pub use incremental::{ParseState, RequestParser};
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;
