//! Single-threaded HTTP server core.
//!
//! [`HttpServer::start`] binds the listener and spawns one reactor thread that multiplexes
//! every connection. The application plugs in through the [`Handler`] trait and answers
//! requests with [`HttpResponse`]s.

mod response;
mod config;
mod error;
mod handler;
mod connection;
mod reactor;
mod http_server;

// Re-export public items
pub use response::{HttpResponse, StatusCode};
pub use config::ServerConfig;
pub use error::Error;
pub use handler::{Handler, Task};
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use http_server::{HttpServer, ServerHandle};
