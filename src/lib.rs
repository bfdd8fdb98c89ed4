//! A minimal embeddable HTTP server core.
//!
//! One reactor thread accepts TCP connections, reads bytes as they arrive, parses them
//! incrementally into requests and writes serialized responses back, all without blocking.
//! The embedding application supplies the callbacks and decides what every request means.
//!
//! # Features
//!
//! - Single-threaded, non-blocking reactor built on `mio`
//! - Incremental HTTP/1.0 and HTTP/1.1 request parsing, tolerant of any TCP segmentation
//! - Response builder with an exact, always-present `Content-Length`
//! - Queued, non-blocking response writes so a slow client cannot stall the loop
//! - Idempotent, thread-safe shutdown
//!
//! # Examples
//!
//! ## Serving requests
//!
//! ```no_run
//! use microhttp_reactor::{Connection, Handler, HttpResponse, HttpServer, ServerConfig, StatusCode};
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     fn on_request(&mut self, connection: &mut Connection) {
//!         let response = HttpResponse::new(StatusCode::Ok)
//!             .with_content_type("application/json")
//!             .with_body_string("{\"test\":\"good\"}");
//!
//!         if let Err(e) = connection.send_response(&response) {
//!             eprintln!("Error sending response: {e}");
//!         }
//!     }
//! }
//!
//! let config = ServerConfig::default().with_port(2015);
//! let server = HttpServer::new(config, Hello).start().unwrap();
//!
//! // ... later, from any thread
//! server.shutdown();
//! server.wait().unwrap();
//! ```
//!
//! ## Parsing on its own
//!
//! ```
//! use microhttp_reactor::{Method, RequestParser};
//!
//! let mut parser = RequestParser::new(1024);
//! assert!(parser.feed(b"GET /x HTTP/1.1\r\nHo").unwrap().is_none());
//!
//! let request = parser.feed(b"st: h\r\n\r\n").unwrap().unwrap();
//! assert_eq!(request.method, Method::GET);
//! assert_eq!(request.path, "/x");
//! ```
//!
//! ## Building a response
//!
//! ```
//! use microhttp_reactor::{HttpResponse, StatusCode};
//!
//! let bytes = HttpResponse::new(StatusCode::Ok)
//!     .with_body_string("hello")
//!     .to_bytes()
//!     .unwrap();
//!
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n"));
//! assert!(bytes.ends_with(b"\r\n\r\nhello"));
//! ```

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, ParseState, RequestParser, parse_request};
pub use server::{
    Connection, ConnectionId, ConnectionState, Error as ServerError, Handler, HttpResponse, HttpServer,
    ServerConfig, ServerHandle, StatusCode, Task,
};
