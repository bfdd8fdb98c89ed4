//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of live connections; further accepts are answered with 503 and closed.
    pub max_connections: usize,
    /// Size of the scratch buffer used for each socket read.
    pub read_buffer_size: usize,
    /// Upper bound on a single request, head and body together.
    pub max_request_size: usize,
    /// Capacity of the readiness event buffer handed to the multiplexer.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 80),
            max_connections: 1024,
            read_buffer_size: 1024,
            max_request_size: 1024 * 1024,
            event_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Bind to `ip:port` with default limits.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::new(ip, port),
            ..Self::default()
        }
    }

    /// Keep the configured IP address, change the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Bind to the given address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// A zero size is bumped to one byte.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn with_max_request_size(mut self, size: usize) -> Self {
        self.max_request_size = size;
        self
    }
}
