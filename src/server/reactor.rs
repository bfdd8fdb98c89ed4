//! The single-threaded event loop.
//!
//! The reactor owns the listener, the multiplexer and every live [`Connection`]. All accepts,
//! reads, writes and teardowns happen on its thread, so the connection set needs no locking.
//! Other threads reach it only through the shutdown flag and the command channel, both of
//! which wake the blocked multiplexer.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tokio::sync::mpsc;

use crate::parser::Error as ParserError;
use crate::server::config::ServerConfig;
use crate::server::connection::{Connection, ConnectionId};
use crate::server::handler::{Handler, ScheduledTask};
use crate::server::http_server::ServerHandle;
use crate::server::response::{HttpResponse, StatusCode};

pub(crate) const LISTENER: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;
/// Pause after a failed multiplexer wait before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Work submitted through a [`ServerHandle`].
pub(crate) enum Command {
    Respond { id: ConnectionId, bytes: Vec<u8>, close: bool },
    Close(ConnectionId),
}

pub(crate) struct Reactor<H: Handler> {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<ConnectionId, Connection>,
    /// Scratch space for every socket read.
    buffer: Vec<u8>,
    next_id: usize,
    handler: H,
    tasks: Vec<ScheduledTask>,
    commands: mpsc::UnboundedReceiver<Command>,
    handle: ServerHandle,
    config: ServerConfig,
}

impl<H: Handler> Reactor<H> {
    pub(crate) fn new(
        poll: Poll,
        listener: TcpListener,
        handler: H,
        tasks: Vec<ScheduledTask>,
        commands: mpsc::UnboundedReceiver<Command>,
        handle: ServerHandle,
        config: ServerConfig,
    ) -> Self {
        Self {
            poll,
            listener,
            connections: HashMap::new(),
            buffer: vec![0; config.read_buffer_size.max(1)],
            next_id: FIRST_CONNECTION,
            handler,
            tasks,
            commands,
            handle,
            config,
        }
    }

    pub(crate) fn run(mut self) {
        self.handler.on_start(&self.handle);

        let mut events = Events::with_capacity(self.config.event_capacity.max(1));
        while !self.handle.is_shutdown() {
            let timeout = self
                .tasks
                .iter()
                .map(|task| task.next)
                .min()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));

            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() != io::ErrorKind::Interrupted {
                    error!("multiplexer wait failed: {e}");
                    thread::sleep(POLL_ERROR_BACKOFF);
                }
                continue;
            }
            if self.handle.is_shutdown() {
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => trace!("reactor woken"),
                    token => self.ready(ConnectionId(token.0), event),
                }
            }

            self.drain_commands();
            self.run_due_tasks();
        }

        self.stop();
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.register(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if aborted_before_accept(&e) => {
                    debug!("pending connection went away before accept: {e}");
                    continue;
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                    return;
                }
            }
        }
    }

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.connections.len() >= self.config.max_connections {
            warn!("Connection limit reached, rejecting connection from {peer}");
            let response = HttpResponse::new(StatusCode::ServiceUnavailable)
                .with_content_type("text/plain")
                .with_header("Connection", "close")
                .with_body_string("Server is at capacity, please try again later");
            if let Ok(bytes) = response.to_bytes() {
                if let Err(e) = (&stream).write(&bytes) {
                    trace!("best-effort write to {peer} failed: {e}");
                }
            }
            return;
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        let mut connection = Connection::new(id, stream, peer, self.config.max_request_size);
        if let Err(e) = self.poll.registry().register(connection.stream_mut(), id.token(), Interest::READABLE) {
            // Dropping the connection closes the half-accepted socket
            error!("Error registering connection from {peer}: {e}");
            connection.close();
            return;
        }

        self.connections.insert(id, connection);
        self.handle.set_connection_size(self.connections.len());
        debug!("accepted {peer} as {id}");
    }

    fn ready(&mut self, id: ConnectionId, event: &Event) {
        if !self.connections.contains_key(&id) {
            trace!("skipping stale event for {id}");
            return;
        }

        if event.is_readable() || event.is_read_closed() || event.is_error() {
            self.read(id);
        }
        if event.is_writable() {
            self.flush(id);
        }
    }

    fn read(&mut self, id: ConnectionId) {
        loop {
            let Some(connection) = self.connections.get_mut(&id) else {
                return;
            };

            match connection.read(&mut self.buffer) {
                Ok(0) => {
                    debug!("{id} reached end of stream");
                    self.close_request(id);
                    return;
                }
                Ok(n) => {
                    trace!("read {n} bytes from {id}");
                    match connection.parse(&self.buffer[..n]) {
                        Ok(true) => self.dispatch(id),
                        Ok(false) => {}
                        Err(e) => {
                            self.reject(id, e);
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Resets and the like end the connection, they are never retried
                    debug!("read from {id} failed: {e}");
                    self.close_request(id);
                    return;
                }
            }
        }
    }

    /// Hand a complete request to the application, then any pipelined ones it unblocks.
    fn dispatch(&mut self, id: ConnectionId) {
        loop {
            let Some(connection) = self.connections.get_mut(&id) else {
                return;
            };

            if let Some(request) = connection.request() {
                debug!("{id} {} {}", request.method, request.path);
            }
            self.handler.on_request(connection);

            if connection.is_closed() {
                self.close_request(id);
                return;
            }
            match connection.resume() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    self.reject(id, e);
                    return;
                }
            }
        }

        self.flush(id);
    }

    fn respond(&mut self, id: ConnectionId, bytes: Vec<u8>, close: bool) {
        let Some(connection) = self.connections.get_mut(&id) else {
            debug!("dropping response for {id}, connection is gone");
            return;
        };

        if let Err(e) = connection.queue_response(bytes, close) {
            warn!("dropping response: {e}");
            return;
        }
        match connection.resume() {
            Ok(true) => self.dispatch(id),
            Ok(false) => self.flush(id),
            Err(e) => self.reject(id, e),
        }
    }

    /// Write what the socket takes and keep writable interest only while output is pending.
    fn flush(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };

        if let Err(e) = connection.flush() {
            debug!("write to {id} failed: {e}");
            self.close_request(id);
            return;
        }
        if connection.finished() {
            debug!("{id} done after response");
            self.close_request(id);
            return;
        }

        let pending = connection.has_pending_output();
        if pending == connection.is_write_registered() {
            return;
        }

        let interest = if pending {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        if let Err(e) = self.poll.registry().reregister(connection.stream_mut(), id.token(), interest) {
            error!("Error updating interest of {id}: {e}");
            self.close_request(id);
            return;
        }
        connection.set_write_registered(pending);
    }

    /// Answer a protocol error with a best-effort status response and tear the connection down.
    fn reject(&mut self, id: ConnectionId, err: ParserError) {
        warn!("closing {id} after protocol error: {err}");

        if let Some(connection) = self.connections.get_mut(&id) {
            let status = match err {
                ParserError::RequestTooLarge { .. } => StatusCode::PayloadTooLarge,
                ParserError::InvalidVersion(_) => StatusCode::HttpVersionNotSupported,
                _ => StatusCode::BadRequest,
            };
            let response = HttpResponse::new(status)
                .with_content_type("text/plain")
                .with_header("Connection", "close")
                .with_body_string(format!("Error parsing request: {err}"));

            let _ = connection.flush();
            if let Ok(bytes) = response.to_bytes() {
                connection.write_once(&bytes);
            }
        }

        self.close_request(id);
    }

    /// The only way a connection leaves the live set: close the socket, remove it, notify.
    /// Returns `false` if `id` was already gone.
    pub(crate) fn close_request(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.get_mut(&id) else {
            trace!("{id} already closed");
            return false;
        };

        if let Err(e) = self.poll.registry().deregister(connection.stream_mut()) {
            trace!("deregistering {id} failed: {e}");
        }
        connection.close();

        let Some(connection) = self.connections.remove(&id) else {
            return false;
        };
        self.handle.set_connection_size(self.connections.len());

        self.handler.on_close(&connection);
        true
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Respond { id, bytes, close } => self.respond(id, bytes, close),
                Command::Close(id) => {
                    self.close_request(id);
                }
            }
        }
    }

    fn run_due_tasks(&mut self) {
        let now = Instant::now();
        for scheduled in self.tasks.iter_mut().filter(|task| task.next <= now) {
            scheduled.task.run(&self.handle);
            scheduled.next = now + scheduled.interval;
        }
    }

    fn stop(mut self) {
        info!("Closing {} active connections", self.connections.len());

        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            self.close_request(id);
        }
        self.connections.clear();
        self.handle.set_connection_size(0);

        self.tasks.clear();
        self.commands.close();

        let Reactor { poll, listener, mut handler, handle, .. } = self;
        drop(listener);
        drop(poll);

        handler.on_stop();
        info!("Server on {} stopped", handle.local_addr());
    }
}

/// Accept errors that concern only one queued connection; the rest of the backlog is still
/// worth draining.
pub(crate) fn aborted_before_accept(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::PermissionDenied
    )
}
