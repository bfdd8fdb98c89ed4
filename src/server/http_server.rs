//! Server construction and the cross-thread handle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use mio::net::TcpListener;
use mio::{Interest, Poll, Waker};
use tokio::sync::mpsc;

use crate::server::config::ServerConfig;
use crate::server::connection::ConnectionId;
use crate::server::error::Error;
use crate::server::handler::{Handler, ScheduledTask, Task};
use crate::server::reactor::{Command, Reactor, LISTENER, WAKER};
use crate::server::response::HttpResponse;

/// Shortest interval a housekeeping task can be scheduled with.
const MIN_TASK_INTERVAL: Duration = Duration::from_millis(1);

/// An HTTP server that has not been started yet.
pub struct HttpServer<H: Handler> {
    /// The server configuration.
    pub config: ServerConfig,
    handler: H,
    tasks: Vec<ScheduledTask>,
}

impl<H: Handler> HttpServer<H> {
    /// Create a new HTTP server with the given configuration and callbacks.
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self {
            config,
            handler,
            tasks: Vec::new(),
        }
    }

    /// Run `task` on the reactor thread every `interval`, starting one interval after start.
    pub fn schedule(&mut self, interval: Duration, task: impl Task) -> &mut Self {
        let interval = interval.max(MIN_TASK_INTERVAL);
        self.tasks.push(ScheduledTask::new(interval, Box::new(task)));
        self
    }

    /// Bind the listener and spawn the reactor thread.
    ///
    /// Bind errors are returned here; once this returns, `on_start` has been or is about to be
    /// called on the reactor thread.
    pub fn start(self) -> Result<ServerHandle, Error> {
        let mut listener = TcpListener::bind(self.config.addr)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = ServerHandle {
            shared: Arc::new(Shared {
                closed: AtomicBool::new(false),
                live: AtomicUsize::new(0),
                local_addr,
                waker,
                commands,
                thread: Mutex::new(None),
            }),
        };

        let reactor = Reactor::new(poll, listener, self.handler, self.tasks, receiver, handle.clone(), self.config);
        let thread = thread::Builder::new()
            .name("http-reactor".to_string())
            .spawn(move || reactor.run())?;
        *handle.shared.lock_thread() = Some(thread);

        info!("Server listening on http://{local_addr}");
        Ok(handle)
    }
}

pub(crate) struct Shared {
    closed: AtomicBool,
    live: AtomicUsize,
    local_addr: SocketAddr,
    waker: Waker,
    commands: mpsc::UnboundedSender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn lock_thread(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.thread.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable handle to a running server, usable from any thread.
///
/// Dropping every handle does not stop the server; call [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Number of live connections.
    pub fn connection_size(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop the server. Only the first call does anything; later and concurrent calls return
    /// immediately. Use [`wait`](Self::wait) to block until `on_stop` has run.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!("shutdown already requested");
            return;
        }

        info!("Shutting down server on {}", self.shared.local_addr);
        if let Err(e) = self.shared.waker.wake() {
            error!("failed to wake the reactor: {e}");
        }
    }

    /// Block until the reactor thread has exited. Returns immediately when called from the
    /// reactor thread itself or when another caller already joined it.
    pub fn wait(&self) -> Result<(), Error> {
        let mut slot = self.shared.lock_thread();
        let Some(thread) = slot.take() else {
            return Ok(());
        };
        if thread.thread().id() == thread::current().id() {
            *slot = Some(thread);
            return Ok(());
        }
        drop(slot);

        thread.join().map_err(|_| Error::ReactorPanicked)
    }

    /// Answer the outstanding request on connection `id` from outside a callback.
    ///
    /// The response is validated here; delivery happens on the reactor thread and is silently
    /// dropped if the connection has closed in the meantime.
    pub fn send_response(&self, id: ConnectionId, response: &HttpResponse) -> Result<(), Error> {
        let bytes = response.to_bytes()?;
        self.command(Command::Respond {
            id,
            bytes,
            close: response.closes_connection(),
        })
    }

    /// Tear down connection `id` through the regular close procedure.
    pub fn close_connection(&self, id: ConnectionId) -> Result<(), Error> {
        self.command(Command::Close(id))
    }

    fn command(&self, command: Command) -> Result<(), Error> {
        if self.is_shutdown() {
            return Err(Error::ShutDown);
        }
        self.shared.commands.send(command).map_err(|_| Error::ShutDown)?;
        self.shared.waker.wake()?;
        Ok(())
    }

    pub(crate) fn set_connection_size(&self, size: usize) {
        self.shared.live.store(size, Ordering::Release);
    }
}
