//! Embedder callbacks and housekeeping tasks.

use std::time::{Duration, Instant};

use crate::server::connection::Connection;
use crate::server::http_server::ServerHandle;

/// Callbacks the embedding application implements.
///
/// Every method runs on the reactor thread, one at a time. A callback that blocks stalls
/// every connection, so long work should be handed off and answered later through
/// [`ServerHandle::send_response`].
pub trait Handler: Send + 'static {
    /// The listener is bound and the loop is about to start.
    fn on_start(&mut self, _server: &ServerHandle) {}

    /// A request on `connection` is complete.
    ///
    /// Answer it with [`Connection::send_response`], close it with [`Connection::close`], or
    /// keep its id and respond later.
    fn on_request(&mut self, connection: &mut Connection);

    /// `connection` was torn down, for whatever reason. Its socket is already closed.
    fn on_close(&mut self, _connection: &Connection) {}

    /// The loop exited and both the multiplexer and the listener are closed.
    fn on_stop(&mut self) {}
}

/// Periodic housekeeping run on the reactor thread.
pub trait Task: Send + 'static {
    fn run(&mut self, server: &ServerHandle);
}

impl<F> Task for F
where
    F: FnMut(&ServerHandle) + Send + 'static,
{
    fn run(&mut self, server: &ServerHandle) {
        self(server)
    }
}

pub(crate) struct ScheduledTask {
    pub(crate) interval: Duration,
    pub(crate) next: Instant,
    pub(crate) task: Box<dyn Task>,
}

impl ScheduledTask {
    pub(crate) fn new(interval: Duration, task: Box<dyn Task>) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
            task,
        }
    }
}
