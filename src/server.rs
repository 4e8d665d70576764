use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::channel::HttpChannel;
use crate::error::HttpError;

/// The application seam the channel dispatches into.
///
/// `handle` runs the initial dispatch; `handle_async` runs redispatches of a
/// previously suspended request and defaults to `handle`. A handler suspends
/// by calling `channel.state().async_started()` and returning `Ok(())`;
/// suspension is a state transition, not an error.
pub trait Handler: Send + Sync {
    fn handle(&self, channel: &Arc<HttpChannel>) -> Result<(), HttpError>;

    fn handle_async(&self, channel: &Arc<HttpChannel>) -> Result<(), HttpError> {
        self.handle(channel)
    }
}

impl<F> Handler for F
where
    F: Fn(&Arc<HttpChannel>) -> Result<(), HttpError> + Send + Sync,
{
    fn handle(&self, channel: &Arc<HttpChannel>) -> Result<(), HttpError> {
        self(channel)
    }
}

/// Handle on the running server shared by every connector.
///
/// Holds the root handler and the running flag the dispatch loop checks
/// between iterations; a stopped server drains in-flight dispatches without
/// starting new application passes.
pub struct Server {
    running: AtomicBool,
    handler: Arc<dyn Handler>,
}

impl Server {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            running: AtomicBool::new(true),
            handler,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Initial dispatch of a request into the application.
    pub fn handle(&self, channel: &Arc<HttpChannel>) -> Result<(), HttpError> {
        self.handler.handle(channel)
    }

    /// Redispatch of a previously suspended request.
    pub fn handle_async(&self, channel: &Arc<HttpChannel>) -> Result<(), HttpError> {
        self.handler.handle_async(channel)
    }
}
