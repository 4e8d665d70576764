use parking_lot::Mutex;
use std::sync::Weak;
use std::time::Duration;
use tracing::{debug, warn};

use crate::channel::HttpChannel;
use crate::connector::TimerHandle;
use crate::error::HttpError;

/// Dispatch lifecycle of the in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No request in flight
    Idle,
    /// A worker is executing the application
    Dispatched,
    /// The application asked to suspend and has not yet returned
    AsyncStarted,
    /// Suspended; waiting for a dispatch or timeout
    AsyncWait,
    /// A resume is scheduled but no worker has claimed it yet
    Redispatching,
    /// Handling finished; the completion phase may run
    Completing,
    /// Terminal
    Completed,
}

/// What the application asked for since the current dispatch began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AsyncOp {
    None,
    /// A resume raced in before the handler returned
    Redispatch,
    /// The application finished the request from the suspended side
    Complete,
}

struct Inner {
    state: State,
    async_op: AsyncOp,
    initial: bool,
    error: Option<HttpError>,
    timeout: Option<TimerHandle>,
}

fn cancel_timeout(inner: &mut Inner) {
    if let Some(timer) = inner.timeout.take() {
        timer.cancel();
    }
}

/// The finite automaton controlling dispatch, suspension and completion.
///
/// This is the only synchronization point between the dispatching worker and
/// the timers or application-spawned threads performing async dispatch;
/// every operation runs under the internal mutex and returns a decision to
/// the caller.
pub struct ChannelState {
    inner: Mutex<Inner>,
    channel: Weak<HttpChannel>,
}

impl ChannelState {
    pub(crate) fn new(channel: Weak<HttpChannel>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Idle,
                async_op: AsyncOp::None,
                initial: true,
                error: None,
                timeout: None,
            }),
            channel,
        }
    }

    /// Claim the right to execute the application this iteration.
    ///
    /// Returns true from `Idle` (initial request) and `Redispatching`
    /// (resumed request); false when the request is already completing or
    /// completed (spurious wake) or a worker already holds the dispatch.
    pub fn handling(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Idle | State::Redispatching => {
                inner.state = State::Dispatched;
                inner.async_op = AsyncOp::None;
                true
            }
            State::Completing | State::Completed => {
                debug!(state = ?inner.state, "spurious wake, nothing to handle");
                false
            }
            other => {
                warn!(state = ?other, "handling refused");
                false
            }
        }
    }

    /// Release the dispatch after one application pass.
    ///
    /// Returns true when the worker is done with this invocation: either the
    /// request suspended (`AsyncWait`) or handling finished (`Completing`).
    /// Returns false only when a resume raced in while the application was
    /// still running, in which case the loop must iterate again.
    pub fn unhandle(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.initial = false;
        match inner.state {
            State::Dispatched | State::AsyncStarted => {
                if inner.error.is_some() {
                    cancel_timeout(&mut inner);
                    inner.state = State::Completing;
                    return true;
                }
                match inner.async_op {
                    AsyncOp::Redispatch => {
                        inner.state = State::Dispatched;
                        inner.async_op = AsyncOp::None;
                        false
                    }
                    AsyncOp::Complete => {
                        cancel_timeout(&mut inner);
                        inner.state = State::Completing;
                        true
                    }
                    AsyncOp::None => {
                        if inner.state == State::AsyncStarted {
                            inner.state = State::AsyncWait;
                        } else {
                            inner.state = State::Completing;
                        }
                        true
                    }
                }
            }
            State::Completing => true,
            other => {
                warn!(state = ?other, "unhandle outside dispatch");
                true
            }
        }
    }

    /// The application is not finished yet; suspend when the handler
    /// returns. Arms the configured request timeout.
    pub fn async_started(&self) -> Result<(), HttpError> {
        let default = self
            .channel
            .upgrade()
            .and_then(|channel| channel.config().request_timeout);
        self.async_started_with_timeout(default)
    }

    /// Suspend with an explicit timeout override (`None` disarms).
    pub fn async_started_with_timeout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), HttpError> {
        let mut inner = self.inner.lock();
        if inner.state != State::Dispatched {
            return Err(HttpError::IllegalState(format!(
                "async started in state {:?}",
                inner.state
            )));
        }
        inner.state = State::AsyncStarted;
        if let Some(delay) = timeout {
            if let Some(channel) = self.channel.upgrade() {
                let weak = self.channel.clone();
                let handle = channel.connector().scheduler().schedule(delay, move || {
                    if let Some(channel) = weak.upgrade() {
                        channel.state().expired();
                    }
                });
                inner.timeout = Some(handle);
            }
        }
        Ok(())
    }

    /// Resume a suspended request. From `AsyncWait` the channel is posted
    /// back to the executor; before the handler has returned it only marks
    /// the redispatch for `unhandle` to observe.
    pub fn dispatch(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::AsyncStarted => {
                cancel_timeout(&mut inner);
                inner.async_op = AsyncOp::Redispatch;
            }
            State::AsyncWait => {
                cancel_timeout(&mut inner);
                inner.state = State::Redispatching;
                drop(inner);
                self.execute_channel();
            }
            other => debug!(state = ?other, "dispatch ignored"),
        }
    }

    /// The suspended side finished the request; route the channel into the
    /// completion phase.
    pub fn complete_async(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::AsyncStarted => {
                cancel_timeout(&mut inner);
                inner.async_op = AsyncOp::Complete;
            }
            State::AsyncWait => {
                cancel_timeout(&mut inner);
                inner.state = State::Completing;
                drop(inner);
                self.execute_channel();
            }
            other => debug!(state = ?other, "complete ignored"),
        }
    }

    /// Scheduler-driven timeout: record the failure and force completion.
    pub fn expired(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::AsyncStarted => {
                if inner.error.is_none() {
                    inner.error = Some(HttpError::Timeout);
                }
            }
            State::AsyncWait => {
                if inner.error.is_none() {
                    inner.error = Some(HttpError::Timeout);
                }
                inner.state = State::Completing;
                drop(inner);
                self.execute_channel();
            }
            other => debug!(state = ?other, "expiry raced with completion"),
        }
    }

    /// Record a failure; the next `unhandle` moves to `Completing`. The
    /// first recorded failure wins.
    pub fn error(&self, cause: HttpError) {
        let mut inner = self.inner.lock();
        if inner.error.is_none() {
            inner.error = Some(cause);
        }
    }

    pub(crate) fn take_error(&self) -> Option<HttpError> {
        self.inner.lock().error.take()
    }

    /// `Completing → Completed`. Idempotent; any subsequent `handling()`
    /// returns false.
    pub fn completed(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Completing => {
                cancel_timeout(&mut inner);
                inner.state = State::Completed;
            }
            State::Completed => {}
            other => warn!(state = ?other, "completed outside completion phase"),
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(
            self.inner.lock().state,
            State::AsyncStarted | State::AsyncWait
        )
    }

    /// Whether the current dispatch is the initial one for this request.
    pub fn is_initial(&self) -> bool {
        self.inner.lock().initial
    }

    pub fn is_completing(&self) -> bool {
        self.inner.lock().state == State::Completing
    }

    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Return to `Idle` between requests on a persistent connection.
    pub(crate) fn recycle(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Idle | State::Completed => {
                cancel_timeout(&mut inner);
                inner.state = State::Idle;
                inner.async_op = AsyncOp::None;
                inner.initial = true;
                inner.error = None;
            }
            other => warn!(state = ?other, "recycle refused, request still active"),
        }
    }

    fn execute_channel(&self) {
        if let Some(channel) = self.channel.upgrade() {
            let task = channel.clone();
            channel.connector().executor().execute(move || task.run());
        }
    }
}
