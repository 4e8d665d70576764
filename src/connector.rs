use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::runtime_config::RuntimeConfig;
use crate::server::Server;

/// Address information of the connection a channel serves.
///
/// Real connectors back this with the accepted socket; tests use a stub.
pub trait Endpoint: Send + Sync {
    fn local_addr(&self) -> Option<SocketAddr>;
    fn remote_addr(&self) -> Option<SocketAddr>;
}

/// Spawns dispatch work onto coroutines with a configured stack size.
#[derive(Debug, Clone)]
pub struct Executor {
    stack_size: usize,
}

impl Executor {
    pub fn new(stack_size: usize) -> Self {
        Self { stack_size }
    }

    pub fn from_env() -> Self {
        Self::new(RuntimeConfig::from_env().stack_size)
    }

    /// Run a task on a fresh coroutine.
    ///
    /// Spawn failures are logged rather than propagated; the caller cannot
    /// do better when the runtime is out of resources, and dropping a
    /// dispatch is preferable to tearing the process down.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let result = unsafe {
            may::coroutine::Builder::new()
                .stack_size(self.stack_size)
                .spawn(task)
        };
        if let Err(e) = result {
            error!(
                stack_size = self.stack_size,
                error = %e,
                "Failed to spawn dispatch coroutine"
            );
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Handle to a scheduled timer; cancelling is advisory and idempotent.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs delayed tasks on sleeping coroutines. Used for request timeouts.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    executor: Executor,
}

impl Scheduler {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Run `task` after `delay` unless the returned handle is cancelled
    /// first.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        self.executor.execute(move || {
            may::coroutine::sleep(delay);
            if !flag.load(Ordering::SeqCst) {
                task();
            }
        });
        TimerHandle { cancelled }
    }
}

/// Everything a channel borrows from its surrounding connector: the server
/// handle, the executor dispatch work runs on, and the timeout scheduler.
pub struct Connector {
    server: Arc<Server>,
    executor: Executor,
    scheduler: Scheduler,
}

impl Connector {
    pub fn new(server: Arc<Server>) -> Self {
        Self::with_executor(server, Executor::from_env())
    }

    pub fn with_executor(server: Arc<Server>, executor: Executor) -> Self {
        let scheduler = Scheduler::new(executor.clone());
        Self {
            server,
            executor,
            scheduler,
        }
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_executor_runs_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        Executor::new(0x4001).execute(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == 1 {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("task never ran");
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let scheduler = Scheduler::new(Executor::new(0x4001));
        let handle = scheduler.schedule(Duration::from_millis(20), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
