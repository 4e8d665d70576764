//! Shared fixtures for channel integration tests: a recording transport, an
//! endpoint stub and channel builders.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use brrtchannel::{
    Connector, Endpoint, Executor, Handler, HttpChannel, HttpConfig, ResponseInfo, Server,
    Transport,
};

/// One `Transport::commit` call as the mock observed it.
#[derive(Debug, Clone)]
pub struct CommittedHead {
    pub info: ResponseInfo,
    pub content: Option<Vec<u8>>,
    pub complete: bool,
}

/// Transport double that records every commit, write and completion signal.
#[derive(Default)]
pub struct RecordingTransport {
    commits: Mutex<Vec<CommittedHead>>,
    writes: Mutex<Vec<(Vec<u8>, bool)>>,
    completed: AtomicUsize,
}

impl RecordingTransport {
    pub fn commits(&self) -> Vec<CommittedHead> {
        self.commits.lock().unwrap().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn writes(&self) -> Vec<(Vec<u8>, bool)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn commit(
        &self,
        info: &ResponseInfo,
        content: Option<&[u8]>,
        complete: bool,
    ) -> io::Result<()> {
        self.commits.lock().unwrap().push(CommittedHead {
            info: info.clone(),
            content: content.map(|c| c.to_vec()),
            complete,
        });
        Ok(())
    }

    fn write(&self, content: &[u8], complete: bool) -> io::Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((content.to_vec(), complete));
        Ok(())
    }

    fn channel_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fixed-address endpoint stub.
pub struct StubEndpoint;

impl Endpoint for StubEndpoint {
    fn local_addr(&self) -> Option<SocketAddr> {
        "127.0.0.1:8080".parse().ok()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        "127.0.0.1:54321".parse().ok()
    }
}

/// Build a channel wired to a recording transport and the given handler.
pub fn channel_with<H: Handler + 'static>(
    handler: H,
) -> (Arc<HttpChannel>, Arc<RecordingTransport>) {
    channel_with_config(handler, HttpConfig::default())
}

pub fn channel_with_config<H: Handler + 'static>(
    handler: H,
    config: HttpConfig,
) -> (Arc<HttpChannel>, Arc<RecordingTransport>) {
    let server = Arc::new(Server::new(Arc::new(handler)));
    let connector = Arc::new(Connector::with_executor(server, Executor::new(0x8001)));
    let transport = Arc::new(RecordingTransport::default());
    let channel = HttpChannel::new(
        connector,
        Arc::new(config),
        Arc::new(StubEndpoint),
        transport.clone(),
    );
    (channel, transport)
}

/// Poll until the condition holds, the way server readiness is awaited.
pub fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached within timeout");
}
