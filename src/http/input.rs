use bytes::{Buf, Bytes};
use may::sync::mpsc;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// One queue entry: a body chunk, or the end-of-content marker.
enum Chunk {
    Data(Bytes),
    Eof,
}

struct Reader {
    rx: mpsc::Receiver<Chunk>,
    current: Option<Bytes>,
    finished: bool,
}

/// Request body queue between the parser and the application.
///
/// The parser pushes chunks as bytes land on the socket; the application
/// drains them with blocking reads. The queue parks the calling coroutine
/// (or thread) while empty, the same way handler channels do elsewhere in
/// the BRRT stack.
pub struct HttpInput {
    tx: Mutex<mpsc::Sender<Chunk>>,
    reader: Mutex<Reader>,
    queued: AtomicUsize,
    shutdown: AtomicBool,
}

impl HttpInput {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx: Mutex::new(tx),
            reader: Mutex::new(Reader {
                rx,
                current: None,
                finished: false,
            }),
            queued: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Queue a body chunk from the parser. Chunks arriving after shutdown
    /// are dropped.
    pub fn content(&self, chunk: Bytes) {
        if self.shutdown.load(Ordering::SeqCst) {
            debug!(len = chunk.len(), "content after input shutdown dropped");
            return;
        }
        self.queued.fetch_add(chunk.len(), Ordering::SeqCst);
        let _ = self.tx.lock().send(Chunk::Data(chunk));
    }

    /// Mark the end of the message body. Idempotent; readers see EOF once
    /// the queue drains.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            let _ = self.tx.lock().send(Chunk::Eof);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Bytes queued but not yet consumed.
    pub fn available(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Blocking read. Returns `Ok(0)` at end of content.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut reader = self.reader.lock();
        loop {
            if let Some(mut chunk) = reader.current.take() {
                let n = buf.len().min(chunk.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                chunk.advance(n);
                if !chunk.is_empty() {
                    reader.current = Some(chunk);
                }
                self.queued.fetch_sub(n, Ordering::SeqCst);
                return Ok(n);
            }
            if reader.finished {
                return Ok(0);
            }
            match reader.rx.recv() {
                Ok(Chunk::Data(chunk)) => {
                    if !chunk.is_empty() {
                        reader.current = Some(chunk);
                    }
                }
                Ok(Chunk::Eof) | Err(_) => reader.finished = true,
            }
        }
    }

    /// Drain the remaining content into a single buffer.
    pub fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Reset to the pre-request state with an empty queue.
    pub fn recycle(&self) {
        let (tx, rx) = mpsc::channel();
        *self.tx.lock() = tx;
        let mut reader = self.reader.lock();
        reader.rx = rx;
        reader.current = None;
        reader.finished = false;
        self.queued.store(0, Ordering::SeqCst);
        self.shutdown.store(false, Ordering::SeqCst);
    }
}

impl Default for HttpInput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_read_sees_queued_content_then_eof() {
        let input = HttpInput::new();
        input.content(Bytes::from_static(b"hello"));
        input.shutdown();

        let mut buf = [0u8; 3];
        assert_eq!(input.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(input.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(input.read(&mut buf).unwrap(), 0);
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_available_tracks_unconsumed_bytes() {
        let input = HttpInput::new();
        input.content(Bytes::from_static(b"abcd"));
        assert_eq!(input.available(), 4);
        let mut buf = [0u8; 2];
        input.read(&mut buf).unwrap();
        assert_eq!(input.available(), 2);
    }

    #[test]
    fn test_read_blocks_until_producer_feeds() {
        let input = Arc::new(HttpInput::new());
        let producer = input.clone();
        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.content(Bytes::from_static(b"late"));
            producer.shutdown();
        });

        assert_eq!(input.read_to_end().unwrap(), b"late".to_vec());
        feeder.join().unwrap();
    }

    #[test]
    fn test_content_after_shutdown_is_dropped() {
        let input = HttpInput::new();
        input.shutdown();
        input.content(Bytes::from_static(b"ignored"));
        assert_eq!(input.available(), 0);
        assert_eq!(input.read_to_end().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_recycle_returns_to_fresh_state() {
        let input = HttpInput::new();
        input.content(Bytes::from_static(b"old"));
        input.shutdown();
        input.recycle();
        assert!(!input.is_shutdown());
        assert_eq!(input.available(), 0);
        input.content(Bytes::from_static(b"new"));
        input.shutdown();
        assert_eq!(input.read_to_end().unwrap(), b"new".to_vec());
    }
}
