use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use crate::channel::HttpChannel;
use crate::error::HttpError;

/// Buffered response body sink.
///
/// Small writes aggregate in an internal buffer sized by
/// `HttpConfig::output_buffer_size`; overflowing or closing pushes the bytes
/// through `HttpChannel::write`, which commits the response on first
/// contact with the transport.
pub struct HttpOutput {
    channel: Weak<HttpChannel>,
    buffer: Mutex<Vec<u8>>,
    capacity: usize,
    closed: AtomicBool,
}

impl HttpOutput {
    pub(crate) fn new(channel: Weak<HttpChannel>, capacity: usize) -> Self {
        Self {
            channel,
            buffer: Mutex::new(Vec::with_capacity(capacity.min(4096))),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    fn channel_write(&self, content: &[u8], complete: bool) -> Result<(), HttpError> {
        match self.channel.upgrade() {
            Some(channel) => channel.write(content, complete),
            None => Err(HttpError::Closed),
        }
    }

    /// Append bytes, flushing through the channel when the aggregate buffer
    /// overflows.
    pub fn write(&self, data: &[u8]) -> Result<(), HttpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HttpError::Closed);
        }
        let mut buffer = self.buffer.lock();
        if buffer.len() + data.len() <= self.capacity {
            buffer.extend_from_slice(data);
            return Ok(());
        }
        if !buffer.is_empty() {
            self.channel_write(&buffer, false)?;
            buffer.clear();
        }
        if data.len() > self.capacity {
            self.channel_write(data, false)
        } else {
            buffer.extend_from_slice(data);
            Ok(())
        }
    }

    /// Push any buffered bytes through the channel without finalising.
    pub fn flush(&self) -> Result<(), HttpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HttpError::Closed);
        }
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return Ok(());
        }
        self.channel_write(&buffer, false)?;
        buffer.clear();
        Ok(())
    }

    /// Flush remaining bytes and finalise the response. Idempotent.
    pub fn close(&self) -> Result<(), HttpError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut buffer = self.buffer.lock();
        let result = self.channel_write(&buffer, true);
        buffer.clear();
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Bytes currently aggregated and not yet flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Discard buffered, uncommitted content. Used by `send_error` to
    /// replace a partially written body.
    pub(crate) fn reset_buffer(&self) {
        self.buffer.lock().clear();
    }

    /// Allow writes again at the start of a dispatch pass.
    pub(crate) fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    /// Reset to the pre-request state.
    pub(crate) fn recycle(&self) {
        self.buffer.lock().clear();
        self.closed.store(false, Ordering::SeqCst);
    }
}
