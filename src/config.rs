//! # HTTP Configuration Module
//!
//! Per-connector configuration applied to every channel: whether the `Date`
//! header is emitted, how large the aggregate output buffer is, and the
//! optional request timeout armed when a handler suspends.
//!
//! ## Environment Variables
//!
//! - `BRRTC_SEND_DATE`: `true`/`false`, emit the `Date` response header
//!   (default: `true`)
//! - `BRRTC_OUTPUT_BUFFER_SIZE`: aggregate output buffer in bytes
//!   (default: `32768`)
//! - `BRRTC_REQUEST_TIMEOUT_MS`: timeout for suspended requests in
//!   milliseconds, `0` disables (default: disabled)

use std::env;
use std::time::Duration;

use crate::channel::HttpChannel;

/// Configuration shared by all channels of a connector.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Emit the `Date` response header at header-complete
    pub send_date_header: bool,
    /// Size of the aggregate response output buffer in bytes
    pub output_buffer_size: usize,
    /// Timeout armed when a handler suspends; `None` disables
    pub request_timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            send_date_header: true,
            output_buffer_size: 32 * 1024,
            request_timeout: None,
        }
    }
}

impl HttpConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let send_date_header = env::var("BRRTC_SEND_DATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.send_date_header);

        let output_buffer_size = env::var("BRRTC_OUTPUT_BUFFER_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.output_buffer_size);

        let request_timeout = env::var("BRRTC_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            send_date_header,
            output_buffer_size,
            request_timeout,
        }
    }

    pub fn with_send_date_header(mut self, send: bool) -> Self {
        self.send_date_header = send;
        self
    }

    pub fn with_output_buffer_size(mut self, size: usize) -> Self {
        self.output_buffer_size = size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Apply per-request policies before the initial dispatch.
    ///
    /// Fills the request authority from the endpoint's local address when no
    /// `Host` header supplied one.
    pub fn customize(&self, channel: &HttpChannel) {
        let request = channel.request();
        if request.server_name().is_none() {
            if let Some(addr) = channel.local_addr() {
                request.set_server_name(&addr.ip().to_string());
                request.set_server_port(addr.port());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpConfig::default();
        assert!(config.send_date_header);
        assert_eq!(config.output_buffer_size, 32 * 1024);
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_builders() {
        let config = HttpConfig::default()
            .with_send_date_header(false)
            .with_output_buffer_size(1024)
            .with_request_timeout(Some(Duration::from_millis(250)));
        assert!(!config.send_date_header);
        assert_eq!(config.output_buffer_size, 1024);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
    }
}
