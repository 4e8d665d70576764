use http::Version;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::{Arc, Weak};

use crate::channel::HttpChannel;
use crate::error::HttpError;
use crate::http::fields::HeaderFields;
use crate::http::output::HttpOutput;

/// Default reason phrase for a status code.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        102 => "Processing",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        417 => "Expectation Failed",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        _ => "OK",
    }
}

/// Immutable snapshot of everything the transport needs to serialise the
/// response head, produced at the moment of commit.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub version: Version,
    pub fields: HeaderFields,
    pub content_length: Option<u64>,
    pub status: u16,
    pub reason: Option<String>,
    pub head: bool,
}

impl ResponseInfo {
    /// The interim `100 Continue` head sent ahead of the real response.
    pub(crate) fn continue_100() -> Self {
        Self {
            version: Version::HTTP_11,
            fields: HeaderFields::new(),
            content_length: Some(0),
            status: 100,
            reason: None,
            head: false,
        }
    }

    /// A bare error head committed without involving the application.
    pub(crate) fn synthetic(
        version: Version,
        status: u16,
        reason: Option<&str>,
        head: bool,
    ) -> Self {
        Self {
            version,
            fields: HeaderFields::new(),
            content_length: Some(0),
            status,
            reason: reason.map(str::to_string),
            head,
        }
    }
}

struct ResponseState {
    status: u16,
    reason: Option<String>,
    content_length: Option<u64>,
}

impl ResponseState {
    fn fresh() -> Self {
        Self {
            status: 200,
            reason: None,
            content_length: None,
        }
    }
}

/// The response the application mutates until commit.
///
/// Status and headers accumulate here; body bytes go through the owned
/// `HttpOutput`, whose writes route through the channel and trigger the
/// commit. Once committed, status and header mutation fail with
/// `HttpError::Committed`.
pub struct Response {
    state: Mutex<ResponseState>,
    fields: RwLock<HeaderFields>,
    output: Arc<HttpOutput>,
    channel: Weak<HttpChannel>,
}

impl Response {
    pub(crate) fn new(channel: Weak<HttpChannel>, output: Arc<HttpOutput>) -> Self {
        Self {
            state: Mutex::new(ResponseState::fresh()),
            fields: RwLock::new(HeaderFields::new()),
            output,
            channel,
        }
    }

    pub fn status(&self) -> u16 {
        self.state.lock().status
    }

    pub fn reason(&self) -> Option<String> {
        self.state.lock().reason.clone()
    }

    pub fn set_status(&self, status: u16) -> Result<(), HttpError> {
        self.set_status_with_reason(status, None)
    }

    pub fn set_status_with_reason(
        &self,
        status: u16,
        reason: Option<&str>,
    ) -> Result<(), HttpError> {
        if self.is_committed() {
            return Err(HttpError::Committed);
        }
        let mut state = self.state.lock();
        state.status = status;
        state.reason = reason.map(str::to_string);
        Ok(())
    }

    /// Declare the response content length for the commit snapshot.
    pub fn set_content_length(&self, length: u64) -> Result<(), HttpError> {
        if self.is_committed() {
            return Err(HttpError::Committed);
        }
        self.state.lock().content_length = Some(length);
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.channel
            .upgrade()
            .map(|channel| channel.is_committed())
            .unwrap_or(true)
    }

    /// Read access to the header multimap.
    pub fn fields(&self) -> RwLockReadGuard<'_, HeaderFields> {
        self.fields.read()
    }

    /// Write access to the header multimap; fails once committed.
    pub fn fields_mut(&self) -> Result<RwLockWriteGuard<'_, HeaderFields>, HttpError> {
        if self.is_committed() {
            return Err(HttpError::Committed);
        }
        Ok(self.fields.write())
    }

    /// The body sink whose writes route through the channel.
    pub fn http_output(&self) -> Arc<HttpOutput> {
        self.output.clone()
    }

    /// Snapshot for the commit: version and is-head come from the request,
    /// the content length from the explicit declaration or a
    /// `Content-Length` header.
    pub fn new_response_info(&self) -> ResponseInfo {
        let (version, head) = match self.channel.upgrade() {
            Some(channel) => {
                let request = channel.request();
                (request.http_version(), request.is_head())
            }
            None => (Version::HTTP_11, false),
        };
        let fields = self.fields.read().clone();
        let state = self.state.lock();
        let content_length = state
            .content_length
            .or_else(|| fields.get("Content-Length").and_then(|v| v.parse().ok()));
        ResponseInfo {
            version,
            fields,
            content_length,
            status: state.status,
            reason: state.reason.clone(),
            head,
        }
    }

    /// Replace any buffered body with a small JSON error document.
    pub fn send_error(&self, status: u16, message: Option<&str>) -> Result<(), HttpError> {
        if self.is_committed() {
            return Err(HttpError::Committed);
        }
        self.output.reset_buffer();
        {
            let mut state = self.state.lock();
            state.status = status;
            state.reason = None;
            state.content_length = None;
        }
        {
            let mut fields = self.fields.write();
            fields.put("Content-Type", "application/json");
        }
        let body = serde_json::json!({
            "status": status,
            "error": message.unwrap_or_else(|| status_reason(status)),
        });
        self.output.write(body.to_string().as_bytes())
    }

    /// Flush remaining buffered output and finalise the response.
    pub fn complete(&self) -> Result<(), HttpError> {
        self.output.close()
    }

    /// Reset status, headers and the output buffer.
    pub fn recycle(&self) {
        *self.state.lock() = ResponseState::fresh();
        self.fields.write().clear();
        self.output.recycle();
    }
}
