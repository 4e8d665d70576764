use bytes::Bytes;
use http::header::HeaderName;
use http::{header, Method, Version};
use parking_lot::Mutex;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

use crate::channel::state::{ChannelState, State};
use crate::config::HttpConfig;
use crate::connector::{Connector, Endpoint};
use crate::error::HttpError;
use crate::http::input::HttpInput;
use crate::http::mime::charset_from_content_type;
use crate::http::output::HttpOutput;
use crate::http::request::{DispatcherType, Request, ERROR_EXCEPTION, ERROR_EXCEPTION_TYPE};
use crate::http::response::{Response, ResponseInfo};
use crate::http::uri::{canonical_path, HttpUri};
use crate::ids::ChannelId;
use crate::parser::{lookup_expectation, Expectation, ParserEvents};
use crate::server::Server;
use crate::transport::Transport;

thread_local! {
    static CURRENT_CHANNEL: RefCell<Option<Weak<HttpChannel>>> = RefCell::new(None);
}

/// Restores the per-thread channel slot on every exit path of the dispatch
/// loop, including panics unwinding through it.
struct CurrentGuard {
    previous: Option<Weak<HttpChannel>>,
}

impl CurrentGuard {
    fn enter(channel: &Arc<HttpChannel>) -> Self {
        let previous = CURRENT_CHANNEL
            .with(|slot| slot.borrow_mut().replace(Arc::downgrade(channel)));
        CurrentGuard { previous }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_CHANNEL.with(|slot| {
            *slot.borrow_mut() = previous;
        });
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// One HTTP request/response coordination unit, associated with one
/// connection and one in-flight request at a time.
///
/// The channel is both the parser's event sink, where it passively receives
/// request events, and a dispatchable unit of work, where it actively drives
/// the request/response lifecycle into the application, possibly suspending
/// and resuming across multiple `run` invocations. Returning `true` from a
/// parser callback signals the switch from passive to active mode; the end
/// of the active phase is signalled to the transport via
/// `channel_completed`.
pub struct HttpChannel {
    id: ChannelId,
    committed: AtomicBool,
    requests: AtomicU64,
    connector: Arc<Connector>,
    config: Arc<HttpConfig>,
    endpoint: Arc<dyn Endpoint>,
    transport: Arc<dyn Transport>,
    state: ChannelState,
    request: Request,
    response: Response,
    uri: Mutex<HttpUri>,
    version: Mutex<Version>,
    expect: AtomicBool,
    expect_100_continue: AtomicBool,
    expect_102_processing: AtomicBool,
}

impl HttpChannel {
    pub fn new(
        connector: Arc<Connector>,
        config: Arc<HttpConfig>,
        endpoint: Arc<dyn Endpoint>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let output_buffer_size = config.output_buffer_size;
        Arc::new_cyclic(|weak: &Weak<HttpChannel>| {
            let input = Arc::new(HttpInput::new());
            let output = Arc::new(HttpOutput::new(weak.clone(), output_buffer_size));
            HttpChannel {
                id: ChannelId::new(),
                committed: AtomicBool::new(false),
                requests: AtomicU64::new(0),
                state: ChannelState::new(weak.clone()),
                request: Request::new(weak.clone(), input),
                response: Response::new(weak.clone(), output),
                uri: Mutex::new(HttpUri::new()),
                version: Mutex::new(Version::HTTP_11),
                expect: AtomicBool::new(false),
                expect_100_continue: AtomicBool::new(false),
                expect_102_processing: AtomicBool::new(false),
                connector,
                config,
                endpoint,
                transport,
            }
        })
    }

    /// The channel installed in this thread's slot by a running dispatch
    /// loop. Helpers use it to locate their channel without plumbing; it is
    /// only valid while handling and never survives the loop.
    pub fn current() -> Option<Arc<HttpChannel>> {
        CURRENT_CHANNEL.with(|slot| slot.borrow().as_ref().and_then(Weak::upgrade))
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn server(&self) -> &Arc<Server> {
        self.connector.server()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.endpoint.remote_addr()
    }

    /// Number of requests handled on this connection.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn is_expecting_100_continue(&self) -> bool {
        self.expect_100_continue.load(Ordering::SeqCst)
    }

    pub fn is_expecting_102_processing(&self) -> bool {
        self.expect_102_processing.load(Ordering::SeqCst)
    }

    /// Send the promised `100 Continue` when the application first asks for
    /// the body and none of it has arrived yet.
    ///
    /// No-op unless the client asked for the continuation. A response that
    /// committed before the continuation could be sent is an error, as is
    /// losing the commit race.
    pub fn continue_100(&self, available: usize) -> Result<(), HttpError> {
        if !self.expect_100_continue.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.expect_100_continue.store(false, Ordering::SeqCst);

        if available == 0 {
            if self.is_committed() {
                return Err(HttpError::Committed);
            }
            let info = ResponseInfo::continue_100();
            if !self.commit_response(&info, None, false)? {
                return Err(HttpError::CommitRace);
            }
            // informational head: the real response has not been committed
            self.committed.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Return the channel to the pre-request state. Idempotent; legal only
    /// while idle or completed.
    pub fn reset(&self) {
        let state = self.state.state();
        if !matches!(state, State::Idle | State::Completed) {
            warn!(channel = %self.id, state = ?state, "reset ignored, request still active");
            return;
        }
        self.committed.store(false, Ordering::SeqCst);
        self.expect.store(false, Ordering::SeqCst);
        self.expect_100_continue.store(false, Ordering::SeqCst);
        self.expect_102_processing.store(false, Ordering::SeqCst);
        self.request.recycle();
        self.request.http_input().recycle();
        self.response.recycle();
        self.uri.lock().clear();
        *self.version.lock() = Version::HTTP_11;
        self.state.recycle();
    }

    /// The dispatch loop: the single entry point for the executor.
    ///
    /// Invoked once per dispatch in the life of a request; each invocation
    /// either handles the initial request, a resumed async dispatch, or the
    /// completion phase; the state machine decides which.
    pub fn run(self: &Arc<Self>) {
        debug!(channel = %self.id, "dispatch enter");
        let _guard = CurrentGuard::enter(self);

        let mut handling = self.state.handling();
        while handling && self.server().is_running() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.request.set_handled(false);
                self.response.http_output().reopen();
                if self.state.is_initial() {
                    self.request.set_dispatcher_type(DispatcherType::Request);
                    self.config.customize(self.as_ref());
                    self.server().handle(self)
                } else {
                    self.request.set_dispatcher_type(DispatcherType::Async);
                    self.server().handle_async(self)
                }
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(HttpError::Eof)) => {
                    debug!(channel = %self.id, "connection closed during dispatch");
                    self.state.error(HttpError::Eof);
                    self.request.set_handled(true);
                }
                Ok(Err(failure)) => {
                    warn!(
                        channel = %self.id,
                        path = %self.request.path_info(),
                        error = %failure,
                        "handler failed"
                    );
                    self.state.error(failure.clone());
                    self.request.set_handled(true);
                    self.handle_exception(failure);
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    error!(
                        channel = %self.id,
                        path = %self.request.path_info(),
                        panic_message = %message,
                        "handler panicked"
                    );
                    let failure = HttpError::Application(message);
                    self.state.error(failure.clone());
                    self.request.set_handled(true);
                    self.handle_exception(failure);
                }
            }
            handling = !self.state.unhandle();
        }

        if self.state.is_completing() {
            match self.complete() {
                Ok(()) => {}
                Err(HttpError::Eof) => {
                    debug!(channel = %self.id, "connection closed during completion")
                }
                Err(failure) => {
                    warn!(channel = %self.id, error = %failure, "response completion failed")
                }
            }
            self.request.set_handled(true);
            self.transport.channel_completed();
        }
        debug!(channel = %self.id, "dispatch exit");
    }

    fn complete(&self) -> Result<(), HttpError> {
        self.state.completed();

        if self.expect_100_continue.load(Ordering::SeqCst) {
            debug!(channel = %self.id, "100 continues not sent");
            // The client will either send the body anyway or close, so the
            // connection just becomes non-persistent.
            self.expect_100_continue.store(false, Ordering::SeqCst);
            if !self.is_committed() {
                if let Ok(mut fields) = self.response.fields_mut() {
                    fields.add("Connection", "close");
                }
                self.request.set_persistent(false);
            } else {
                warn!(channel = %self.id, "can't close committed non-100 response");
            }
        }

        if !self.is_committed() && !self.request.is_handled() {
            match self.state.take_error() {
                Some(HttpError::Timeout) => {
                    self.response.send_error(500, Some("request timed out"))?
                }
                _ => self.response.send_error(404, None)?,
            }
        }

        self.response.complete()
    }

    /// Map a dispatch failure to a `500`, with special handling for a
    /// request that suspended and then failed from another thread.
    ///
    /// When suspended, an application-spawned thread may still be writing
    /// the response content, so the error is committed directly, bypassing
    /// the error rendering and the response output stream. Otherwise the
    /// standard error attributes are set and `send_error` lets the
    /// configured rendering produce the page.
    pub fn handle_exception(&self, failure: HttpError) {
        let result = if self.state.is_suspended() {
            let info = ResponseInfo::synthetic(
                self.request.http_version(),
                500,
                None,
                self.request.is_head(),
            );
            match self.commit_response(&info, None, true) {
                Ok(true) => Ok(()),
                Ok(false) => {
                    warn!(
                        channel = %self.id,
                        "could not send error 500, response is already committed"
                    );
                    Ok(())
                }
                Err(err) => Err(err),
            }
        } else {
            self.request.set_attribute(ERROR_EXCEPTION, failure.clone());
            self.request
                .set_attribute(ERROR_EXCEPTION_TYPE, failure.kind().to_string());
            self.response.send_error(500, Some(&failure.to_string()))
        };
        if let Err(err) = result {
            debug!(channel = %self.id, error = %err, "could not commit response error 500");
        }
    }

    /// Atomically claim the commit and push the response head to the
    /// transport. Returns whether this caller won.
    pub(crate) fn commit_response(
        &self,
        info: &ResponseInfo,
        content: Option<&[u8]>,
        complete: bool,
    ) -> Result<bool, HttpError> {
        let committed = self
            .committed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if committed {
            debug!(channel = %self.id, status = info.status, complete, "commit response");
            self.transport.commit(info, content, complete)?;
        }
        Ok(committed)
    }

    /// Blocking content write, committing the response if needed.
    pub(crate) fn write(&self, content: &[u8], complete: bool) -> Result<(), HttpError> {
        if self.is_committed() {
            self.transport.write(content, complete)?;
            Ok(())
        } else {
            let info = self.response.new_response_info();
            let body = if content.is_empty() {
                None
            } else {
                Some(content)
            };
            if !self.commit_response(&info, body, complete)? {
                return Err(HttpError::CommitRace);
            }
            Ok(())
        }
    }
}

impl ParserEvents for HttpChannel {
    fn start_request(
        &self,
        method: Method,
        raw_method: &str,
        uri: &str,
        version: Option<Version>,
    ) -> bool {
        self.expect.store(false, Ordering::SeqCst);
        self.expect_100_continue.store(false, Ordering::SeqCst);
        self.expect_102_processing.store(false, Ordering::SeqCst);

        if self.request.time_stamp() == 0 {
            self.request.set_time_stamp(now_millis());
        }
        let connect = method == Method::CONNECT;
        self.request.set_method(method, raw_method);

        let parsed = {
            let mut scratch = self.uri.lock();
            if connect {
                scratch.parse_authority(uri);
            } else {
                scratch.parse(uri);
            }
            scratch.clone()
        };
        let path = match parsed.decoded_path() {
            Ok(path) => path,
            Err(_) => {
                warn!(
                    channel = %self.id,
                    "failed UTF-8 decode for request path, trying ISO-8859-1"
                );
                parsed.decoded_path_latin1()
            }
        };
        let path_info = canonical_path(&path)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());
        self.request.set_uri(parsed);
        self.request.set_path_info(&path_info);

        let version = version.unwrap_or(Version::HTTP_09);
        *self.version.lock() = version;
        self.request.set_http_version(version);
        false
    }

    fn parsed_header(
        &self,
        header: Option<HeaderName>,
        name: Option<&str>,
        value: Option<&str>,
    ) -> bool {
        let value = value.unwrap_or("");
        if let Some(known) = header {
            if known == header::EXPECT {
                match lookup_expectation(value) {
                    Some(Expectation::Continue) => {
                        self.expect_100_continue.store(true, Ordering::SeqCst)
                    }
                    Some(Expectation::Processing) => {
                        self.expect_102_processing.store(true, Ordering::SeqCst)
                    }
                    None => {
                        for token in value.split(',') {
                            match lookup_expectation(token) {
                                Some(Expectation::Continue) => {
                                    self.expect_100_continue.store(true, Ordering::SeqCst)
                                }
                                Some(Expectation::Processing) => {
                                    self.expect_102_processing.store(true, Ordering::SeqCst)
                                }
                                None => self.expect.store(true, Ordering::SeqCst),
                            }
                        }
                    }
                }
            } else if known == header::CONTENT_TYPE {
                if let Some(charset) = charset_from_content_type(value) {
                    self.request.set_character_encoding_unchecked(&charset);
                }
            }
        }
        if let Some(name) = name {
            self.request.fields_mut().add(name, value);
        }
        false
    }

    fn parsed_host_header(&self, host: &str, port: Option<u16>) -> bool {
        self.request.set_server_name(host);
        if let Some(port) = port {
            self.request.set_server_port(port);
        }
        false
    }

    fn header_complete(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let version = *self.version.lock();
        let time_stamp = self.request.time_stamp();

        let persistent = if version == Version::HTTP_09 {
            false
        } else if version == Version::HTTP_10 {
            let persistent = self
                .request
                .fields()
                .contains_value("Connection", "keep-alive");
            if persistent {
                if let Ok(mut fields) = self.response.fields_mut() {
                    fields.add("Connection", "keep-alive");
                }
            }
            if self.config.send_date_header {
                if let Ok(mut fields) = self.response.fields_mut() {
                    fields.put_date("Date", time_stamp);
                }
            }
            persistent
        } else if version == Version::HTTP_11 {
            let persistent = !self.request.fields().contains_value("Connection", "close");
            if !persistent {
                if let Ok(mut fields) = self.response.fields_mut() {
                    fields.add("Connection", "close");
                }
            }
            if self.config.send_date_header {
                if let Ok(mut fields) = self.response.fields_mut() {
                    fields.put_date("Date", time_stamp);
                }
            }
            if self.expect.load(Ordering::SeqCst) {
                // an expectation nothing here understands
                self.bad_message(417, Some("Expectation Failed"));
                return true;
            }
            persistent
        } else {
            self.bad_message(505, Some("HTTP Version Not Supported"));
            return true;
        };

        self.request.set_persistent(persistent);

        // Either handle now or wait for first content / message complete.
        self.expect_100_continue.load(Ordering::SeqCst)
    }

    fn content(&self, chunk: Bytes) -> bool {
        debug!(channel = %self.id, len = chunk.len(), "content");
        self.request.http_input().content(chunk);
        true
    }

    fn message_complete(&self, _content_length: u64) -> bool {
        self.request.http_input().shutdown();
        true
    }

    fn early_eof(&self) -> bool {
        self.request.http_input().shutdown();
        false
    }

    fn bad_message(&self, status: u16, reason: Option<&str>) {
        let status = if (400..=599).contains(&status) {
            status
        } else {
            400
        };
        warn!(
            channel = %self.id,
            status,
            reason = reason.unwrap_or_default(),
            "bad message"
        );
        let mut handled = false;
        if self.state.handling() {
            let info = ResponseInfo::synthetic(Version::HTTP_11, status, reason, false);
            if let Err(err) = self.commit_response(&info, None, true) {
                warn!(channel = %self.id, error = %err, "bad message response failed");
            }
            self.state.unhandle();
            handled = true;
        }
        self.state.completed();
        if handled {
            self.transport.channel_completed();
        }
    }
}

impl fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChannel")
            .field("id", &self.id)
            .field("requests", &self.requests.load(Ordering::SeqCst))
            .field("state", &self.state.state())
            .finish()
    }
}
