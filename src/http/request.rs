use http::{Method, Version};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::channel::HttpChannel;
use crate::error::HttpError;
use crate::http::fields::HeaderFields;
use crate::http::input::HttpInput;
use crate::http::uri::HttpUri;

/// Request attribute carrying the failure that sent the dispatch to the
/// error path.
pub const ERROR_EXCEPTION: &str = "brrtchannel.error.exception";
/// Request attribute carrying the failure's kind name.
pub const ERROR_EXCEPTION_TYPE: &str = "brrtchannel.error.exception_type";

/// How the current dispatch entered the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherType {
    /// Initial dispatch of a request
    Request,
    /// Redispatch after a suspend/resume cycle
    Async,
    /// Dispatch into an error handler
    Error,
}

struct RequestState {
    method: Method,
    raw_method: String,
    uri: HttpUri,
    version: Version,
    path_info: String,
    server_name: Option<String>,
    server_port: Option<u16>,
    time_stamp: u64,
    dispatcher_type: DispatcherType,
    persistent: bool,
    character_encoding: Option<String>,
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl RequestState {
    fn fresh() -> Self {
        Self {
            method: Method::GET,
            raw_method: String::new(),
            uri: HttpUri::new(),
            version: Version::HTTP_11,
            path_info: String::new(),
            server_name: None,
            server_port: None,
            time_stamp: 0,
            dispatcher_type: DispatcherType::Request,
            persistent: false,
            character_encoding: None,
            attributes: HashMap::new(),
        }
    }
}

/// The request the channel accumulates from parser events and hands to the
/// application.
///
/// Parser callbacks populate it before header-complete; while dispatched,
/// only the handling worker may mutate it. The header multimap and the
/// attribute bag are not safe for concurrent mutation from application
/// threads; quiesce helpers before suspending.
pub struct Request {
    state: Mutex<RequestState>,
    fields: RwLock<HeaderFields>,
    handled: std::sync::atomic::AtomicBool,
    input: Arc<HttpInput>,
    channel: Weak<HttpChannel>,
}

impl Request {
    pub(crate) fn new(channel: Weak<HttpChannel>, input: Arc<HttpInput>) -> Self {
        Self {
            state: Mutex::new(RequestState::fresh()),
            fields: RwLock::new(HeaderFields::new()),
            handled: std::sync::atomic::AtomicBool::new(false),
            input,
            channel,
        }
    }

    pub fn method(&self) -> Method {
        self.state.lock().method.clone()
    }

    pub fn raw_method(&self) -> String {
        self.state.lock().raw_method.clone()
    }

    pub fn set_method(&self, method: Method, raw: &str) {
        let mut state = self.state.lock();
        state.method = method;
        state.raw_method = raw.to_string();
    }

    pub fn is_head(&self) -> bool {
        self.state.lock().method == Method::HEAD
    }

    pub fn uri(&self) -> HttpUri {
        self.state.lock().uri.clone()
    }

    pub fn set_uri(&self, uri: HttpUri) {
        self.state.lock().uri = uri;
    }

    /// Canonicalised, decoded request path.
    pub fn path_info(&self) -> String {
        self.state.lock().path_info.clone()
    }

    pub fn set_path_info(&self, path: &str) {
        self.state.lock().path_info = path.to_string();
    }

    pub fn http_version(&self) -> Version {
        self.state.lock().version
    }

    pub fn set_http_version(&self, version: Version) {
        self.state.lock().version = version;
    }

    pub fn server_name(&self) -> Option<String> {
        self.state.lock().server_name.clone()
    }

    pub fn set_server_name(&self, name: &str) {
        self.state.lock().server_name = Some(name.to_string());
    }

    pub fn server_port(&self) -> Option<u16> {
        self.state.lock().server_port
    }

    pub fn set_server_port(&self, port: u16) {
        self.state.lock().server_port = Some(port);
    }

    /// Install a charset derived from the `Content-Type` header without
    /// validating it; a bogus charset surfaces when the body is decoded,
    /// not at parse time.
    pub fn set_character_encoding_unchecked(&self, charset: &str) {
        self.state.lock().character_encoding = Some(charset.to_string());
    }

    pub fn character_encoding(&self) -> Option<String> {
        self.state.lock().character_encoding.clone()
    }

    pub fn is_persistent(&self) -> bool {
        self.state.lock().persistent
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.state.lock().persistent = persistent;
    }

    pub fn dispatcher_type(&self) -> DispatcherType {
        self.state.lock().dispatcher_type
    }

    pub fn set_dispatcher_type(&self, dispatcher_type: DispatcherType) {
        self.state.lock().dispatcher_type = dispatcher_type;
    }

    pub fn is_handled(&self) -> bool {
        self.handled.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn set_handled(&self, handled: bool) {
        self.handled
            .store(handled, std::sync::atomic::Ordering::SeqCst);
    }

    /// Milliseconds since the UNIX epoch at which the first byte of the
    /// request arrived; zero before any request.
    pub fn time_stamp(&self) -> u64 {
        self.state.lock().time_stamp
    }

    pub fn set_time_stamp(&self, millis: u64) {
        self.state.lock().time_stamp = millis;
    }

    pub fn set_attribute<T: Any + Send + Sync>(&self, name: &str, value: T) {
        self.state
            .lock()
            .attributes
            .insert(name.to_string(), Box::new(value));
    }

    /// Typed attribute lookup; `None` when absent or of another type.
    pub fn attribute<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.state
            .lock()
            .attributes
            .get(name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn remove_attribute(&self, name: &str) {
        self.state.lock().attributes.remove(name);
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.state.lock().attributes.keys().cloned().collect()
    }

    /// Read access to the header multimap.
    pub fn fields(&self) -> RwLockReadGuard<'_, HeaderFields> {
        self.fields.read()
    }

    /// Write access to the header multimap for structured add.
    pub fn fields_mut(&self) -> RwLockWriteGuard<'_, HeaderFields> {
        self.fields.write()
    }

    /// The body queue the channel forwards parser buffers into.
    pub fn http_input(&self) -> Arc<HttpInput> {
        self.input.clone()
    }

    /// The body stream for application reads. First use tells the channel
    /// the handler is ready for the body, which sends the promised
    /// `100 Continue` when the client asked for one.
    pub fn input_stream(&self) -> Result<Arc<HttpInput>, HttpError> {
        if let Some(channel) = self.channel.upgrade() {
            channel.continue_100(self.input.available())?;
        }
        Ok(self.input.clone())
    }

    /// Reset every per-request attribute. The input queue is recycled
    /// separately by the channel.
    pub fn recycle(&self) {
        *self.state.lock() = RequestState::fresh();
        self.fields.write().clear();
        self.set_handled(false);
    }
}
