//! # HTTP Module
//!
//! Request/response objects and their supporting pieces: the header
//! multimap, the URI scratch buffer, charset interning, and the body
//! streams.
//!
//! ## Overview
//!
//! - [`Request`] - accumulates parsed request data and exposes the
//!   attribute bag and the input stream
//! - [`Response`] - accumulates status and headers until commit, owns the
//!   output stream
//! - [`HeaderFields`] - insertion-order preserving, case-insensitive header
//!   multimap
//! - [`HttpUri`] - request-target parsing with percent-decode and
//!   canonicalisation
//! - [`HttpInput`] / [`HttpOutput`] - blocking body streams wired through
//!   the channel
//!
//! Mutation is phase-serialized rather than locked: the parser writes only
//! before header-complete, the handler reads and writes only while
//! dispatched, and commit-time reads happen after the handler quiesces.

/// Header multimap
pub mod fields;
/// Request body queue
pub mod input;
/// Content-type charset interning
pub mod mime;
/// Buffered response body sink
pub mod output;
/// The request the application sees
pub mod request;
/// The response the application mutates until commit
pub mod response;
/// Request-target scratch buffer
pub mod uri;

pub use fields::{HeaderField, HeaderFields, MAX_INLINE_FIELDS};
pub use input::HttpInput;
pub use mime::charset_from_content_type;
pub use output::HttpOutput;
pub use request::{DispatcherType, Request, ERROR_EXCEPTION, ERROR_EXCEPTION_TYPE};
pub use response::{status_reason, Response, ResponseInfo};
pub use uri::{canonical_path, percent_decode, HttpUri};
