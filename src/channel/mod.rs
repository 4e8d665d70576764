//! # Channel Module
//!
//! The channel module is the heart of BRRTChannel: the per-connection
//! coordinator that bridges an incremental HTTP/1.x parser to an application
//! handler and drives the response out through the transport.
//!
//! ## Overview
//!
//! An [`HttpChannel`] wears two hats:
//!
//! - **Parser event sink** - it implements [`crate::parser::ParserEvents`],
//!   passively accumulating request data as bytes land on the socket. A
//!   `true` return from a callback asks the parser to pause so the
//!   application can run.
//! - **Dispatchable work** - `HttpChannel::run` is posted to the connector's
//!   executor and actively drives the application, possibly suspending and
//!   resuming across several invocations.
//!
//! The [`ChannelState`] machine is the only synchronization point between
//! the dispatching worker and the timers or application threads that resume
//! a suspended request.
//!
//! ## Request Flow
//!
//! 1. Parser events populate the request (`start_request`, headers,
//!    `header_complete`)
//! 2. The connection posts the channel to the executor
//! 3. `run` claims the dispatch via `ChannelState::handling` and invokes the
//!    server's handler
//! 4. Handler writes route through the channel, committing the response on
//!    first contact with the transport
//! 5. `ChannelState::unhandle` decides: done, suspended, or iterate
//! 6. The completion phase finalises the response and notifies the
//!    transport via `channel_completed`
//!
//! ## Error Handling
//!
//! Malformed requests short-circuit through `bad_message` to a synthetic
//! 4xx response without dispatching the application. Handler failures and
//! panics become `500` responses; failures after the response committed are
//! logged and dropped, since the wire already carries the head.

mod core;
mod state;

pub use self::core::HttpChannel;
pub use self::state::{ChannelState, State};
