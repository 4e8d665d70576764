pub mod channel;
pub mod config;
pub mod connector;
pub mod error;
pub mod http;
pub mod ids;
pub mod parser;
pub mod runtime_config;
pub mod server;
pub mod transport;

pub use crate::channel::{ChannelState, HttpChannel, State};
pub use crate::config::HttpConfig;
pub use crate::connector::{Connector, Endpoint, Executor, Scheduler, TimerHandle};
pub use crate::error::HttpError;
pub use crate::http::{
    DispatcherType,
    HeaderFields,
    HttpInput,
    HttpOutput,
    HttpUri,
    Request,
    Response,
    ResponseInfo,
};
pub use crate::parser::{Expectation, ParserEvents};
pub use crate::runtime_config::RuntimeConfig;
pub use crate::server::{Handler, Server};
pub use crate::transport::Transport;
