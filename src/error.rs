use std::error::Error;
use std::fmt;
use std::io;

/// Errors observed or produced by the channel core.
///
/// Failures during dispatch are recorded on the channel state and converted
/// to responses only while the response is still uncommitted. Failures during
/// response completion are swallowed with a log line, since the peer may
/// already be gone.
#[derive(Debug, Clone)]
pub enum HttpError {
    /// Malformed request reported by the parser; answered with a synthetic
    /// response in the 4xx/5xx range.
    BadMessage {
        /// Response status, clamped to 400..=599
        status: u16,
        /// Optional reason phrase supplied by the parser
        reason: Option<String>,
    },
    /// Lost the compare-and-set race on the committed flag.
    CommitRace,
    /// Attempt to mutate status or headers after the response was committed.
    Committed,
    /// Connection closed mid-read or mid-write.
    Eof,
    /// Scheduler-driven request timeout.
    Timeout,
    /// Write to an output stream that was already closed.
    Closed,
    /// An operation was invoked in a lifecycle state that does not allow it.
    IllegalState(String),
    /// The application handler failed.
    Application(String),
    /// Any other I/O failure, with the originating kind preserved.
    Io(io::ErrorKind, String),
}

impl HttpError {
    /// Short stable name for the error kind, used in request attributes
    /// and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            HttpError::BadMessage { .. } => "bad-message",
            HttpError::CommitRace => "commit-race",
            HttpError::Committed => "committed",
            HttpError::Eof => "eof",
            HttpError::Timeout => "timeout",
            HttpError::Closed => "closed",
            HttpError::IllegalState(_) => "illegal-state",
            HttpError::Application(_) => "application",
            HttpError::Io(_, _) => "io",
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::BadMessage { status, reason } => match reason {
                Some(reason) => write!(f, "bad message: {} {}", status, reason),
                None => write!(f, "bad message: {}", status),
            },
            HttpError::CommitRace => write!(f, "concurrent commit"),
            HttpError::Committed => write!(f, "response is already committed"),
            HttpError::Eof => write!(f, "early EOF"),
            HttpError::Timeout => write!(f, "request timed out"),
            HttpError::Closed => write!(f, "output is closed"),
            HttpError::IllegalState(msg) => write!(f, "illegal state: {}", msg),
            HttpError::Application(msg) => write!(f, "handler failed: {}", msg),
            HttpError::Io(kind, msg) => write!(f, "i/o error ({:?}): {}", kind, msg),
        }
    }
}

impl Error for HttpError {}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => HttpError::Eof,
            kind => HttpError::Io(kind, err.to_string()),
        }
    }
}

impl From<HttpError> for io::Error {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string()),
            HttpError::Timeout => io::Error::new(io::ErrorKind::TimedOut, err.to_string()),
            HttpError::Io(kind, msg) => io::Error::new(kind, msg),
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_round_trips_through_io() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "peer went away");
        assert!(matches!(HttpError::from(io_err), HttpError::Eof));
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(HttpError::CommitRace.kind(), "commit-race");
        assert_eq!(
            HttpError::BadMessage {
                status: 400,
                reason: None
            }
            .kind(),
            "bad-message"
        );
    }
}
