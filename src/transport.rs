use std::io;

use crate::http::response::ResponseInfo;

/// The response sink the surrounding connection implements.
///
/// The channel never frames bytes itself; it hands the transport an
/// immutable head snapshot plus content and lets it serialise, the same way
/// services plug into a server seam elsewhere in the BRRT stack. All three
/// operations are blocking by contract.
pub trait Transport: Send + Sync {
    /// Serialise `info` as the response head, append `content` when present
    /// and, if `complete`, finalise the response (trailing chunk terminator,
    /// final zero-length write). Called at most once per request, plus at
    /// most one informational `100 Continue` head before it.
    fn commit(
        &self,
        info: &ResponseInfo,
        content: Option<&[u8]>,
        complete: bool,
    ) -> io::Result<()>;

    /// Append further content after the commit; if `complete`, finalise.
    fn write(&self, content: &[u8], complete: bool) -> io::Result<()>;

    /// The channel has finished its active phase; the transport may release
    /// resources or start reading the next request.
    fn channel_completed(&self);
}
