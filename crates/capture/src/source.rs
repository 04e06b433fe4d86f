use crate::{errors::CaptureError, frame::Frame};
use std::time::Duration;

/// An open connection to a video source. Dropping it releases the connection
/// and any decoder resources.
pub trait FrameStream: Send {
    /// Wait up to `wait` for the next decoded frame.
    ///
    /// `Ok(None)` means nothing arrived in time; the stream is still open.
    fn next_frame(&mut self, wait: Duration) -> Result<Option<Frame>, CaptureError>;
}

/// Opens [`FrameStream`]s for URLs. Shared by every reader of a process.
pub trait VideoSource: Send + Sync {
    fn open(&self, url: &str, timeout: Duration) -> Result<Box<dyn FrameStream>, CaptureError>;
}
