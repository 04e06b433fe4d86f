pub mod buffer;
pub mod candidates;
pub mod config;
pub mod errors;
pub mod ffmpeg;
pub mod frame;
pub mod hls;
pub mod pacing;
pub mod probe;
pub mod reader;
pub mod source;

pub use buffer::FrameBuffer;
pub use candidates::{CameraEndpoint, StreamCandidate, redact};
pub use config::{CaptureSettings, ReaderConfig};
pub use errors::{CaptureError, EncodeError};
pub use ffmpeg::FfmpegSource;
pub use frame::{Frame, PixelFormat};
pub use hls::HlsSource;
pub use probe::{discover_streams, probe_candidates};
pub use reader::{ReaderState, ReaderStats, ReaderStatus, StreamReader};
pub use source::{FrameStream, VideoSource};
