pub mod alert;
pub mod boxes;
pub mod client;
pub mod config;
pub mod details;
pub mod dispatcher;
pub mod errors;
mod metrics;
pub mod response;
pub mod scene;
pub mod stats;

pub use alert::{AlertSink, FileAlertLog};
pub use boxes::BoundingBox;
pub use client::{Detector, HttpDetector};
pub use config::{DetectionSettings, DispatcherConfig};
pub use details::FrameDetails;
pub use dispatcher::{Dispatcher, SamplingStream, TickOutcome, sampling_order};
pub use errors::DetectorError;
pub use response::{DetectionResult, DetectorReply};
pub use scene::{BoxVerdict, FrameVerdict, SceneChangeGate, SceneGateConfig};
pub use stats::{DetectionState, DetectionStats, FireStatus, ResponseRecord};
