use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Detector did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Detector returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Detector request failed: {0}")]
    Transport(String),
}

impl DetectorError {
    /// Short description kept as the last AI response in the stats.
    pub fn summary(&self) -> String {
        match self {
            DetectorError::Timeout(_) => "API Timeout".to_string(),
            DetectorError::Status { status, .. } => format!("API Error: {}", status),
            DetectorError::Transport(msg) => format!("Error: {}", msg),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DetectorError::Timeout(_) => "timeout",
            DetectorError::Status { .. } => "status",
            DetectorError::Transport(_) => "transport",
        }
    }
}
