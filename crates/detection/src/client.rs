use crate::errors::DetectorError;
use crate::response::DetectionResult;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

pub const CAMERA_ID_HEADER: &str = "camera-id";

/// Remote fire classifier. One call per sampled frame.
pub trait Detector: Send {
    fn detect(&self, jpeg: Vec<u8>) -> Result<DetectionResult, DetectorError>;
}

/// POSTs JPEG frames to an HTTP endpoint.
pub struct HttpDetector {
    client: Client,
    endpoint: String,
    camera_id: String,
    timeout: Duration,
}

impl HttpDetector {
    pub fn new(
        endpoint: impl Into<String>,
        camera_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DetectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            camera_id: camera_id.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Detector for HttpDetector {
    fn detect(&self, jpeg: Vec<u8>) -> Result<DetectionResult, DetectorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "image/jpeg")
            .header(CAMERA_ID_HEADER, &self.camera_id)
            .body(jpeg)
            .send()
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(DetectorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(DetectionResult::new(status.as_u16(), body))
    }
}

impl HttpDetector {
    fn classify(&self, e: reqwest::Error) -> DetectorError {
        if e.is_timeout() {
            DetectorError::Timeout(self.timeout)
        } else {
            DetectorError::Transport(e.to_string())
        }
    }
}
