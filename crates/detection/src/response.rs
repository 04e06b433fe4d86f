use crate::boxes::BoundingBox;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Detector body, classified by how it could be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DetectorReply {
    /// A JSON object.
    Parsed {
        fire_detected: bool,
        boxes: Vec<BoundingBox>,
    },
    /// Anything else; only the string heuristic applies.
    Unparsed { raw_text: String },
}

impl DetectorReply {
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => {
                let fire_detected = map
                    .get("fire_detected")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let boxes = map
                    .get("boxes")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(BoundingBox::from_json).collect())
                    .unwrap_or_default();
                DetectorReply::Parsed {
                    fire_detected,
                    boxes,
                }
            }
            _ => DetectorReply::Unparsed {
                raw_text: body.to_string(),
            },
        }
    }

    /// Only a positive answer counts; everything else is "no fire".
    pub fn fire_detected(&self) -> bool {
        match self {
            DetectorReply::Parsed { fire_detected, .. } => *fire_detected,
            DetectorReply::Unparsed { raw_text } => text_mentions_fire(raw_text),
        }
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        match self {
            DetectorReply::Parsed { boxes, .. } => boxes,
            DetectorReply::Unparsed { .. } => &[],
        }
    }
}

/// Fallback for bodies that are not a JSON object.
fn text_mentions_fire(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("fire_detected\": true") || lower.contains("\"fire\": true")
}

/// One successful detector exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub status: u16,
    pub body: String,
    pub reply: DetectorReply,
    pub received_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            status,
            reply: DetectorReply::parse(&body),
            body,
            received_at: Utc::now(),
        }
    }

    pub fn fire_detected(&self) -> bool {
        self.reply.fire_detected()
    }

    /// The box the static-fire check tracks.
    pub fn primary_box(&self) -> Option<&BoundingBox> {
        self.reply.boxes().first()
    }
}
