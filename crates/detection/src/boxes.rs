use serde::Serialize;
use serde_json::{Map, Value};

/// Axis-aligned box in detector pixel coordinates, `(x1, y1)` top-left.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            label: None,
            confidence: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Parse one detector box.
    ///
    /// Accepts `[x1, y1, x2, y2, ...]`, where the trailing items may be a
    /// string label and a numeric confidence in either order, or an object
    /// with `x1`..`y2` plus optional `label`/`class` and `confidence`/`score`.
    /// Anything without four numeric coordinates is rejected.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Self::from_array(items),
            Value::Object(fields) => Self::from_object(fields),
            _ => None,
        }
    }

    fn from_array(items: &[Value]) -> Option<Self> {
        if items.len() < 4 {
            return None;
        }
        let mut coords = [0.0; 4];
        for (slot, item) in coords.iter_mut().zip(items) {
            *slot = item.as_f64()?;
        }
        let mut parsed = Self::new(coords[0], coords[1], coords[2], coords[3]);
        for extra in &items[4..] {
            match extra {
                Value::String(label) if parsed.label.is_none() => {
                    parsed.label = Some(label.clone());
                }
                Value::Number(n) if parsed.confidence.is_none() => {
                    parsed.confidence = n.as_f64();
                }
                _ => {}
            }
        }
        Some(parsed)
    }

    fn from_object(fields: &Map<String, Value>) -> Option<Self> {
        let coord = |key: &str| fields.get(key).and_then(Value::as_f64);
        let mut parsed = Self::new(coord("x1")?, coord("y1")?, coord("x2")?, coord("y2")?);
        parsed.label = ["label", "class"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::to_owned);
        parsed.confidence = ["confidence", "score"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_f64));
        Some(parsed)
    }

    /// Area, or 0 for inverted boxes.
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union. 0 when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}
