use crate::errors::{CaptureError, EncodeError};
use chrono::{DateTime, Utc};
use image::{ExtendedColorType, ImageBuffer, Rgb, RgbImage, codecs::jpeg::JpegEncoder, imageops};
use serde::Serialize;
use std::borrow::Cow;

/// Byte order of the three interleaved channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
}

impl PixelFormat {
    pub const fn channels(self) -> usize {
        3
    }
}

/// One decoded video frame.
///
/// Immutable once built: the buffer shares frames as `Arc<Frame>` and consumers
/// only ever read them. `sequence` is 0 until the frame is published.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    captured_at: DateTime<Utc>,
    sequence: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, CaptureError> {
        Self::with_timestamp(width, height, format, data, Utc::now())
    }

    pub fn with_timestamp(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Decode(format!(
                "empty frame dimensions {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(CaptureError::Decode(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            data,
            captured_at,
            sequence: 0,
        })
    }

    pub(crate) fn stamped(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn same_geometry(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }

    /// Pixels in RGB order, borrowing when no swizzle is needed.
    pub fn rgb_bytes(&self) -> Cow<'_, [u8]> {
        match self.format {
            PixelFormat::Rgb8 => Cow::Borrowed(&self.data),
            PixelFormat::Bgr8 => Cow::Owned(
                self.data
                    .chunks_exact(3)
                    .flat_map(|px| [px[2], px[1], px[0]])
                    .collect(),
            ),
        }
    }

    /// Shrink frames wider than `max_width`, keeping the aspect ratio.
    ///
    /// Returns `Ok(None)` when the frame already fits. The channel order is
    /// preserved (resampling is per channel).
    pub fn downscaled(&self, max_width: u32) -> Result<Option<Frame>, CaptureError> {
        if max_width == 0 || self.width <= max_width {
            return Ok(None);
        }

        let new_height =
            ((self.height as u64 * max_width as u64) / self.width as u64).max(1) as u32;

        let source: RgbImage = ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| CaptureError::Decode("pixel buffer too small to resize".into()))?;
        let resized = imageops::resize(&source, max_width, new_height, imageops::FilterType::Triangle);

        let frame = Frame::with_timestamp(
            max_width,
            new_height,
            self.format,
            resized.into_raw(),
            self.captured_at,
        )?;
        Ok(Some(frame))
    }

    /// Encode to baseline JPEG entirely in memory.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, EncodeError> {
        let rgb = self.rgb_bytes();
        let mut jpeg = Vec::with_capacity(rgb.len() / 8);
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
            encoder.encode(&rgb, self.width, self.height, ExtendedColorType::Rgb8)?;
        }
        Ok(jpeg)
    }

    /// Decode a JPEG back into an RGB frame.
    pub fn from_jpeg(jpeg: &[u8]) -> Result<Self, CaptureError> {
        let decoded: ImageBuffer<Rgb<u8>, Vec<u8>> = image::load_from_memory(jpeg)
            .map_err(|e| CaptureError::Decode(e.to_string()))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        Self::new(width, height, PixelFormat::Rgb8, decoded.into_raw())
    }
}
