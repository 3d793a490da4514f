//! Still frames and the detection classifier.
//!
//! A [`Frame`] is a packed RGB8 buffer.  The capture worker produces it from
//! the file written by the still-image source ([`ImageFileDecoder`]), the
//! classifier reads it, and the archive encodes it back to JPEG.

pub mod classifier;

use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::app::ports::FrameDecoder;
use crate::error::{IoError, Result};

pub use classifier::{Classification, ColorRegionClassifier, RegionBox};

/// Owned RGB8 image.  Moved into each frame handler, never shared mutably.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    captured_at: SystemTime,
}

impl Frame {
    /// Wrap a packed RGB buffer.  Returns `None` if the length does not
    /// match `width * height * 3`.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
            captured_at: SystemTime::now(),
        })
    }

    /// A frame of one solid colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
            captured_at: SystemTime::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.index(x, y);
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = self.index(x, y);
        self.pixels[i..i + 3].copy_from_slice(&rgb);
    }

    /// Paint an axis-aligned rectangle, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
        for yy in y..(y + h).min(self.height) {
            for xx in x..(x + w).min(self.width) {
                self.put_pixel(xx, yy, rgb);
            }
        }
    }

    /// Encode as baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let image = RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| IoError::Archive("frame buffer size mismatch".into()))?;
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&image)
            .map_err(|err| IoError::Archive(format!("JPEG encode failed: {err}")))?;
        Ok(buffer)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    fn from_image(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.as_raw().clone(),
            captured_at: SystemTime::now(),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

/// Decodes the capture file (JPEG or PNG) with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFileDecoder;

impl FrameDecoder for ImageFileDecoder {
    fn decode(&self, path: &Path) -> Result<Frame> {
        let decoded = image::open(path)
            .map_err(|err| IoError::Decode(format!("{}: {err}", path.display())))?;
        Ok(Frame::from_image(&decoded.to_rgb8()))
    }
}

/// Draw a 1-px rectangle outline onto `frame`, clipped to its bounds.
pub(crate) fn draw_rectangle(frame: &mut Frame, left: u32, top: u32, right: u32, bottom: u32, rgb: [u8; 3]) {
    if frame.width == 0 || frame.height == 0 {
        return;
    }
    let right = right.min(frame.width - 1);
    let bottom = bottom.min(frame.height - 1);
    let left = left.min(right);
    let top = top.min(bottom);
    for x in left..=right {
        frame.put_pixel(x, top, rgb);
        frame.put_pixel(x, bottom, rgb);
    }
    for y in top..=bottom {
        frame.put_pixel(left, y, rgb);
        frame.put_pixel(right, y, rgb);
    }
}
