//! Fingerprint frame extraction.
//!
//! - `ResponseBuffer`: bytes drained from the device during one wait window.
//!   Zeroized on drop, since it may hold a raw fingerprint image.
//! - `extract`: finds the `<I>`..`</I>` payload and turns it into a `Bitmap`.
//! - `Bitmap`: fixed 176x176 RGB image, written to disk as PNG. Also zeroized
//!   on drop.
//!
//! The scanner sends 3 bytes per pixel, row-major, with no length prefix and
//! no checksum. Anything that does not match the expected geometry exactly is
//! rejected instead of being padded or truncated.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::protocol::{find_marker, IMAGE_END, IMAGE_START};

/// Width of a scanner image in pixels.
pub const FRAME_WIDTH: u32 = 176;
/// Height of a scanner image in pixels.
pub const FRAME_HEIGHT: u32 = 176;
/// Bytes per pixel on the wire (R, G, B).
pub const BYTES_PER_PIXEL: usize = 3;
/// Exact payload length of one image frame.
pub const FRAME_PAYLOAD_LEN: usize =
    FRAME_WIDTH as usize * FRAME_HEIGHT as usize * BYTES_PER_PIXEL;

// ----------------------------------------------------------------------------
// ResponseBuffer
// ----------------------------------------------------------------------------

/// Append-only buffer of bytes received during a wait window.
#[derive(Default)]
pub struct ResponseBuffer {
    data: Vec<u8>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for ResponseBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl fmt::Debug for ResponseBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBuffer")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Drop for ResponseBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// Extraction errors
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractError {
    /// No `<I>` anywhere in the buffer.
    MissingStartMarker,
    /// `<I>` found but no `</I>` after it.
    MissingEndMarker,
    /// Payload between the markers has the wrong length.
    PayloadSizeMismatch { expected: usize, actual: usize },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::MissingStartMarker => write!(f, "image start marker <I> not found"),
            ExtractError::MissingEndMarker => write!(f, "image end marker </I> not found"),
            ExtractError::PayloadSizeMismatch { expected, actual } => write!(
                f,
                "payload size mismatch: expected {} bytes, got {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for ExtractError {}

// ----------------------------------------------------------------------------
// Extraction
// ----------------------------------------------------------------------------

/// Slice out the bytes between the first `<I>` and the first `</I>` after it.
pub fn locate_payload(buf: &[u8]) -> Result<&[u8], ExtractError> {
    let start = find_marker(buf, IMAGE_START, 0).ok_or(ExtractError::MissingStartMarker)?;
    let payload_start = start + IMAGE_START.len();
    let end = find_marker(buf, IMAGE_END, payload_start).ok_or(ExtractError::MissingEndMarker)?;
    Ok(&buf[payload_start..end])
}

/// Decode the image frame embedded in a raw device response.
pub fn extract(buf: &[u8]) -> Result<Bitmap, ExtractError> {
    let payload = locate_payload(buf)?;
    Bitmap::from_payload(payload)
}

// ----------------------------------------------------------------------------
// Bitmap
// ----------------------------------------------------------------------------

/// A decoded 176x176 RGB fingerprint image. Pixels are zeroized on drop.
#[derive(Clone)]
pub struct Bitmap {
    image: RgbImage,
}

impl Bitmap {
    /// Build a bitmap from a flat row-major RGB payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ExtractError> {
        let mismatch = ExtractError::PayloadSizeMismatch {
            expected: FRAME_PAYLOAD_LEN,
            actual: payload.len(),
        };
        if payload.len() != FRAME_PAYLOAD_LEN {
            return Err(mismatch);
        }
        let image =
            RgbImage::from_raw(FRAME_WIDTH, FRAME_HEIGHT, payload.to_vec()).ok_or(mismatch)?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// RGB triple at `(x, y)`. Panics if out of bounds, like `RgbImage::get_pixel`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// SHA-256 of the pixel bytes. Used to identify a capture in logs.
    pub fn digest_hex(&self) -> String {
        hex::encode(Sha256::digest(self.image.as_raw()))
    }

    /// Write the bitmap as PNG, replacing any existing file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = temp_path_for(path);
        self.image
            .save_with_format(&tmp, ImageFormat::Png)
            .with_context(|| format!("failed to encode image to {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                tmp.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        let pixels: &mut [u8] = &mut self.image;
        pixels.zeroize();
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(prefix: &[u8], payload: &[u8], suffix: &[u8]) -> Vec<u8> {
        let mut buf = prefix.to_vec();
        buf.extend_from_slice(IMAGE_START);
        buf.extend_from_slice(payload);
        buf.extend_from_slice(IMAGE_END);
        buf.extend_from_slice(suffix);
        buf
    }

    fn gradient_payload() -> Vec<u8> {
        (0..FRAME_PAYLOAD_LEN).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn extract_solid_frame_surrounded_by_noise() {
        let buf = wrap(b"junk", &vec![10u8; FRAME_PAYLOAD_LEN], b"more");
        assert_eq!(locate_payload(&buf).unwrap().len(), 92928);

        let bitmap = extract(&buf).expect("extract");
        assert_eq!(bitmap.width(), 176);
        assert_eq!(bitmap.height(), 176);
        for y in 0..176 {
            for x in 0..176 {
                assert_eq!(bitmap.pixel(x, y), [10, 10, 10]);
            }
        }
    }

    #[test]
    fn extract_preserves_row_major_pixel_order() {
        let payload = gradient_payload();
        let bitmap = extract(&wrap(b"", &payload, b"")).expect("extract");
        assert_eq!(bitmap.as_raw(), payload.as_slice());

        let x = 5u32;
        let y = 3u32;
        let offset = (y as usize * FRAME_WIDTH as usize + x as usize) * BYTES_PER_PIXEL;
        assert_eq!(
            bitmap.pixel(x, y),
            [payload[offset], payload[offset + 1], payload[offset + 2]]
        );
    }

    #[test]
    fn missing_markers_are_reported() {
        let payload = vec![0u8; FRAME_PAYLOAD_LEN];
        let mut no_start = payload.clone();
        no_start.extend_from_slice(IMAGE_END);
        let mut no_end = IMAGE_START.to_vec();
        no_end.extend_from_slice(&payload);

        assert_eq!(extract(&no_start).unwrap_err(), ExtractError::MissingStartMarker);
        assert_eq!(extract(&no_end).unwrap_err(), ExtractError::MissingEndMarker);
        assert_eq!(extract(b"").unwrap_err(), ExtractError::MissingStartMarker);
    }

    #[test]
    fn end_marker_before_start_is_not_used() {
        let mut buf = IMAGE_END.to_vec();
        buf.extend_from_slice(IMAGE_START);
        buf.extend_from_slice(b"abc");
        assert_eq!(locate_payload(&buf).unwrap_err(), ExtractError::MissingEndMarker);
    }

    #[test]
    fn short_and_long_payloads_are_rejected() {
        let short = wrap(b"", &vec![1u8; FRAME_PAYLOAD_LEN - 1], b"");
        let long = wrap(b"", &vec![1u8; FRAME_PAYLOAD_LEN + 3], b"");
        let empty = wrap(b"", b"", b"");

        assert_eq!(
            extract(&short).unwrap_err(),
            ExtractError::PayloadSizeMismatch {
                expected: FRAME_PAYLOAD_LEN,
                actual: FRAME_PAYLOAD_LEN - 1
            }
        );
        assert!(matches!(
            extract(&long).unwrap_err(),
            ExtractError::PayloadSizeMismatch { actual, .. } if actual == FRAME_PAYLOAD_LEN + 3
        ));
        assert!(matches!(
            extract(&empty).unwrap_err(),
            ExtractError::PayloadSizeMismatch { actual: 0, .. }
        ));
    }

    #[test]
    fn save_overwrites_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fingerprint.png");
        std::fs::write(&path, b"stale").expect("seed file");

        let bitmap = Bitmap::from_payload(&gradient_payload()).expect("bitmap");
        bitmap.save(&path).expect("save");

        let decoded = image::open(&path).expect("decode png").into_rgb8();
        assert_eq!(decoded.dimensions(), (FRAME_WIDTH, FRAME_HEIGHT));
        assert_eq!(decoded.as_raw(), bitmap.as_raw());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn digest_identifies_content() {
        let a = Bitmap::from_payload(&vec![0u8; FRAME_PAYLOAD_LEN]).unwrap();
        let b = Bitmap::from_payload(&gradient_payload()).unwrap();
        assert_eq!(a.digest_hex().len(), 64);
        assert_ne!(a.digest_hex(), b.digest_hex());
    }

    #[test]
    fn response_buffer_accumulates() {
        let mut buf = ResponseBuffer::new();
        assert!(buf.is_empty());
        buf.extend(b"<I>");
        buf.extend(b"ab");
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.as_bytes(), b"<I>ab");
    }
}
