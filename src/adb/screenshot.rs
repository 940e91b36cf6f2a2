//! Screenshot utilities for capturing Android device screen.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, RgbImage};
use std::io::Cursor;

use super::connection::run_adb;

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Represents a captured screenshot.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
    pub is_sensitive: bool,
}

impl Screenshot {
    /// Create a new screenshot.
    pub fn new(base64_data: String, width: u32, height: u32, is_sensitive: bool) -> Self {
        Self {
            base64_data,
            width,
            height,
            is_sensitive,
        }
    }

    /// Create a fallback black screenshot.
    pub fn fallback(is_sensitive: bool) -> Self {
        create_fallback_screenshot(is_sensitive)
    }
}

/// Capture a screenshot via `adb exec-out screencap -p`.
///
/// Never fails: sensitive screens (payment pages) and capture errors yield
/// a black fallback image so the cycle can still proceed on the UI tree.
pub async fn get_screenshot(device_id: Option<&str>) -> Screenshot {
    let output = match run_adb(device_id, ["exec-out", "screencap", "-p"]).await {
        Ok(output) => output,
        Err(e) => {
            tracing::error!("Screenshot command failed: {}", e);
            return create_fallback_screenshot(false);
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("Status: -1") || stderr.contains("Failed") || stderr.contains("error") {
        tracing::warn!("Screenshot may have failed (sensitive screen): {}", stderr);
        return create_fallback_screenshot(true);
    }

    decode_png(&output.stdout).unwrap_or_else(|| create_fallback_screenshot(false))
}

fn decode_png(png_data: &[u8]) -> Option<Screenshot> {
    if png_data.len() < PNG_MAGIC.len() || &png_data[..PNG_MAGIC.len()] != PNG_MAGIC {
        tracing::error!("Invalid PNG data ({} bytes)", png_data.len());
        return None;
    }

    match image::load_from_memory(png_data) {
        Ok(img) => Some(Screenshot::new(
            STANDARD.encode(png_data),
            img.width(),
            img.height(),
            false,
        )),
        Err(e) => {
            tracing::error!("Failed to parse screenshot image: {}", e);
            None
        }
    }
}

/// Create a black fallback image when screenshot fails.
fn create_fallback_screenshot(is_sensitive: bool) -> Screenshot {
    let default_width: u32 = 1080;
    let default_height: u32 = 2400;

    let black_img = RgbImage::new(default_width, default_height);
    let dynamic_img = DynamicImage::ImageRgb8(black_img);

    let mut buffer = Cursor::new(Vec::new());
    if let Err(e) = dynamic_img.write_to(&mut buffer, image::ImageFormat::Png) {
        tracing::error!("Failed to encode fallback screenshot: {}", e);
    }
    let base64_data = STANDARD.encode(buffer.into_inner());

    Screenshot::new(base64_data, default_width, default_height, is_sensitive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_screenshot() {
        let screenshot = create_fallback_screenshot(true);
        assert_eq!(screenshot.width, 1080);
        assert_eq!(screenshot.height, 2400);
        assert!(screenshot.is_sensitive);
        assert!(!screenshot.base64_data.is_empty());
    }

    #[test]
    fn test_decode_png_reads_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 3));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();

        let screenshot = decode_png(&buffer.into_inner()).unwrap();
        assert_eq!((screenshot.width, screenshot.height), (4, 3));
    }

    #[test]
    fn test_decode_png_rejects_non_png() {
        assert!(decode_png(b"not a png at all").is_none());
    }
}
