// Screenshot capture via xcap, downscaled and persisted for the decision round.
use std::io::Cursor;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ImageEncoder, RgbaImage};

use crate::config::ScreenshotConfig;
use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::ScreenCapture;
use crate::perception::types::CaptureResult;

/// Captures the primary monitor with xcap.
pub struct XcapCapture {
    config: ScreenshotConfig,
}

impl XcapCapture {
    pub fn new(config: ScreenshotConfig) -> Self {
        Self { config }
    }
}

impl ScreenCapture for XcapCapture {
    fn capture(&mut self) -> PilotResult<CaptureResult> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| PilotError::Capture(format!("list monitors: {e}")))?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .ok_or_else(|| PilotError::Capture("no monitor found".into()))?;

        let frame = monitor
            .capture_image()
            .map_err(|e| PilotError::Capture(format!("capture: {e}")))?;
        // xcap returns its own `image` version's buffer; rewrap the raw RGBA bytes.
        let (fw, fh) = frame.dimensions();
        let frame = RgbaImage::from_raw(fw, fh, frame.into_raw())
            .ok_or_else(|| PilotError::Capture("frame buffer size mismatch".into()))?;

        process_frame(frame, &self.config)
    }
}

/// Ratio that brings the longest edge down to `max_edge`, or 1.0 when the
/// image already fits.
pub fn downscale_factor(width: u32, height: u32, max_edge: u32) -> f64 {
    let longest = width.max(height);
    if max_edge == 0 || longest <= max_edge {
        1.0
    } else {
        max_edge as f64 / longest as f64
    }
}

/// Downscale (when optimizing for speed), encode and persist a raw frame.
pub fn process_frame(frame: RgbaImage, config: &ScreenshotConfig) -> PilotResult<CaptureResult> {
    let (screen_width, screen_height) = frame.dimensions();

    let scale = if config.optimize_for_speed {
        downscale_factor(screen_width, screen_height, config.max_png)
    } else {
        1.0
    };

    let image = if scale < 1.0 {
        let w = ((screen_width as f64 * scale).round() as u32).max(1);
        let h = ((screen_height as f64 * scale).round() as u32).max(1);
        image::imageops::resize(&frame, w, h, image::imageops::FilterType::Triangle)
    } else {
        frame
    };
    let (width, height) = image.dimensions();

    let png_bytes = encode_png(&image, config.optimize_for_speed)?;
    persist(&config.input_path, &png_bytes)?;

    tracing::debug!(
        path = %config.input_path.display(),
        screen = %format!("{screen_width}×{screen_height}"),
        image = %format!("{width}×{height}"),
        scale,
        bytes = png_bytes.len(),
        "screenshot captured"
    );

    Ok(CaptureResult {
        path: config.input_path.clone(),
        scale,
        width,
        height,
        screen_width,
        screen_height,
        png_bytes,
    })
}

fn encode_png(image: &RgbaImage, fast: bool) -> PilotResult<Vec<u8>> {
    let mut out = Vec::new();
    if fast {
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, PngFilter::Adaptive)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| PilotError::Capture(format!("PNG encode: {e}")))?;
    } else {
        image
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .map_err(|e| PilotError::Capture(format!("PNG encode: {e}")))?;
    }
    Ok(out)
}

fn persist(path: &Path, bytes: &[u8]) -> PilotResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PilotError::Capture(format!("create {}: {e}", parent.display())))?;
        }
    }
    std::fs::write(path, bytes)
        .map_err(|e| PilotError::Capture(format!("write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path, max_png: u32, optimize: bool) -> ScreenshotConfig {
        ScreenshotConfig {
            optimize_for_speed: optimize,
            max_png,
            input_path: dir.join("shots").join("screen.png"),
            output_path: dir.join("label"),
        }
    }

    #[test]
    fn factor_only_shrinks() {
        assert_eq!(downscale_factor(1280, 720, 1280), 1.0);
        assert_eq!(downscale_factor(800, 600, 1280), 1.0);
        assert_eq!(downscale_factor(2560, 1440, 1280), 0.5);
        assert_eq!(downscale_factor(1000, 4000, 1000), 0.25);
    }

    #[test]
    fn large_frame_is_downscaled_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path(), 100, true);
        let frame = RgbaImage::from_pixel(400, 200, image::Rgba([10, 20, 30, 255]));

        let shot = process_frame(frame, &cfg).unwrap();
        assert_eq!(shot.scale, 0.25);
        assert_eq!((shot.width, shot.height), (100, 50));
        assert_eq!((shot.screen_width, shot.screen_height), (400, 200));
        assert!(shot.path.exists());

        let decoded = image::load_from_memory(&shot.png_bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn no_downscale_without_speed_optimization() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path(), 100, false);
        let frame = RgbaImage::new(300, 150);

        let shot = process_frame(frame, &cfg).unwrap();
        assert_eq!(shot.scale, 1.0);
        assert_eq!((shot.width, shot.height), (300, 150));
    }
}
