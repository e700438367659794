use std::path::PathBuf;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// One still image of the display, as sent to the decision service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResult {
    /// Where the (possibly downscaled) image was persisted.
    pub path: PathBuf,
    /// Downscale ratio applied; screen pixels = image pixels / scale.
    pub scale: f64,
    /// Image width after downscaling.
    pub width: u32,
    /// Image height after downscaling.
    pub height: u32,
    /// Physical size of the captured monitor.
    pub screen_width: u32,
    pub screen_height: u32,
    /// PNG-encoded image.
    #[serde(skip)]
    pub png_bytes: Vec<u8>,
}

impl CaptureResult {
    /// `data:image/png;base64,...` URL for embedding in a chat request.
    pub fn data_url(&self) -> String {
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.png_bytes);
        format!("data:image/png;base64,{b64}")
    }
}
