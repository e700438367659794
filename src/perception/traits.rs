use crate::errors::PilotResult;
use crate::perception::types::CaptureResult;

/// Capability: "capture display → image + metadata".
///
/// Implementations must downscale so the longest edge stays within the
/// configured maximum, report the scale used, and persist the image.
/// Errors are expected to be [`crate::errors::PilotError::Capture`] so the
/// loop treats them as transient.
pub trait ScreenCapture {
    fn capture(&mut self) -> PilotResult<CaptureResult>;
}
