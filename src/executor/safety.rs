// Failsafe interceptor: the user parks the cursor in the top-left corner to stop the agent.
use crate::errors::{PilotError, PilotResult};
use crate::executor::input::InputDevice;

/// Cursor positions within this many pixels of the origin count as the corner.
const CORNER_TOLERANCE: f64 = 1.0;

/// Refuse to act while the cursor rests in the top-left screen corner.
pub fn check_failsafe(device: &dyn InputDevice, enabled: bool) -> PilotResult<()> {
    if !enabled {
        return Ok(());
    }
    let (x, y) = device.cursor_position()?;
    if x <= CORNER_TOLERANCE && y <= CORNER_TOLERANCE {
        tracing::warn!(x, y, "failsafe triggered");
        return Err(PilotError::SafetyViolation(format!(
            "failsafe triggered: cursor at ({x}, {y})"
        )));
    }
    Ok(())
}
