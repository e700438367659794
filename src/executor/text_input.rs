// Text entry through the clipboard: stage, paste shortcut, confirm with Enter.
use std::time::Duration;

use crate::config::DelaysConfig;
use crate::errors::PilotResult;
use crate::executor::hotkey::{KeyToken, Platform};
use crate::executor::input::{press_combo, InputDevice, KeyDirection};

/// Paste `text` into the focused control and press Enter.
///
/// Staging through the clipboard keeps non-ASCII text (CJK in particular)
/// intact, which per-key typing does not.
pub async fn paste_and_submit(
    device: &mut dyn InputDevice,
    text: &str,
    platform: Platform,
    delays: &DelaysConfig,
) -> PilotResult<()> {
    device.stage_text(text)?;
    settle(delays.before_paste_ms).await;

    press_combo(device, &platform.paste_combo())?;
    tracing::info!(chars = text.chars().count(), "text pasted");
    settle(delays.after_paste_ms).await;

    device.key(KeyToken::Return, KeyDirection::Tap)?;
    settle(delays.after_enter_ms).await;
    Ok(())
}

pub(crate) async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
