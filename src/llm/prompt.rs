use std::path::Path;

use crate::config::PromptsConfig;
use crate::errors::{PilotError, PilotResult};
use crate::executor::hotkey::Platform;

/// Instruction compiled into the binary; used when no file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../../prompts/system_prompt.md");

/// Load the system instruction once, at loop start.
pub fn load_system_prompt(config: &PromptsConfig) -> PilotResult<String> {
    load_system_prompt_for(config, Platform::current())
}

pub fn load_system_prompt_for(config: &PromptsConfig, platform: Platform) -> PilotResult<String> {
    match config.file_for(platform) {
        Some(path) => read_prompt_file(path),
        None => Ok(DEFAULT_SYSTEM_PROMPT.trim().to_string()),
    }
}

fn read_prompt_file(path: &Path) -> PilotResult<String> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PilotError::Config(format!("system prompt {}: {e}", path.display()))
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Err(PilotError::Config(format!(
            "system prompt {} is empty",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), chars = text.len(), "system prompt loaded");
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_prompt_describes_wire_fields() {
        let prompt = load_system_prompt(&PromptsConfig::default()).unwrap();
        for field in ["current_status", "whether_completed", "type_information"] {
            assert!(prompt.contains(field), "missing {field}");
        }
    }

    #[test]
    fn file_overrides_and_empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");

        std::fs::write(&path, "  custom instruction\n").unwrap();
        let cfg = PromptsConfig {
            system_prompt_file: Some(path.clone()),
            ..PromptsConfig::default()
        };
        assert_eq!(load_system_prompt(&cfg).unwrap(), "custom instruction");

        std::fs::write(&path, "\n").unwrap();
        assert!(load_system_prompt(&cfg).is_err());
    }

    #[test]
    fn mac_file_applies_only_on_macos() {
        let dir = tempfile::tempdir().unwrap();
        let general = dir.path().join("general.txt");
        let mac = dir.path().join("mac.txt");
        std::fs::write(&general, "general instruction").unwrap();
        std::fs::write(&mac, "mac instruction").unwrap();

        let cfg = PromptsConfig {
            system_prompt_file: Some(general),
            mac_system_prompt_file: Some(mac),
        };
        assert_eq!(
            load_system_prompt_for(&cfg, Platform::MacOs).unwrap(),
            "mac instruction"
        );
        assert_eq!(
            load_system_prompt_for(&cfg, Platform::Windows).unwrap(),
            "general instruction"
        );

        let mac_only = PromptsConfig {
            system_prompt_file: None,
            mac_system_prompt_file: cfg.mac_system_prompt_file.clone(),
        };
        assert_eq!(
            load_system_prompt_for(&mac_only, Platform::Linux).unwrap(),
            DEFAULT_SYSTEM_PROMPT.trim()
        );
    }
}
