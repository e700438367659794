use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};
use crate::executor::hotkey::Platform;

/// Environment variable that overrides `api.api_key`.
pub const API_KEY_ENV: &str = "VISIONPILOT_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub screenshot: ScreenshotConfig,
    #[serde(default)]
    pub mouse: MouseConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub delays: DelaysConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Downscale large captures and save with fast PNG compression.
    #[serde(default = "default_true")]
    pub optimize_for_speed: bool,
    /// Longest edge, in pixels, of the image sent to the decision service.
    #[serde(default = "default_max_png")]
    pub max_png: u32,
    /// Where the current capture is written.
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,
    /// Directory receiving the per-iteration audit overlays.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            optimize_for_speed: true,
            max_png: default_max_png(),
            input_path: default_input_path(),
            output_path: default_output_path(),
        }
    }
}

fn default_max_png() -> u32 {
    1280
}

fn default_input_path() -> PathBuf {
    PathBuf::from("imgs/screen.png")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("imgs/label")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseConfig {
    /// Cursor travel time in seconds for a plain move. Drags take ten times longer.
    #[serde(default = "default_move_duration")]
    pub move_duration: f64,
    /// Refuse to act while the cursor rests in the top-left corner.
    #[serde(default)]
    pub failsafe: bool,
    /// Wheel notches per scroll action.
    #[serde(default = "default_scroll_amount")]
    pub scroll_amount: i32,
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
    /// Neutral position the cursor is parked at after every action.
    #[serde(default)]
    pub park_position: [i32; 2],
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            move_duration: default_move_duration(),
            failsafe: false,
            scroll_amount: default_scroll_amount(),
            long_press_ms: default_long_press_ms(),
            park_position: [0, 0],
        }
    }
}

impl MouseConfig {
    pub fn move_duration(&self) -> Duration {
        Duration::from_secs_f64(self.move_duration.max(0.0))
    }

    pub fn drag_duration(&self) -> Duration {
        self.move_duration() * 10
    }
}

fn default_move_duration() -> f64 {
    0.1
}

fn default_scroll_amount() -> i32 {
    5
}

fn default_long_press_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Iteration cap used when the caller does not choose one.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
    /// Upper bound any caller-supplied cap is clamped to.
    #[serde(default = "default_max_visual_model_iterations")]
    pub max_visual_model_iterations: u32,
    /// Recorded failures in a row before the loop gives up.
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
            max_visual_model_iterations: default_max_visual_model_iterations(),
            max_consecutive_failures: default_max_failures(),
        }
    }
}

impl ExecutionConfig {
    /// Resolve the iteration cap for a run.
    pub fn iteration_cap(&self, requested: Option<u32>) -> u32 {
        let cap = requested.unwrap_or(self.default_max_iterations);
        cap.min(self.max_visual_model_iterations.max(1))
    }
}

fn default_max_iterations() -> u32 {
    15
}

fn default_max_visual_model_iterations() -> u32 {
    80
}

fn default_max_failures() -> u32 {
    5
}

/// Settle delays between input steps, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelaysConfig {
    #[serde(default = "default_after_action_ms")]
    pub after_action_ms: u64,
    #[serde(default = "default_before_paste_ms")]
    pub before_paste_ms: u64,
    #[serde(default = "default_after_paste_ms")]
    pub after_paste_ms: u64,
    #[serde(default = "default_after_enter_ms")]
    pub after_enter_ms: u64,
    #[serde(default = "default_after_park_ms")]
    pub after_park_ms: u64,
    #[serde(default = "default_page_loading_ms")]
    pub page_loading_ms: u64,
}

impl Default for DelaysConfig {
    fn default() -> Self {
        Self {
            after_action_ms: default_after_action_ms(),
            before_paste_ms: default_before_paste_ms(),
            after_paste_ms: default_after_paste_ms(),
            after_enter_ms: default_after_enter_ms(),
            after_park_ms: default_after_park_ms(),
            page_loading_ms: default_page_loading_ms(),
        }
    }
}

impl DelaysConfig {
    /// All delays zeroed. Used by tests and dry runs.
    pub fn none() -> Self {
        Self {
            after_action_ms: 0,
            before_paste_ms: 0,
            after_paste_ms: 0,
            after_enter_ms: 0,
            after_park_ms: 0,
            page_loading_ms: 0,
        }
    }
}

fn default_after_action_ms() -> u64 {
    200
}

fn default_before_paste_ms() -> u64 {
    100
}

fn default_after_paste_ms() -> u64 {
    500
}

fn default_after_enter_ms() -> u64 {
    500
}

fn default_after_park_ms() -> u64 {
    1500
}

fn default_page_loading_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bearer credential. Empty disables the decision call.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Read the reply as an SSE stream.
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model_name: default_model_name(),
            stream: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

fn default_base_url() -> String {
    "https://ark.cn-beijing.volces.com/api/v3".to_string()
}

fn default_model_name() -> String {
    "doubao-seed-1-6-vision-250815".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Forwarded as `thinking.type` ("enabled" / "disabled" / "auto").
    #[serde(default = "default_thinking_type")]
    pub thinking_type: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            thinking_type: default_thinking_type(),
        }
    }
}

fn default_thinking_type() -> String {
    "disabled".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Replaces the embedded system instruction when set.
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
    /// Used instead of `system_prompt_file` on macOS, where shortcuts and
    /// app launching differ.
    #[serde(default)]
    pub mac_system_prompt_file: Option<PathBuf>,
}

impl PromptsConfig {
    /// The instruction file that applies on `platform`, if any.
    pub fn file_for(&self, platform: Platform) -> Option<&Path> {
        match platform {
            Platform::MacOs => self
                .mac_system_prompt_file
                .as_deref()
                .or(self.system_prompt_file.as_deref()),
            Platform::Windows | Platform::Linux => self.system_prompt_file.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Append every decision round to a JSONL transcript.
    #[serde(default = "default_true")]
    pub transcript: bool,
    /// Transcript directory; the platform data dir when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transcript: true,
            dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> PilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(PilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Load `config.toml` from the standard locations.
pub fn load_config() -> PilotResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

/// Load a config file from an explicit path and apply environment overrides.
pub fn load_config_from(path: &Path) -> PilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config);
    tracing::info!(
        path = %path.display(),
        model = %config.api.model_name,
        credential = config.api.has_credential(),
        "config loaded"
    );
    Ok(config)
}

/// Like [`load_config`], but falls back to the defaults when no file exists.
pub fn load_config_or_default(explicit: Option<&Path>) -> PilotResult<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }
    match resolve_config_path() {
        Ok(path) => load_config_from(&path),
        Err(PilotError::Config(msg)) => {
            tracing::warn!(reason = %msg, "using default configuration");
            let mut config = AppConfig::default();
            apply_env_overrides(&mut config);
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

pub fn save_config(config: &AppConfig) -> PilotResult<()> {
    let path = resolve_config_path().or_else(|_| -> PilotResult<PathBuf> {
        Ok(std::env::current_dir()?.join("config.toml"))
    })?;
    save_config_to(config, &path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> PilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            config.api.api_key = key;
        }
    }
    if config.mouse.failsafe && config.mouse.park_position == [0, 0] {
        tracing::warn!(
            "mouse.failsafe is on but the park position is the top-left corner; \
             every action after the first will be refused"
        );
    }
}
