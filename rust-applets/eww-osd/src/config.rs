use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl From<String> for Anchor {
    /// Unknown names land in the bottom-right corner.
    fn from(name: String) -> Self {
        match name.as_str() {
            "top_left" => Anchor::TopLeft,
            "top_right" => Anchor::TopRight,
            "bottom_left" => Anchor::BottomLeft,
            _ => Anchor::BottomRight,
        }
    }
}

/// Settings resolved once at startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    pub width: i32,
    pub height: i32,
    pub timeout_ms: u64,
    pub anchor: Anchor,
    pub margin_x: i32,
    pub margin_y: i32,
    pub background_color: String,
    pub accent_color: String,
    pub text_color: String,
    pub font_family: String,
    pub show_player: bool,
    pub step_percent: u32,
    pub listen_pactl: bool,
    pub listen_media: bool,
    pub max_volume: u32,
    pub command_timeout_ms: u64,
    pub screen_width: i32,
    pub screen_height: i32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            width: 430,
            height: 150,
            timeout_ms: 1800,
            anchor: Anchor::TopLeft,
            margin_x: 24,
            margin_y: 24,
            background_color: "#DD1C1C1C".to_string(),
            accent_color: "#00A4EF".to_string(),
            text_color: "#F2F2F2".to_string(),
            font_family: "Noto Sans".to_string(),
            show_player: true,
            step_percent: 5,
            listen_pactl: true,
            listen_media: true,
            max_volume: 150,
            command_timeout_ms: 1000,
            screen_width: 1920,
            screen_height: 1080,
        }
    }
}

impl OverlayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("eww-osd").join("config.json"))
}

/// Missing file means defaults; keys present in the file override them.
pub fn load(path: &Path) -> anyhow::Result<OverlayConfig> {
    if !path.exists() {
        return Ok(OverlayConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}
