//! Small key-value state kept between runs: who the user is and how the
//! panes were laid out.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILENAME: &str = "state.json";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Percent of the terminal width
    pub left_panel_width: f32,
    pub right_panel_width: f32,
    #[serde(default)]
    pub left_panel_collapsed: bool,
    #[serde(default)]
    pub right_panel_collapsed: bool,
}

impl LayoutConfig {
    pub const MIN_WIDTH: f32 = 15.0;
    pub const MAX_WIDTH: f32 = 50.0;
    pub const DEFAULT_WIDTH: f32 = 25.0;

    fn clamp_width(width: f32) -> f32 {
        if width.is_finite() && width > 0.0 {
            width.clamp(Self::MIN_WIDTH, Self::MAX_WIDTH)
        } else {
            Self::DEFAULT_WIDTH
        }
    }

    /// Widths forced into the allowed range, zero or garbage reset to default
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            left_panel_width: Self::clamp_width(self.left_panel_width),
            right_panel_width: Self::clamp_width(self.right_panel_width),
            ..self
        }
    }

    pub fn resize_left(&mut self, delta: f32) {
        self.left_panel_width = Self::clamp_width(self.left_panel_width + delta);
    }

    pub fn resize_right(&mut self, delta: f32) {
        self.right_panel_width = Self::clamp_width(self.right_panel_width + delta);
    }

    /// Percent left for the middle pane
    pub fn center_width(&self) -> f32 {
        let left = if self.left_panel_collapsed { 0.0 } else { self.left_panel_width };
        let right = if self.right_panel_collapsed { 0.0 } else { self.right_panel_width };
        (100.0 - left - right).max(0.0)
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            left_panel_width: Self::DEFAULT_WIDTH,
            right_panel_width: Self::DEFAULT_WIDTH,
            left_panel_collapsed: false,
            right_panel_collapsed: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    user_id: String,
    #[serde(default)]
    layout: LayoutConfig,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

pub fn generate_user_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("user_{suffix}")
}

impl ClientState {
    pub fn ephemeral() -> Self {
        Self {
            user_id: generate_user_id(),
            layout: LayoutConfig::default(),
            file_path: None,
        }
    }

    pub fn with_file(file_path: &Path) -> Self {
        Self {
            file_path: Some(file_path.to_path_buf()),
            ..Self::ephemeral()
        }
    }

    /// Default location inside the data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(crate::settings::APP_NAME).join(STATE_FILENAME))
    }

    pub fn load_or_ephemeral(file_path: Option<&Path>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                log::error!("Failed to load client state from {}: {}", path.display(), e);
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    /// Read the state file, creating a fresh identity when it does not exist
    pub fn load_from_file(file_path: &Path) -> anyhow::Result<Self> {
        if file_path.exists() {
            let content = fs::read_to_string(file_path)?;
            let mut state: Self = serde_json::from_str(&content)?;
            state.layout = state.layout.sanitized();
            if state.user_id.trim().is_empty() {
                state.user_id = generate_user_id();
            }
            state.file_path = Some(file_path.to_path_buf());
            Ok(state)
        } else {
            let state = Self::with_file(file_path);
            state.save()?;
            Ok(state)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn save_logged(&self) {
        if let Err(e) = self.save() {
            log::error!("Failed to save client state: {}", e);
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn set_user_id(&mut self, user_id: &str) {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return;
        }
        self.user_id = user_id.to_string();
        self.save_logged();
    }

    pub fn layout(&self) -> LayoutConfig {
        self.layout
    }

    pub fn set_layout(&mut self, layout: LayoutConfig) {
        self.layout = layout.sanitized();
        self.save_logged();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_prefix() {
        let id = generate_user_id();
        assert!(id.starts_with("user_"));
        assert_eq!(id.len(), 14);
        assert_ne!(id, generate_user_id());
    }

    #[test]
    fn layout_widths_are_clamped() {
        let layout = LayoutConfig {
            left_panel_width: 80.0,
            right_panel_width: 3.0,
            ..LayoutConfig::default()
        }
        .sanitized();
        assert_eq!(layout.left_panel_width, 50.0);
        assert_eq!(layout.right_panel_width, 15.0);

        let mut layout = LayoutConfig::default();
        layout.resize_left(100.0);
        assert_eq!(layout.left_panel_width, 50.0);
        assert_eq!(layout.center_width(), 25.0);
    }

    #[test]
    fn collapsed_panels_give_width_back() {
        let layout = LayoutConfig {
            left_panel_collapsed: true,
            ..LayoutConfig::default()
        };
        assert_eq!(layout.center_width(), 75.0);
    }

    #[test]
    fn zero_width_means_default() {
        let layout = LayoutConfig {
            left_panel_width: 0.0,
            ..LayoutConfig::default()
        }
        .sanitized();
        assert_eq!(layout.left_panel_width, 25.0);
    }

    #[test]
    fn layout_uses_camel_case_keys() {
        let json = serde_json::to_string(&LayoutConfig::default()).unwrap();
        assert!(json.contains("leftPanelWidth"));
        assert!(json.contains("rightPanelCollapsed"));
    }
}
