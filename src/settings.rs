//! `config.yaml` under the user config dir, loaded once into a global

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};
use std::time::Duration;

pub const CURRENT_VERSION: u32 = 1;
pub const APP_NAME: &str = "readagent";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid settings in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Missing in files written before versioning
    #[serde(default)]
    pub version: u32,

    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_zoom")]
    pub default_zoom: f32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,

    #[serde(default = "default_poll_interval_ms")]
    pub container_poll_interval_ms: u64,

    #[serde(default = "default_poll_retries")]
    pub container_poll_retries: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_zoom() -> f32 {
    1.5
}

fn default_zoom_step() -> f32 {
    1.2
}

fn default_device_pixel_ratio() -> f32 {
    1.0
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_poll_retries() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            backend_url: default_backend_url(),
            default_zoom: default_zoom(),
            zoom_step: default_zoom_step(),
            device_pixel_ratio: default_device_pixel_ratio(),
            container_poll_interval_ms: default_poll_interval_ms(),
            container_poll_retries: default_poll_retries(),
            log_level: default_log_level(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Settings {
    /// Bring an older file up to date. Returns false when nothing changed.
    fn upgrade(&mut self) -> bool {
        if self.version >= CURRENT_VERSION {
            return false;
        }
        info!("Upgrading settings v{} -> v{CURRENT_VERSION}", self.version);
        // v0 stored the address of the `/api` prefix rather than the server
        if self.version == 0 {
            if let Some(base) = self.backend_url.strip_suffix("/api") {
                self.backend_url = base.to_string();
            }
        }
        self.version = CURRENT_VERSION;
        true
    }

    /// Commented YAML, so a generated file is self-explanatory
    fn to_yaml(&self) -> String {
        let mut out = String::from(FILE_HEADER);
        let _ = writeln!(out, "version: {}", self.version);
        let _ = writeln!(out, "backend_url: \"{}\"", self.backend_url);
        let _ = writeln!(out, "request_timeout_secs: {}", self.request_timeout_secs);
        let _ = writeln!(out, "\n# Page viewer");
        let _ = writeln!(out, "default_zoom: {}", self.default_zoom);
        let _ = writeln!(out, "zoom_step: {}", self.zoom_step);
        let _ = writeln!(out, "device_pixel_ratio: {}", self.device_pixel_ratio);
        let _ = writeln!(
            out,
            "container_poll_interval_ms: {}",
            self.container_poll_interval_ms
        );
        let _ = writeln!(out, "container_poll_retries: {}", self.container_poll_retries);
        let _ = writeln!(out, "\n# off, error, warn, info, debug or trace");
        let _ = writeln!(out, "log_level: {}", self.log_level);
        out
    }
}

const FILE_HEADER: &str = "\
# readagent settings
#
# backend_url points at the reading-assistant server. Summaries and mind maps
# are slow to generate, keep request_timeout_secs generous.

";

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn with_settings<T>(f: impl FnOnce(&Settings) -> T) -> T {
    f(&SETTINGS.read().unwrap_or_else(PoisonError::into_inner))
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

pub fn read_settings_file(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| SettingsError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_settings_file(settings: &Settings, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, settings.to_yaml())
}

/// Load the user's settings file, writing the defaults on first run
pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("No config directory on this system, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
        return;
    }
    info!("Writing default settings to {path:?}");
    if let Err(e) = with_settings(|s| write_settings_file(s, &path)) {
        error!("Failed to write {path:?}: {e}");
    }
}

/// Replace the process-wide settings with the contents of `path`.
/// Unreadable or unparsable files leave the current settings in place.
pub fn load_settings_from_path(path: &Path) {
    let mut settings = match read_settings_file(path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    debug!("Loaded settings from {path:?}");
    if settings.upgrade() {
        if let Err(e) = write_settings_file(&settings, path) {
            error!("Failed to rewrite upgraded settings {path:?}: {e}");
        }
    }
    replace(settings);
}

pub fn current() -> Settings {
    with_settings(Settings::clone)
}

/// Replace the settings in memory without touching the file
pub fn replace(settings: Settings) {
    *SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
}

pub fn get_backend_url() -> String {
    with_settings(|s| s.backend_url.clone())
}

/// Override for this run only, the file keeps its value
pub fn set_backend_url(url: &str) {
    SETTINGS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .backend_url = url.trim_end_matches('/').to_string();
}

pub fn get_request_timeout() -> Duration {
    Duration::from_secs(with_settings(|s| s.request_timeout_secs).max(1))
}

pub fn get_default_zoom() -> f32 {
    with_settings(|s| s.default_zoom)
}

pub fn get_zoom_step() -> f32 {
    with_settings(|s| s.zoom_step)
}

pub fn get_device_pixel_ratio() -> f32 {
    with_settings(|s| s.device_pixel_ratio)
}

pub fn get_container_poll_interval() -> Duration {
    Duration::from_millis(with_settings(|s| s.container_poll_interval_ms))
}

pub fn get_container_poll_retries() -> u32 {
    with_settings(|s| s.container_poll_retries)
}

pub fn get_log_level() -> log::LevelFilter {
    let level = with_settings(|s| s.log_level.clone());
    level.parse().unwrap_or_else(|_| {
        warn!("Unknown log level {level:?}, using info");
        log::LevelFilter::Info
    })
}
