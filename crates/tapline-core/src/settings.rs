//! Proxy settings.
//!
//! Settings are loaded once from a JSON file at startup. Every field has a
//! default, so a partial file (or no file at all) still yields a usable
//! configuration:
//!
//! ```json
//! {
//!   "target_host": "generativelanguage.googleapis.com",
//!   "image_url_marker": "gemini-2.5-flash-image",
//!   "port": 8080,
//!   "base_log_dir": "logs",
//!   "placeholder_image_path": "placeholder.png",
//!   "mock_template_path": "mock_template.json"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default host substring that puts a request in scope.
pub const DEFAULT_TARGET_HOST: &str = "generativelanguage.googleapis.com";

/// Default URL substring identifying image-generation calls.
pub const DEFAULT_IMAGE_URL_MARKER: &str = "gemini-2.5-flash-image";

/// Default proxy listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default root under which capture directories are created.
pub const DEFAULT_BASE_LOG_DIR: &str = "logs";

/// Default path of the image used to fill mock responses.
pub const DEFAULT_PLACEHOLDER_IMAGE_PATH: &str = "placeholder.png";

/// Default path of the mock response template.
pub const DEFAULT_MOCK_TEMPLATE_PATH: &str = "mock_template.json";

/// Capture proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Requests whose URL contains this substring are captured.
    pub target_host: String,
    /// In-scope URLs containing this substring are image-generation calls.
    pub image_url_marker: String,
    /// Port the proxy listens on.
    pub port: u16,
    /// Root directory for capture directories.
    pub base_log_dir: PathBuf,
    /// Image embedded into mock responses.
    pub placeholder_image_path: PathBuf,
    /// JSON template for mock responses.
    pub mock_template_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_host: DEFAULT_TARGET_HOST.to_string(),
            image_url_marker: DEFAULT_IMAGE_URL_MARKER.to_string(),
            port: DEFAULT_PORT,
            base_log_dir: PathBuf::from(DEFAULT_BASE_LOG_DIR),
            placeholder_image_path: PathBuf::from(DEFAULT_PLACEHOLDER_IMAGE_PATH),
            mock_template_path: PathBuf::from(DEFAULT_MOCK_TEMPLATE_PATH),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file.
    ///
    /// Missing fields take their defaults. The result is validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings, falling back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::load(path) {
            Ok(settings) => {
                tracing::info!("Loaded config from {:?}", path);
                settings
            }
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Checks that the settings can drive the proxy.
    pub fn validate(&self) -> Result<()> {
        if self.target_host.trim().is_empty() {
            return Err(ConfigError::Invalid("target_host must not be empty".into()));
        }
        if self.image_url_marker.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "image_url_marker must not be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        Ok(())
    }

    /// Sets the listen port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the capture root directory.
    pub fn with_base_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_log_dir = dir.into();
        self
    }

    /// Sets the target host substring.
    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = host.into();
        self
    }

    /// Sets the image-generation URL marker.
    pub fn with_image_url_marker(mut self, marker: impl Into<String>) -> Self {
        self.image_url_marker = marker.into();
        self
    }

    /// Sets the placeholder image path.
    pub fn with_placeholder_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.placeholder_image_path = path.into();
        self
    }

    /// Sets the mock template path.
    pub fn with_mock_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mock_template_path = path.into();
        self
    }

    /// Returns true if the URL is in capture scope.
    pub fn is_in_scope(&self, url: &str) -> bool {
        url.contains(&self.target_host)
    }

    /// Returns true if the URL is an image-generation call.
    pub fn is_image_generation(&self, url: &str) -> bool {
        url.contains(&self.image_url_marker)
    }
}
