//! Tapline Core - settings and operating mode for the capture proxy.
//!
//! This crate holds the leaf types every other Tapline crate reads:
//!
//! - [`Settings`]: configuration resolved once at startup (and on explicit reload)
//! - [`Mode`]: whether image-generation calls are forwarded or answered locally

pub mod error;
pub mod mode;
pub mod settings;

pub use error::{ConfigError, Result};
pub use mode::Mode;
pub use settings::{
    Settings, DEFAULT_BASE_LOG_DIR, DEFAULT_IMAGE_URL_MARKER, DEFAULT_MOCK_TEMPLATE_PATH,
    DEFAULT_PLACEHOLDER_IMAGE_PATH, DEFAULT_PORT, DEFAULT_TARGET_HOST,
};
