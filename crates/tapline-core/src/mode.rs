//! Operating mode of the capture proxy.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whether matching image-generation calls are forwarded or mocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Traffic goes upstream; successful image responses are extracted to disk.
    #[default]
    Production,

    /// Image-generation POSTs are answered locally from the mock template.
    Mock,
}

impl Mode {
    /// Returns the mode as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Mock => "mock",
        }
    }

    /// Returns the other mode.
    pub fn toggled(&self) -> Self {
        match self {
            Self::Production => Self::Mock,
            Self::Mock => Self::Production,
        }
    }

    /// Returns true if image-generation calls are answered locally.
    pub fn is_mock(&self) -> bool {
        matches!(self, Self::Mock)
    }

    /// Compact encoding used for lock-free storage.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Production => 0,
            Self::Mock => 1,
        }
    }

    /// Inverse of [`Mode::to_u8`]; unknown values decode as production.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Mock,
            _ => Self::Production,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}
