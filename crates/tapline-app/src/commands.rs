//! Operator commands.

use std::str::FromStr;

/// A command typed at the interactive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch to mock mode.
    Mock,
    /// Switch to production mode.
    Production,
    /// Flip between mock and production.
    Toggle,
    /// Start a new capture directory.
    Rotate,
    /// Re-read the mock template.
    ReloadTemplate,
    /// Re-read the config file (and the template it points to).
    ReloadConfig,
    /// Print the current state.
    Status,
    /// Print the command list.
    Help,
    /// Stop the proxy and exit.
    Quit,
}

/// Help text listing every command.
pub const HELP: &str = "\
Commands:
  mock         answer image-generation calls with the mock template
  prod         forward all traffic upstream (production)
  toggle       switch between mock and production
  rotate       start a new capture directory
  reload       reload the mock template
  config       reload the config file and mock template
  status       show mode, capture directory and next sequence id
  help         show this list
  quit         stop the proxy and exit";

impl Command {
    /// Returns the canonical command word.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Production => "prod",
            Self::Toggle => "toggle",
            Self::Rotate => "rotate",
            Self::ReloadTemplate => "reload",
            Self::ReloadConfig => "config",
            Self::Status => "status",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.split_whitespace().next().unwrap_or_default();
        match word.to_ascii_lowercase().as_str() {
            "mock" | "m" => Ok(Self::Mock),
            "prod" | "production" | "p" => Ok(Self::Production),
            "toggle" | "t" => Ok(Self::Toggle),
            "rotate" | "r" => Ok(Self::Rotate),
            "reload" => Ok(Self::ReloadTemplate),
            "config" => Ok(Self::ReloadConfig),
            "status" | "s" => Ok(Self::Status),
            "help" | "h" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(other.to_string()),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_words_and_aliases() {
        assert_eq!("mock".parse(), Ok(Command::Mock));
        assert_eq!("PROD".parse(), Ok(Command::Production));
        assert_eq!("production".parse(), Ok(Command::Production));
        assert_eq!("  rotate  ".parse(), Ok(Command::Rotate));
        assert_eq!("reload".parse(), Ok(Command::ReloadTemplate));
        assert_eq!("config".parse(), Ok(Command::ReloadConfig));
        assert_eq!("exit".parse(), Ok(Command::Quit));
        assert_eq!("?".parse(), Ok(Command::Help));
    }

    #[test]
    fn parse_ignores_trailing_words() {
        assert_eq!("status please".parse(), Ok(Command::Status));
    }

    #[test]
    fn parse_unknown_returns_word() {
        assert_eq!("launch".parse::<Command>(), Err("launch".to_string()));
        assert_eq!("".parse::<Command>(), Err(String::new()));
    }

    #[test]
    fn canonical_words_roundtrip() {
        for cmd in [
            Command::Mock,
            Command::Production,
            Command::Toggle,
            Command::Rotate,
            Command::ReloadTemplate,
            Command::ReloadConfig,
            Command::Status,
            Command::Help,
            Command::Quit,
        ] {
            assert_eq!(cmd.as_str().parse(), Ok(cmd));
            assert!(HELP.contains(cmd.as_str()));
        }
    }
}
