//! Interactive operator console.
//!
//! Reads one command per line and applies it to the running pipeline. The
//! loop ends on `quit` or end of input.

use std::path::{Path, PathBuf};

use tapline_core::{Mode, Settings};
use tapline_proxy::Pipeline;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::commands::{Command, HELP};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Listen port.
    pub port: Option<u16>,
    /// Capture root directory.
    pub base_log_dir: Option<PathBuf>,
}

impl Overrides {
    /// Applies the overrides to loaded settings.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(port) = self.port {
            settings = settings.with_port(port);
        }
        if let Some(dir) = &self.base_log_dir {
            settings = settings.with_base_log_dir(dir);
        }
        settings
    }
}

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Text shown to the operator.
    pub message: String,
    /// True if the console should exit.
    pub quit: bool,
}

impl Outcome {
    fn say(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            quit: false,
        }
    }
}

/// Operator console bound to a pipeline.
#[derive(Debug, Clone)]
pub struct Console {
    pipeline: Pipeline,
    config_path: PathBuf,
    overrides: Overrides,
}

impl Console {
    /// Creates a console. `config_path` is re-read by the `config` command.
    pub fn new(pipeline: Pipeline, config_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            pipeline,
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Runs a single command.
    pub fn execute(&self, command: Command) -> Outcome {
        match command {
            Command::Mock => self.switch_mode(Mode::Mock),
            Command::Production => self.switch_mode(Mode::Production),
            Command::Toggle => self.switch_mode(self.pipeline.mode().toggled()),
            Command::Rotate => {
                let dir = self.pipeline.rotate();
                if dir.is_fallback {
                    Outcome::say(format!(
                        "Could not create a new capture directory; capturing into {}",
                        dir.path.display()
                    ))
                } else {
                    Outcome::say(format!("Capturing into {}", dir.path.display()))
                }
            }
            Command::ReloadTemplate => {
                if self.pipeline.reload_template() {
                    Outcome::say("Mock template reloaded")
                } else {
                    Outcome::say("Mock template unavailable; serving built-in mock response")
                }
            }
            Command::ReloadConfig => self.reload_config(),
            Command::Status => Outcome::say(self.pipeline.status().to_string()),
            Command::Help => Outcome::say(HELP),
            Command::Quit => Outcome {
                message: "Shutting down".to_string(),
                quit: true,
            },
        }
    }

    fn switch_mode(&self, mode: Mode) -> Outcome {
        let previous = self.pipeline.set_mode(mode);
        if previous == mode {
            Outcome::say(format!("Already in {} mode", mode))
        } else {
            Outcome::say(format!("Mode: {} -> {}", previous, mode))
        }
    }

    fn reload_config(&self) -> Outcome {
        // A broken file at runtime keeps the running settings.
        match Settings::load(&self.config_path) {
            Ok(settings) => {
                let settings = self.overrides.apply(settings);
                let template_loaded = self.pipeline.reload_settings(settings);
                let mut message = format!("Reloaded {}", self.config_path.display());
                if !template_loaded {
                    message.push_str(" (mock template unavailable)");
                }
                Outcome::say(message)
            }
            Err(e) => {
                tracing::warn!("Config reload failed: {}", e);
                Outcome::say(format!("Config not reloaded: {}", e))
            }
        }
    }

    /// Handles one input line. Blank lines produce no output.
    pub fn handle_line(&self, line: &str) -> Option<Outcome> {
        if line.trim().is_empty() {
            return None;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                tracing::debug!("Console command: {}", command);
                Some(self.execute(command))
            }
            Err(word) => Some(Outcome::say(format!("Unknown command: {}\n{}", word, HELP))),
        }
    }

    /// Reads commands until `quit` or end of input.
    pub async fn run<R, W>(&self, reader: R, mut out: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(outcome) = self.handle_line(&line) else {
                continue;
            };
            out.write_all(outcome.message.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
            if outcome.quit {
                return Ok(());
            }
        }
        tracing::info!("Console input closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    fn test_settings(temp: &TempDir) -> Settings {
        Settings::default()
            .with_base_log_dir(temp.path().join("logs"))
            .with_mock_template_path(temp.path().join("mock_template.json"))
            .with_placeholder_image_path(temp.path().join("placeholder.png"))
    }

    fn test_console(temp: &TempDir) -> Console {
        let pipeline = Pipeline::from_settings(test_settings(temp));
        Console::new(pipeline, temp.path().join("config.json"), Overrides::default())
    }

    #[test]
    fn overrides_apply_only_when_set() {
        let settings = Settings::default();
        assert_eq!(Overrides::default().apply(settings.clone()), settings);

        let overrides = Overrides {
            port: Some(9999),
            base_log_dir: Some(PathBuf::from("/tmp/caps")),
        };
        let applied = overrides.apply(settings);
        assert_eq!(applied.port, 9999);
        assert_eq!(applied.base_log_dir, PathBuf::from("/tmp/caps"));
    }

    #[test]
    fn mode_commands_are_idempotent() {
        let temp = TempDir::new().unwrap();
        let console = test_console(&temp);

        assert_eq!(
            console.execute(Command::Mock).message,
            "Mode: production -> mock"
        );
        assert_eq!(console.execute(Command::Mock).message, "Already in mock mode");
        assert_eq!(
            console.execute(Command::Toggle).message,
            "Mode: mock -> production"
        );
        assert_eq!(console.pipeline.mode(), Mode::Production);
    }

    #[test]
    fn rotate_reports_new_directory() {
        let temp = TempDir::new().unwrap();
        let console = test_console(&temp);

        let outcome = console.execute(Command::Rotate);
        let dir = console.pipeline.status().active.unwrap();
        assert!(outcome.message.contains(&dir.path.display().to_string()));
    }

    #[test]
    fn reload_config_keeps_settings_on_error() {
        let temp = TempDir::new().unwrap();
        let console = test_console(&temp);
        fs::write(temp.path().join("config.json"), "{broken").unwrap();

        let outcome = console.execute(Command::ReloadConfig);
        assert!(outcome.message.starts_with("Config not reloaded"));
        assert_eq!(*console.pipeline.settings(), test_settings(&temp));
    }

    #[test]
    fn reload_config_applies_file_and_overrides() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::from_settings(test_settings(&temp));
        let overrides = Overrides {
            port: Some(7000),
            base_log_dir: None,
        };
        let console = Console::new(pipeline, temp.path().join("config.json"), overrides);

        let template = temp.path().join("t2.json");
        fs::write(
            temp.path().join("config.json"),
            format!(
                r#"{{"target_host":"api.other.com","port":1234,"mock_template_path":{:?}}}"#,
                template.to_string_lossy()
            ),
        )
        .unwrap();

        let outcome = console.execute(Command::ReloadConfig);
        assert!(outcome.message.starts_with("Reloaded"), "{}", outcome.message);

        let settings = console.pipeline.settings();
        assert_eq!(settings.target_host, "api.other.com");
        assert_eq!(settings.port, 7000);
        assert!(template.exists());
    }

    #[test]
    fn unknown_and_blank_lines() {
        let temp = TempDir::new().unwrap();
        let console = test_console(&temp);

        assert!(console.handle_line("   ").is_none());
        let outcome = console.handle_line("launch").unwrap();
        assert!(outcome.message.starts_with("Unknown command: launch"));
        assert!(!outcome.quit);
    }

    #[tokio::test]
    async fn run_stops_at_quit() {
        let temp = TempDir::new().unwrap();
        let console = test_console(&temp);

        let input: &[u8] = b"mock\n\nstatus\nquit\nprod\n";
        let mut output = Vec::new();
        console.run(BufReader::new(input), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Mode: production -> mock"));
        assert!(text.contains("mode:            mock"));
        assert!(text.ends_with("Shutting down\n"));
        // Commands after quit are not executed.
        assert_eq!(console.pipeline.mode(), Mode::Mock);
    }

    #[tokio::test]
    async fn run_ends_at_eof() {
        let temp = TempDir::new().unwrap();
        let console = test_console(&temp);

        let reader = tokio_test::io::Builder::new()
            .read(b"rotate\n")
            .read(b"toggle\n")
            .build();
        let mut output = Vec::new();
        console.run(BufReader::new(reader), &mut output).await.unwrap();

        assert_eq!(console.pipeline.mode(), Mode::Mock);
        assert!(console.pipeline.status().active.is_some());
    }
}
