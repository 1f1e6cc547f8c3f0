use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::{StressError, StressResult};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StressConfig {
    pub timeouts: TimeoutsConfig,
    pub run: RunConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub dial_secs: u64,
    pub reply_secs: u64,
    pub ping_secs: u64,
    pub disconnect_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            dial_secs: 10,
            reply_secs: 30,
            ping_secs: 30,
            disconnect_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunConfig {
    /// Pause between launching two clients, so the accept queue is not
    /// hammered by a single burst.
    pub spawn_delay_ms: u64,
    pub quit_message: String,
    pub inbound_buffer: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            spawn_delay_ms: 3,
            quit_message: "stress test finished".to_owned(),
            inbound_buffer: 256,
        }
    }
}

/// Resolved per-client knobs, shared by every client of a run.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub dial_timeout: Duration,
    pub reply_timeout: Duration,
    pub ping_timeout: Duration,
    pub disconnect_timeout: Duration,
    pub quit_message: String,
    pub inbound_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        StressConfig::default().client_settings()
    }
}

impl StressConfig {
    /// Loads and parses the TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> StressResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| StressError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> StressResult<Self> {
        let config: StressConfig =
            toml::from_str(content).map_err(|e| StressError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> StressResult<()> {
        if self.run.inbound_buffer == 0 {
            return Err(StressError::Config(
                "run.inbound_buffer must be greater than 0".to_owned(),
            ));
        }
        let t = &self.timeouts;
        if [t.dial_secs, t.reply_secs, t.ping_secs, t.disconnect_secs].contains(&0) {
            return Err(StressError::Config(
                "timeouts must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn spawn_delay(&self) -> Duration {
        Duration::from_millis(self.run.spawn_delay_ms)
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            dial_timeout: Duration::from_secs(self.timeouts.dial_secs),
            reply_timeout: Duration::from_secs(self.timeouts.reply_secs),
            ping_timeout: Duration::from_secs(self.timeouts.ping_secs),
            disconnect_timeout: Duration::from_secs(self.timeouts.disconnect_secs),
            quit_message: self.run.quit_message.clone(),
            inbound_buffer: self.run.inbound_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = StressConfig::parse("").unwrap();
        assert_eq!(config.timeouts.dial_secs, 10);
        assert_eq!(config.run.spawn_delay_ms, 3);
        assert_eq!(config.spawn_delay(), Duration::from_millis(3));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = StressConfig::parse(
            r#"
            [timeouts]
            disconnect_secs = 2

            [run]
            quit_message = "bye"
            "#,
        )
        .unwrap();
        let settings = config.client_settings();
        assert_eq!(settings.disconnect_timeout, Duration::from_secs(2));
        assert_eq!(settings.ping_timeout, Duration::from_secs(30));
        assert_eq!(settings.quit_message, "bye");
        assert_eq!(settings.inbound_buffer, 256);
    }

    #[test]
    fn rejects_zero_values() {
        assert!(StressConfig::parse("[timeouts]\nping_secs = 0").is_err());
        assert!(StressConfig::parse("[run]\ninbound_buffer = 0").is_err());
        assert!(StressConfig::parse("[run]\nspawn_delay_ms = \"soon\"").is_err());
    }
}
