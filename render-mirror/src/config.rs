use std::time::Duration;

use serde::{Deserialize, Serialize};

use acmi_telemetry::analyzer::world::DEFAULT_BULLSEYE_ID;
use acmi_telemetry::feed::{DEFAULT_PORT, RealTimeConfig};

use crate::instance::{DEFAULT_ICON_SCALE, DEFAULT_LOCK_LINE_GAIN, IconSet};
use crate::mirror::MirrorOptions;
use crate::packed::DEFAULT_CAPACITY;

/// Mirror and feed configuration, loadable from a TOML file.
///
/// All fields default to their standard values. CLI flags override config file values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    // Mirror
    pub icon_set: IconSet,
    pub icon_scale: f32,
    pub initial_capacity: usize,
    pub show_velocity_vectors: bool,
    pub min_vector_cas: f64,
    pub show_lock_lines: bool,
    pub lock_line_gain: f32,
    pub bullseye_id: String,
    // Live feed
    pub host: String,
    pub port: u16,
    pub client_name: String,
    pub password: String,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub tick_rate: f64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        let feed = RealTimeConfig::default();
        Self {
            icon_set: IconSet::Classic,
            icon_scale: DEFAULT_ICON_SCALE,
            initial_capacity: DEFAULT_CAPACITY,
            show_velocity_vectors: true,
            min_vector_cas: 0.0,
            show_lock_lines: true,
            lock_line_gain: DEFAULT_LOCK_LINE_GAIN,
            bullseye_id: DEFAULT_BULLSEYE_ID.to_string(),
            host: feed.host,
            port: DEFAULT_PORT,
            client_name: feed.client_name,
            password: feed.password,
            retries: feed.retries,
            retry_delay_secs: feed.retry_delay.as_secs(),
            tick_rate: 30.0,
        }
    }
}

impl MirrorConfig {
    /// Load config from a TOML file.
    #[cfg(feature = "bin")]
    pub fn load(path: &std::path::Path) -> Result<Self, rootcause::Report> {
        use rootcause::prelude::*;
        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            icon_set: self.icon_set,
            icon_scale: self.icon_scale,
            initial_capacity: self.initial_capacity,
            show_velocity_vectors: self.show_velocity_vectors,
            min_vector_cas: self.min_vector_cas,
            show_lock_lines: self.show_lock_lines,
            lock_line_gain: self.lock_line_gain,
        }
    }

    pub fn realtime_config(&self) -> RealTimeConfig {
        RealTimeConfig {
            host: self.host.clone(),
            port: self.port,
            client_name: self.client_name.clone(),
            password: self.password.clone(),
            retries: self.retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    /// Time between live-feed ticks. Non-positive rates fall back to 1 Hz.
    pub fn tick_interval(&self) -> Duration {
        if self.tick_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.tick_rate)
        } else {
            Duration::from_secs(1)
        }
    }

    /// Generate a default config file with comments.
    pub fn generate_default_toml() -> String {
        r#"# ACMI mirror configuration
# Pass with: acmi_mirror --config mirror.toml <INPUT>
# CLI flags override these values.

# Icon symbology: "classic" (shape per class) or "ntds" (shape and color per coalition)
icon_set = "classic"

# Icon size multiplier
icon_scale = 10.0

# Slots allocated up front for each packed array (grows by doubling)
initial_capacity = 64

# Draw a velocity vector for moving aircraft
show_velocity_vectors = true

# Aircraft at or below this calibrated airspeed get no velocity vector
min_vector_cas = 0.0

# Draw a line from each aircraft to the objects it has locked
show_lock_lines = true

# Lock lines are drawn this much brighter than their source
lock_line_gain = 1.2

# Object id looked up first for bearing/range readouts
bullseye_id = "7fffffffffffffff"

# Real-time telemetry server
host = "localhost"
port = 42674
client_name = "acmi_mirror"
password = ""

# Connection attempts while the server refuses, and the delay between them
retries = 5
retry_delay_secs = 10

# Live feed ticks per second
tick_rate = 30.0
"#
        .to_string()
    }

    /// Apply CLI flag overrides. Flags use negative form (--no-X disables).
    #[cfg(feature = "bin")]
    pub fn apply_cli_overrides(&mut self, matches: &clap::ArgMatches) {
        if matches.is_present("NO_VELOCITY_VECTORS") {
            self.show_velocity_vectors = false;
        }
        if matches.is_present("NO_LOCK_LINES") {
            self.show_lock_lines = false;
        }
        if let Some(Ok(icon_set)) = matches.value_of("ICON_SET").map(str::parse::<IconSet>) {
            self.icon_set = icon_set;
        }
        if let Some(Ok(scale)) = matches.value_of("ICON_SCALE").map(str::parse::<f32>) {
            self.icon_scale = scale;
        }
        if let Some(host) = matches.value_of("HOST") {
            self.host = host.to_string();
        }
        if let Some(Ok(port)) = matches.value_of("PORT").map(str::parse::<u16>) {
            self.port = port;
        }
        if let Some(password) = matches.value_of("PASSWORD") {
            self.password = password.to_string();
        }
        if let Some(client_name) = matches.value_of("CLIENT_NAME") {
            self.client_name = client_name.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let config = MirrorConfig {
            icon_set: IconSet::Ntds,
            show_lock_lines: false,
            ..MirrorConfig::default()
        };
        let options = config.mirror_options();
        assert_eq!(options.icon_set, IconSet::Ntds);
        assert!(!options.show_lock_lines);
        assert_eq!(options.initial_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn realtime_settings() {
        let config = MirrorConfig {
            retry_delay_secs: 3,
            ..MirrorConfig::default()
        };
        let feed = config.realtime_config();
        assert_eq!(feed.port, DEFAULT_PORT);
        assert_eq!(feed.retry_delay, Duration::from_secs(3));
        assert_eq!(config.tick_interval(), Duration::from_secs_f64(1.0 / 30.0));

        let stalled = MirrorConfig {
            tick_rate: 0.0,
            ..MirrorConfig::default()
        };
        assert_eq!(stalled.tick_interval(), Duration::from_secs(1));
    }

    #[cfg(feature = "bin")]
    #[test]
    fn default_toml_matches_defaults() {
        let parsed: MirrorConfig = toml::from_str(&MirrorConfig::generate_default_toml()).unwrap();
        assert_eq!(parsed, MirrorConfig::default());
    }

    #[cfg(feature = "bin")]
    #[test]
    fn partial_toml_keeps_other_defaults() {
        let parsed: MirrorConfig = toml::from_str("icon_set = \"ntds\"\nport = 1234\n").unwrap();
        assert_eq!(parsed.icon_set, IconSet::Ntds);
        assert_eq!(parsed.port, 1234);
        assert!(parsed.show_velocity_vectors);
    }
}
