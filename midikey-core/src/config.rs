use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use midikey_types::{KeyPressDuration, PlaybackOptions, Quantization};

use crate::playback::EngineSettings;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

const MAX_COUNTDOWN_SECS: u64 = 10;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    defaults: DefaultsConfig,
}

#[derive(Deserialize, Default)]
struct EngineConfig {
    tick_interval_ms: Option<u64>,
    progress_interval_ms: Option<u64>,
    countdown_secs: Option<u64>,
    telemetry_interval_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    tempo_multiplier: Option<f64>,
    quantization: Option<String>,
    velocity_threshold: Option<u8>,
    transpose: Option<i8>,
    ignored_channels: Option<Vec<u8>>,
    key_press: Option<String>,
    fixed_press_ms: Option<f64>,
    velocity_press_min_ms: Option<f64>,
    velocity_press_max_ms: Option<f64>,
}

pub struct Config {
    engine: EngineConfig,
    defaults: DefaultsConfig,
}

impl Config {
    /// Embedded defaults overlaid with `<config_dir>/midikey/config.toml`.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::embedded(),
        }
    }

    /// Embedded defaults overlaid with `path`. A missing file is not an
    /// error; a malformed one is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        if !path.exists() {
            return config;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => {
                    merge_engine(&mut config.engine, user.engine);
                    merge_defaults(&mut config.defaults, user.defaults);
                    log::debug!(target: "config", "loaded {}", path.display());
                }
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Config {
            engine: base.engine,
            defaults: base.defaults,
        }
    }

    /// Engine timing, clamped to the supported ranges.
    pub fn engine_settings(&self) -> EngineSettings {
        let fallback = EngineSettings::default();
        let settings = EngineSettings {
            progress_interval: self
                .engine
                .progress_interval_ms
                .map(|ms| Duration::from_millis(ms.clamp(10, 5_000)))
                .unwrap_or(fallback.progress_interval),
            telemetry_interval: self
                .engine
                .telemetry_interval_secs
                .map(|s| Duration::from_secs(s.clamp(1, 60)))
                .unwrap_or(fallback.telemetry_interval),
            ..fallback.clone()
        };
        let tick = self
            .engine
            .tick_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(fallback.tick_interval);
        settings.with_tick_interval(tick)
    }

    /// Countdown before playback (0..=10 s).
    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.engine.countdown_secs.unwrap_or(0).min(MAX_COUNTDOWN_SECS))
    }

    /// Playback options for profiles that do not carry their own. Values are
    /// pulled into range here; unknown names fall back to the built-in default.
    pub fn default_options(&self) -> PlaybackOptions {
        let fallback = PlaybackOptions::default();
        let d = &self.defaults;
        PlaybackOptions {
            tempo_multiplier: d.tempo_multiplier.unwrap_or(fallback.tempo_multiplier),
            quantization: d
                .quantization
                .as_deref()
                .and_then(|s| parse_named("quantization", s, Quantization::parse))
                .unwrap_or(fallback.quantization),
            velocity_threshold: d.velocity_threshold.unwrap_or(fallback.velocity_threshold),
            ignored_channels: d
                .ignored_channels
                .as_ref()
                .map(|chs| chs.iter().copied().collect())
                .unwrap_or(fallback.ignored_channels),
            transpose: d.transpose.unwrap_or(fallback.transpose),
            key_press_duration: d
                .key_press
                .as_deref()
                .and_then(|s| parse_named("key_press", s, |s| self.parse_key_press(s)))
                .unwrap_or(fallback.key_press_duration),
        }
        .clamped()
    }

    fn parse_key_press(&self, s: &str) -> Option<KeyPressDuration> {
        let d = &self.defaults;
        match s.trim().to_lowercase().as_str() {
            "held" | "hold" => Some(KeyPressDuration::Held),
            "fixed" => Some(KeyPressDuration::Fixed {
                ms: d.fixed_press_ms.unwrap_or(100.0),
            }),
            "velocity" | "velocity_based" => Some(KeyPressDuration::VelocityBased {
                min_ms: d.velocity_press_min_ms.unwrap_or(50.0),
                max_ms: d.velocity_press_max_ms.unwrap_or(200.0),
            }),
            _ => None,
        }
    }
}

/// `<config_dir>/midikey`, home of the user config and the log file.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("midikey"))
}

fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

fn parse_named<T>(field: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(value);
    if parsed.is_none() {
        log::warn!(target: "config", "unknown {} '{}', using default", field, value);
    }
    parsed
}

fn merge_engine(base: &mut EngineConfig, user: EngineConfig) {
    if user.tick_interval_ms.is_some() {
        base.tick_interval_ms = user.tick_interval_ms;
    }
    if user.progress_interval_ms.is_some() {
        base.progress_interval_ms = user.progress_interval_ms;
    }
    if user.countdown_secs.is_some() {
        base.countdown_secs = user.countdown_secs;
    }
    if user.telemetry_interval_secs.is_some() {
        base.telemetry_interval_secs = user.telemetry_interval_secs;
    }
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.tempo_multiplier.is_some() {
        base.tempo_multiplier = user.tempo_multiplier;
    }
    if user.quantization.is_some() {
        base.quantization = user.quantization;
    }
    if user.velocity_threshold.is_some() {
        base.velocity_threshold = user.velocity_threshold;
    }
    if user.transpose.is_some() {
        base.transpose = user.transpose;
    }
    if user.ignored_channels.is_some() {
        base.ignored_channels = user.ignored_channels;
    }
    if user.key_press.is_some() {
        base.key_press = user.key_press;
    }
    if user.fixed_press_ms.is_some() {
        base.fixed_press_ms = user.fixed_press_ms;
    }
    if user.velocity_press_min_ms.is_some() {
        base.velocity_press_min_ms = user.velocity_press_min_ms;
    }
    if user.velocity_press_max_ms.is_some() {
        base.velocity_press_max_ms = user.velocity_press_max_ms;
    }
}
