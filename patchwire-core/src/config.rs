//! TOML configuration loading: embedded defaults plus user override.

use std::path::PathBuf;

use serde::Deserialize;

use crate::routing::{BendPreference, RoutingConfig};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    routing: RoutingSection,
    #[serde(default)]
    runtime: RuntimeSection,
    #[serde(default)]
    audio: AudioSection,
}

#[derive(Deserialize, Default)]
struct RoutingSection {
    ticks_per_grid: Option<f64>,
    bend_preference: Option<String>,
    stub_length: Option<i64>,
}

#[derive(Deserialize, Default)]
struct RuntimeSection {
    min_delay_ticks: Option<f64>,
    seed: Option<u64>,
    queue_soft_cap: Option<usize>,
    queue_hard_cap: Option<usize>,
}

#[derive(Deserialize, Default)]
struct AudioSection {
    lookahead_ms: Option<f64>,
    horizon_ms: Option<f64>,
    bpm: Option<f64>,
    max_events: Option<usize>,
    max_voices: Option<usize>,
}

/// Runtime tuning derived from config.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub min_delay_ticks: f64,
    pub seed: u64,
    pub queue_soft_cap: usize,
    /// `None` disables the hard cap.
    pub queue_hard_cap: Option<usize>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            min_delay_ticks: 1e-3,
            seed: 0,
            queue_soft_cap: 4096,
            queue_hard_cap: None,
        }
    }
}

/// Audio bridge tuning derived from config.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub lookahead_sec: f64,
    pub horizon_sec: f64,
    pub bpm: f64,
    pub max_events: usize,
    pub max_voices: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            lookahead_sec: 0.060,
            horizon_sec: 0.100,
            bpm: 120.0,
            max_events: 64,
            max_voices: 16,
        }
    }
}

/// Loaded engine configuration.
pub struct EngineConfig {
    routing: RoutingSection,
    runtime: RuntimeSection,
    audio: AudioSection,
}

impl EngineConfig {
    /// Embedded defaults merged with the user's override file, if present.
    /// A malformed override is ignored with a warning.
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("embedded config.toml must parse");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Self {
            routing: base.routing,
            runtime: base.runtime,
            audio: base.audio,
        }
    }

    /// Defaults only, ignoring any user file. Used by tests.
    pub fn defaults() -> Self {
        let base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("embedded config.toml must parse");
        Self {
            routing: base.routing,
            runtime: base.runtime,
            audio: base.audio,
        }
    }

    pub fn routing(&self) -> RoutingConfig {
        let fallback = RoutingConfig::default();
        RoutingConfig {
            ticks_per_grid: self
                .routing
                .ticks_per_grid
                .unwrap_or(fallback.ticks_per_grid),
            bend_preference: self
                .routing
                .bend_preference
                .as_deref()
                .and_then(parse_bend_preference)
                .unwrap_or(fallback.bend_preference),
            stub_length: self.routing.stub_length.unwrap_or(fallback.stub_length),
        }
    }

    pub fn runtime(&self) -> RuntimeSettings {
        let fallback = RuntimeSettings::default();
        RuntimeSettings {
            min_delay_ticks: self
                .runtime
                .min_delay_ticks
                .filter(|v| *v > 0.0)
                .unwrap_or(fallback.min_delay_ticks),
            seed: self.runtime.seed.unwrap_or(fallback.seed),
            queue_soft_cap: self
                .runtime
                .queue_soft_cap
                .unwrap_or(fallback.queue_soft_cap),
            queue_hard_cap: match self.runtime.queue_hard_cap {
                Some(0) | None => fallback.queue_hard_cap,
                Some(n) => Some(n),
            },
        }
    }

    pub fn audio(&self) -> AudioSettings {
        let fallback = AudioSettings::default();
        AudioSettings {
            lookahead_sec: self
                .audio
                .lookahead_ms
                .map(|ms| ms / 1000.0)
                .unwrap_or(fallback.lookahead_sec),
            horizon_sec: self
                .audio
                .horizon_ms
                .map(|ms| ms / 1000.0)
                .unwrap_or(fallback.horizon_sec),
            bpm: self.audio.bpm.unwrap_or(fallback.bpm),
            max_events: self.audio.max_events.unwrap_or(fallback.max_events),
            max_voices: self.audio.max_voices.unwrap_or(fallback.max_voices),
        }
    }
}

fn parse_bend_preference(s: &str) -> Option<BendPreference> {
    match s {
        "horizontal" => Some(BendPreference::HorizontalFirst),
        "vertical" => Some(BendPreference::VerticalFirst),
        _ => None,
    }
}

fn user_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("patchwire")
            .join("config.toml"),
    )
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.routing.ticks_per_grid.is_some() {
        base.routing.ticks_per_grid = user.routing.ticks_per_grid;
    }
    if user.routing.bend_preference.is_some() {
        base.routing.bend_preference = user.routing.bend_preference;
    }
    if user.routing.stub_length.is_some() {
        base.routing.stub_length = user.routing.stub_length;
    }
    if user.runtime.min_delay_ticks.is_some() {
        base.runtime.min_delay_ticks = user.runtime.min_delay_ticks;
    }
    if user.runtime.seed.is_some() {
        base.runtime.seed = user.runtime.seed;
    }
    if user.runtime.queue_soft_cap.is_some() {
        base.runtime.queue_soft_cap = user.runtime.queue_soft_cap;
    }
    if user.runtime.queue_hard_cap.is_some() {
        base.runtime.queue_hard_cap = user.runtime.queue_hard_cap;
    }
    if user.audio.lookahead_ms.is_some() {
        base.audio.lookahead_ms = user.audio.lookahead_ms;
    }
    if user.audio.horizon_ms.is_some() {
        base.audio.horizon_ms = user.audio.horizon_ms;
    }
    if user.audio.bpm.is_some() {
        base.audio.bpm = user.audio.bpm;
    }
    if user.audio.max_events.is_some() {
        base.audio.max_events = user.audio.max_events;
    }
    if user.audio.max_voices.is_some() {
        base.audio.max_voices = user.audio.max_voices;
    }
}
