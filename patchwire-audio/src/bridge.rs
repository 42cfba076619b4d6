//! Audio bridge: windowed pull from the runtime under an external clock.
//!
//! Each host clock callback opens a tick window ahead of the audible edge,
//! pulls output events from the runtime, converts them to absolute-seconds
//! wire records, and hands them to the host sink. A tick watermark dedups
//! overlapping windows; late, oversize, and overflowing events drop with
//! warnings and never stall scheduling.

use std::collections::HashMap;

use serde::Serialize;

use patchwire_core::config::AudioSettings;
use patchwire_core::persistence::SampleSlot;
use patchwire_core::registry::Registry;
use patchwire_types::{clamp_step, OutputEvent, Transport};

use crate::engine::EventEngine;
use crate::telemetry::WarningAggregator;

const WARN_MISSING_SAMPLE: &str = "AUDIO_MISSING_SAMPLE";
const WARN_LATE_EVENT: &str = "AUDIO_LATE_EVENT";
const WARN_OVERSIZE_EVENT: &str = "AUDIO_OVERSIZE_EVENT";
const WARN_EVENT_OVERFLOW: &str = "AUDIO_EVENT_OVERFLOW";
const WARN_UNKNOWN_PARAM: &str = "AUDIO_UNKNOWN_PARAM";

/// Host event buffer size; encoded events larger than this drop whole.
const HOST_EVENT_BUFFER: usize = 1024;

/// Minimum slack the lookahead keeps over the callback latency.
const LOOKAHEAD_SLACK_SEC: f64 = 0.010;

/// One host clock callback: the audible interval `[t0, t1)` in seconds and
/// the callback's own latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockWindow {
    pub t0: f64,
    pub t1: f64,
    pub latency: f64,
}

/// A trigger record in the host wire format. Canonical keys only; the
/// bridge is the sole owner of this schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireEvent {
    pub time: f64,
    pub s: String,
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crush: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lpf: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hpf: Option<f64>,
}

/// The external DSP entrypoint.
pub trait HostSink {
    fn evaluate(&mut self, events: &[WireEvent]);
}

/// Per-value mapping tables, keyed by `paramMap.mapping` names.
fn mapping_table(name: &str) -> Option<&'static [f64; 8]> {
    match name {
        "decayTable" => Some(&[1.0, 0.875, 0.75, 0.625, 0.5, 0.375, 0.25, 0.125]),
        "crushTable" => Some(&[16.0, 14.0, 12.0, 10.0, 8.0, 6.0, 4.0, 2.0]),
        "hpfTable" => Some(&[
            100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0, 12000.0,
        ]),
        "lpfTable" => Some(&[
            12000.0, 6400.0, 3200.0, 1600.0, 800.0, 400.0, 200.0, 100.0,
        ]),
        _ => None,
    }
}

struct ParamMapping {
    table: &'static [f64; 8],
    default_value: f64,
}

/// Windowed scheduler from runtime ticks to host seconds.
pub struct AudioBridge {
    transport: Transport,
    settings: AudioSettings,
    /// 8-slot sample table from the project.
    samples: Vec<Option<SampleSlot>>,
    /// Effect key -> value table + registry-default fallback.
    mappings: HashMap<String, ParamMapping>,
    /// Highest tick already considered for emission; events at or below it
    /// never emit again.
    last_scheduled_tick: Option<f64>,
    warnings: WarningAggregator,
}

impl AudioBridge {
    pub fn new(
        transport: Transport,
        settings: AudioSettings,
        samples: Vec<Option<SampleSlot>>,
        registry: &Registry,
    ) -> Self {
        let mut mappings = HashMap::new();
        for def in registry.type_keys().filter_map(|k| registry.get(k)) {
            let Some(pm) = &def.param_map else { continue };
            let Some(table) = mapping_table(pm.mapping) else {
                log::warn!(
                    target: "bridge",
                    "{}: unknown mapping table '{}' for '{}'",
                    WARN_UNKNOWN_PARAM,
                    pm.mapping,
                    pm.target
                );
                continue;
            };
            mappings.insert(
                pm.target.to_string(),
                ParamMapping {
                    table,
                    default_value: table[(clamp_step(def.default_param) - 1) as usize],
                },
            );
        }
        Self {
            transport,
            settings,
            samples,
            mappings,
            last_scheduled_tick: None,
            warnings: WarningAggregator::new(),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Tempo change: applies from the next window; the watermark resets
    /// because the tick-to-seconds mapping moved.
    pub fn set_bpm(&mut self, bpm: f64) {
        if (self.transport.bpm - bpm).abs() > f64::EPSILON {
            self.transport.bpm = bpm;
            self.last_scheduled_tick = None;
        }
    }

    /// Transport (re)start: tick 0 lands at `origin_sec` on the host clock.
    pub fn set_origin(&mut self, origin_sec: f64) {
        self.transport.origin_sec = origin_sec;
        self.last_scheduled_tick = None;
    }

    /// Clock resync after suspend/resume, or a runtime `reset_pulses`.
    pub fn reset_watermark(&mut self) {
        self.last_scheduled_tick = None;
    }

    pub fn set_samples(&mut self, samples: Vec<Option<SampleSlot>>) {
        self.samples = samples;
    }

    /// Drain the current warning window: `(code, count)` pairs.
    pub fn take_warnings(&mut self) -> Vec<(&'static str, u64)> {
        self.warnings.take_summary()
    }

    /// The half-open tick window `[start, end)` a clock callback schedules.
    pub fn tick_window(&self, window: &ClockWindow) -> (f64, f64) {
        let lookahead = self
            .settings
            .lookahead_sec
            .max(window.latency + LOOKAHEAD_SLACK_SEC);
        let start = self.transport.seconds_to_tick(window.t1 + lookahead);
        let end = start + self.settings.horizon_sec / self.transport.seconds_per_tick();
        (start, end)
    }

    /// One host clock callback: pull, map, guard, emit.
    pub fn on_tick(
        &mut self,
        window: &ClockWindow,
        engine: &mut EventEngine,
        registry: &Registry,
        sink: &mut dyn HostSink,
    ) {
        let (t_start, t_end) = self.tick_window(window);
        let events = engine.query_window(registry, t_start, t_end);
        engine.flush_warnings();

        let cap = self.settings.max_events.min(self.settings.max_voices);
        let mut wire: Vec<WireEvent> = Vec::new();
        let mut considered = self.last_scheduled_tick;

        for event in &events {
            if let Some(wm) = self.last_scheduled_tick {
                if event.tick <= wm {
                    continue;
                }
            }
            considered = Some(considered.map_or(event.tick, |c: f64| c.max(event.tick)));

            if wire.len() >= cap {
                self.warnings.record(WARN_EVENT_OVERFLOW);
                continue;
            }
            let Some(record) = self.map_event(event, window) else {
                continue;
            };
            match serde_json::to_vec(&record) {
                Ok(bytes) if bytes.len() <= HOST_EVENT_BUFFER => wire.push(record),
                Ok(_) => self.warnings.record(WARN_OVERSIZE_EVENT),
                Err(_) => self.warnings.record(WARN_OVERSIZE_EVENT),
            }
        }

        self.last_scheduled_tick = considered;
        if !wire.is_empty() {
            sink.evaluate(&wire);
        }
        self.warnings.flush_log("bridge");
    }

    fn map_event(&mut self, event: &OutputEvent, window: &ClockWindow) -> Option<WireEvent> {
        let slot_index = (clamp_step(event.value) - 1) as usize;
        let Some(Some(slot)) = self.samples.get(slot_index) else {
            self.warnings.record(WARN_MISSING_SAMPLE);
            return None;
        };

        let time = self.transport.tick_to_seconds(event.tick);
        if time < window.t1 {
            self.warnings.record(WARN_LATE_EVENT);
            return None;
        }

        // Registry defaults first, then the pulse's params overlay.
        let mut values: HashMap<&str, f64> = self
            .mappings
            .iter()
            .map(|(k, m)| (k.as_str(), m.default_value))
            .collect();
        if let Some(params) = &event.params {
            for (key, v) in params {
                match self.mappings.get(key.as_str()) {
                    Some(m) => {
                        values.insert(key.as_str(), m.table[(clamp_step(*v) - 1) as usize]);
                    }
                    None => self.warnings.record(WARN_UNKNOWN_PARAM),
                }
            }
        }

        Some(WireEvent {
            time,
            s: slot.s.clone(),
            n: slot.n,
            end: values.get("end").copied(),
            crush: values.get("crush").copied(),
            lpf: values.get("lpf").copied(),
            hpf: values.get("hpf").copied(),
        })
    }
}
