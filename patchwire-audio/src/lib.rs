//! # patchwire-audio
//!
//! The live half of the patchwire engine: a tick-accurate event runtime
//! over compiled graphs, and the audio bridge that schedules its output
//! onto an external host clock in absolute seconds.
//!
//! ```text
//! CompiledGraph ──► EventEngine ──► AudioBridge ──► HostSink (external DSP)
//!                        ▲               ▲
//!             GraphPatch │               │ ClockWindow (audio thread,
//!                        │               │ marshalled via clock_channel)
//! ```
//!
//! Everything here runs on one logical thread; the only cross-thread piece
//! is the clock channel, which hands windows from the audio callback to
//! the engine thread lock-free. When embedded in a web host whose DSP
//! needs SharedArrayBuffer, the page must serve COOP `same-origin` and
//! COEP `require-corp`; that is a host concern, not the bridge's.

pub mod bridge;
pub mod clock;
pub mod engine;
pub mod scheduler;
pub mod telemetry;

pub use bridge::{AudioBridge, ClockWindow, HostSink, WireEvent};
pub use clock::{clock_channel, ClockReceiver, ClockSender};
pub use engine::EventEngine;
pub use scheduler::TickScheduler;
pub use telemetry::WarningAggregator;
