//! # patchwire-core
//!
//! Editor-side engine for the patchwire patching environment: the registry
//! of node types, the authoritative graph model with transactional edits,
//! the orthogonal cable router that derives per-edge tick delays, the build
//! step that compiles a snapshot into a runtime-ready graph, and project
//! persistence — independent of any UI framework or DSP host.
//!
//! ## Pipeline
//!
//! ```text
//! registry ──┐
//!            ├──► GraphModel ──► routing ──► build ──► CompiledGraph
//! user ops ──┘        │                        ▲
//!                     └── delays per edge ─────┘
//! ```
//!
//! The `CompiledGraph` is handed to `patchwire-audio`, which owns the event
//! runtime and the audio bridge.

pub mod build;
pub mod config;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod routing;

pub use build::{build, BuildErrorCode, BuildResult, CompiledGraph};
pub use config::EngineConfig;
pub use model::GraphModel;
pub use registry::Registry;
pub use routing::{route_edges, EdgeRoute, RoutingConfig};
