//! # patchwire-types
//!
//! Shared type definitions for the patchwire engine ecosystem.
//! This crate contains the data model used across patchwire-core and
//! patchwire-audio: ids, grid geometry, graph records, edit ops, and the
//! event types that flow through the runtime.

pub mod event;
pub mod geometry;
pub mod graph;
pub mod ops;
pub mod transport;

pub use event::{OutputEvent, Pulse, PulseParams, RuntimeEvent, ThumbState};
pub use geometry::{GridPoint, PortDirection, Rotation, Side};
pub use graph::{
    EdgeRecord, EdgeRole, GraphSnapshot, GroupDefinition, NodeRecord, PortKey, PortRef,
};
pub use ops::{ApplyResult, GraphOp, ModelErrorCode, OpError};
pub use transport::{Transport, TICKS_PER_BEAT};

use serde::{Deserialize, Serialize};

/// Inclusive lower bound for params, pulse values, and speeds.
pub const STEP_MIN: u8 = 1;
/// Inclusive upper bound for params, pulse values, and speeds.
pub const STEP_MAX: u8 = 8;

/// Clamp a param/value/speed into the 1..=8 step range.
pub fn clamp_step(v: u8) -> u8 {
    v.clamp(STEP_MIN, STEP_MAX)
}

/// Stable identifier for a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for an edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for a group definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
