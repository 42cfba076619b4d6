//! Edit ops for the graph model and the result type batches come back with.
//!
//! Ops are user intents. A batch is applied all-or-nothing: if any op fails
//! validation the whole batch is rejected and `ApplyResult::errors` names
//! each failing op by index, kind, and a stable `MODEL_*` code.

use serde::{Deserialize, Serialize};

use crate::geometry::GridPoint;
use crate::graph::{EdgeRecord, GroupDefinition, NodeRecord};
use crate::{EdgeId, GroupId, NodeId};

/// A single graph edit.
///
/// Grouping is composed from these primitives by the editor layer
/// (add group definition + add group node + remove internals + rewire);
/// there is deliberately no single "group" op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum GraphOp {
    AddNode(NodeRecord),
    RemoveNode {
        id: NodeId,
    },
    MoveNode {
        id: NodeId,
        pos: GridPoint,
    },
    RotateNode {
        id: NodeId,
        /// Degrees; anything outside {0, 90, 180, 270} is rejected.
        rotation: u16,
    },
    SetParam {
        id: NodeId,
        param: u8,
    },
    RenameNode {
        id: NodeId,
        name: Option<String>,
    },
    AddEdge(EdgeRecord),
    RemoveEdge {
        id: EdgeId,
    },
    AddCorner {
        edge: EdgeId,
        index: usize,
        pos: GridPoint,
    },
    MoveCorner {
        edge: EdgeId,
        index: usize,
        pos: GridPoint,
    },
    RemoveCorner {
        edge: EdgeId,
        index: usize,
    },
    AddGroup {
        id: GroupId,
        def: GroupDefinition,
    },
    RemoveGroup {
        id: GroupId,
    },
}

impl GraphOp {
    /// Stable kind string, used in errors and the op log.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphOp::AddNode(_) => "addNode",
            GraphOp::RemoveNode { .. } => "removeNode",
            GraphOp::MoveNode { .. } => "moveNode",
            GraphOp::RotateNode { .. } => "rotateNode",
            GraphOp::SetParam { .. } => "setParam",
            GraphOp::RenameNode { .. } => "renameNode",
            GraphOp::AddEdge(_) => "addEdge",
            GraphOp::RemoveEdge { .. } => "removeEdge",
            GraphOp::AddCorner { .. } => "addCorner",
            GraphOp::MoveCorner { .. } => "moveCorner",
            GraphOp::RemoveCorner { .. } => "removeCorner",
            GraphOp::AddGroup { .. } => "addGroup",
            GraphOp::RemoveGroup { .. } => "removeGroup",
        }
    }
}

/// Stable validation codes for op application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelErrorCode {
    InvalidPosition,
    UnknownNodeType,
    DuplicateId,
    UnknownEntity,
    PortInvalid,
    EdgeDirectionInvalid,
    EdgeDanglingEndpoint,
    PortAlreadyConnected,
    InvalidRotation,
    InvalidParam,
    CornerIndexInvalid,
    GroupRefInvalid,
}

impl ModelErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelErrorCode::InvalidPosition => "MODEL_INVALID_POSITION",
            ModelErrorCode::UnknownNodeType => "MODEL_UNKNOWN_NODE_TYPE",
            ModelErrorCode::DuplicateId => "MODEL_DUPLICATE_ID",
            ModelErrorCode::UnknownEntity => "MODEL_UNKNOWN_ENTITY",
            ModelErrorCode::PortInvalid => "MODEL_PORT_INVALID",
            ModelErrorCode::EdgeDirectionInvalid => "MODEL_EDGE_DIRECTION_INVALID",
            ModelErrorCode::EdgeDanglingEndpoint => "MODEL_EDGE_DANGLING_ENDPOINT",
            ModelErrorCode::PortAlreadyConnected => "MODEL_PORT_ALREADY_CONNECTED",
            ModelErrorCode::InvalidRotation => "MODEL_INVALID_ROTATION",
            ModelErrorCode::InvalidParam => "MODEL_INVALID_PARAM",
            ModelErrorCode::CornerIndexInvalid => "MODEL_CORNER_INDEX_INVALID",
            ModelErrorCode::GroupRefInvalid => "MODEL_GROUP_REF_INVALID",
        }
    }
}

impl std::fmt::Display for ModelErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed op within a rejected batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpError {
    /// Index of the op within the submitted batch.
    pub index: usize,
    /// `GraphOp::kind()` of the failing op.
    pub op: &'static str,
    /// Entity the op referred to, when one is identifiable.
    pub entity: Option<String>,
    pub code: ModelErrorCode,
    pub message: String,
}

/// Result of applying an op batch. All-or-nothing: `changed` is false
/// whenever `ok` is false.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplyResult {
    pub ok: bool,
    pub changed: bool,
    pub errors: Vec<OpError>,
}

impl ApplyResult {
    pub fn committed(changed: bool) -> Self {
        Self {
            ok: true,
            changed,
            errors: Vec::new(),
        }
    }

    pub fn rejected(errors: Vec<OpError>) -> Self {
        Self {
            ok: false,
            changed: false,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_kind_strings() {
        assert_eq!(GraphOp::RemoveNode { id: NodeId::new("n") }.kind(), "removeNode");
        assert_eq!(
            GraphOp::SetParam { id: NodeId::new("n"), param: 3 }.kind(),
            "setParam"
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ModelErrorCode::PortAlreadyConnected.as_str(), "MODEL_PORT_ALREADY_CONNECTED");
        assert_eq!(ModelErrorCode::InvalidRotation.to_string(), "MODEL_INVALID_ROTATION");
    }

    #[test]
    fn rejected_result_never_reports_change() {
        let r = ApplyResult::rejected(vec![]);
        assert!(!r.ok);
        assert!(!r.changed);
    }
}
