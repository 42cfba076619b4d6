//! Project persistence: canonical JSON with stepwise schema migration.
//!
//! A project file carries the graph snapshot, the 8-slot sample table,
//! settings, and metadata under a `schemaVersion`. Loading migrates older
//! versions one step at a time at the JSON value level before the typed
//! parse; unsupported (newer) versions and parse failures are fatal for the
//! load only — callers keep their last valid graph.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use patchwire_types::GraphSnapshot;

/// Current schema version written by `serialize_project`.
pub const SCHEMA_VERSION: u32 = 1;

/// One sample table slot in host terms: bank name + sample number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSlot {
    pub s: String,
    pub n: u32,
}

/// Persisted playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub tempo: f64,
}

/// Project metadata. Timestamps are RFC 3339 strings owned by the editor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// The canonical project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub schema_version: u32,
    pub graph: GraphSnapshot,
    /// 8-slot sample table; missing slots stay `None`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<Option<SampleSlot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ProjectSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectMeta>,
}

impl ProjectFile {
    pub fn new(graph: GraphSnapshot) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            graph,
            samples: Vec::new(),
            settings: None,
            project: None,
        }
    }
}

/// Stable serialization codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialCode {
    ParseFailed,
    VersionUnsupported,
    VersionMigrated,
}

impl SerialCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialCode::ParseFailed => "SERIAL_PARSE_FAILED",
            SerialCode::VersionUnsupported => "SERIAL_VERSION_UNSUPPORTED",
            SerialCode::VersionMigrated => "SERIAL_VERSION_MIGRATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialDiagnostic {
    pub code: SerialCode,
    pub message: String,
}

/// Load output: a project or the reasons there is none. Warnings survive a
/// successful load (e.g. migrations applied).
#[derive(Debug, Default)]
pub struct LoadResult {
    pub ok: bool,
    pub project: Option<ProjectFile>,
    pub errors: Vec<SerialDiagnostic>,
    pub warnings: Vec<SerialDiagnostic>,
}

/// Serialize with the current schema version stamped in.
pub fn serialize_project(project: &ProjectFile) -> Result<String, String> {
    let mut copy = project.clone();
    copy.schema_version = SCHEMA_VERSION;
    serde_json::to_string_pretty(&copy).map_err(|e| e.to_string())
}

/// Parse project JSON, migrating older schema versions stepwise.
pub fn parse_project(json: &str) -> LoadResult {
    let mut result = LoadResult::default();

    let mut value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            result.errors.push(SerialDiagnostic {
                code: SerialCode::ParseFailed,
                message: format!("invalid JSON: {}", e),
            });
            log::warn!(target: "serial", "SERIAL_PARSE_FAILED: {}", e);
            return result;
        }
    };

    // Missing version is treated as 0 and migrated forward.
    let mut version = value
        .get("schemaVersion")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;

    if version > SCHEMA_VERSION {
        result.errors.push(SerialDiagnostic {
            code: SerialCode::VersionUnsupported,
            message: format!(
                "project schema {} is newer than supported {}",
                version, SCHEMA_VERSION
            ),
        });
        log::warn!(
            target: "serial",
            "SERIAL_VERSION_UNSUPPORTED: {} > {}",
            version,
            SCHEMA_VERSION
        );
        return result;
    }

    while version < SCHEMA_VERSION {
        migrate_step(&mut value, version);
        version += 1;
        result.warnings.push(SerialDiagnostic {
            code: SerialCode::VersionMigrated,
            message: format!("migrated project schema to v{}", version),
        });
    }
    if let Some(obj) = value.as_object_mut() {
        obj.insert("schemaVersion".to_string(), Value::from(SCHEMA_VERSION));
    }

    match serde_json::from_value::<ProjectFile>(value) {
        Ok(project) => {
            result.ok = true;
            result.project = Some(project);
        }
        Err(e) => {
            result.errors.push(SerialDiagnostic {
                code: SerialCode::ParseFailed,
                message: format!("schema mismatch: {}", e),
            });
            log::warn!(target: "serial", "SERIAL_PARSE_FAILED: {}", e);
        }
    }
    result
}

/// One migration step `from -> from + 1`, at the JSON value level.
fn migrate_step(value: &mut Value, from: u32) {
    match from {
        // v0 -> v1: top-level `groups` moved under `graph.groups`.
        0 => {
            let Some(obj) = value.as_object_mut() else {
                return;
            };
            if let Some(groups) = obj.remove("groups") {
                let graph = obj
                    .entry("graph")
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Some(graph_obj) = graph.as_object_mut() {
                    graph_obj.entry("groups").or_insert(groups);
                }
            }
        }
        _ => {}
    }
}

/// Save a project file to disk.
pub fn save_project(path: &Path, project: &ProjectFile) -> Result<(), String> {
    let json = serialize_project(project)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::write(path, json).map_err(|e| e.to_string())
}

/// Load a project file from disk.
pub fn load_project(path: &Path) -> LoadResult {
    match fs::read_to_string(path) {
        Ok(json) => parse_project(&json),
        Err(e) => {
            let mut result = LoadResult::default();
            result.errors.push(SerialDiagnostic {
                code: SerialCode::ParseFailed,
                message: format!("could not read {}: {}", path.display(), e),
            });
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwire_types::{GridPoint, NodeId, NodeRecord, Rotation};

    fn sample_project() -> ProjectFile {
        let graph = GraphSnapshot {
            nodes: vec![NodeRecord {
                id: NodeId::new("p"),
                node_type: "pulse".into(),
                pos: GridPoint::new(1, 2),
                rotation: Rotation::R90,
                param: Some(4),
                name: Some("tick".into()),
                group_ref: None,
            }],
            edges: vec![],
            groups: Default::default(),
        };
        let mut project = ProjectFile::new(graph);
        project.samples = vec![
            Some(SampleSlot {
                s: "bd".into(),
                n: 0,
            }),
            None,
        ];
        project.settings = Some(ProjectSettings { tempo: 132.0 });
        project
    }

    #[test]
    fn roundtrip_preserves_everything() {
        let project = sample_project();
        let json = serialize_project(&project).unwrap();
        let loaded = parse_project(&json);
        assert!(loaded.ok);
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.project.unwrap(), project);
    }

    #[test]
    fn missing_version_is_migrated_from_zero() {
        let json = r#"{
            "graph": { "nodes": [], "edges": [] },
            "groups": { "g1": { "nodes": [], "edges": [], "inputs": [], "outputs": [], "controls": [] } }
        }"#;
        let loaded = parse_project(json);
        assert!(loaded.ok, "{:?}", loaded.errors);
        assert!(loaded
            .warnings
            .iter()
            .any(|w| w.code == SerialCode::VersionMigrated));
        let project = loaded.project.unwrap();
        assert_eq!(project.schema_version, SCHEMA_VERSION);
        // v0 top-level groups moved under the graph
        assert!(project.graph.groups.contains_key(&patchwire_types::GroupId::new("g1")));
    }

    #[test]
    fn newer_version_is_refused() {
        let json = format!(
            r#"{{ "schemaVersion": {}, "graph": {{ "nodes": [], "edges": [] }} }}"#,
            SCHEMA_VERSION + 1
        );
        let loaded = parse_project(&json);
        assert!(!loaded.ok);
        assert_eq!(loaded.errors[0].code, SerialCode::VersionUnsupported);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let loaded = parse_project("{ not json");
        assert!(!loaded.ok);
        assert_eq!(loaded.errors[0].code, SerialCode::ParseFailed);
    }

    #[test]
    fn bad_rotation_fails_the_typed_parse() {
        let json = r#"{
            "schemaVersion": 1,
            "graph": { "nodes": [{ "id": "n", "type": "pulse", "pos": { "x": 0, "y": 0 }, "rotation": 45 }], "edges": [] }
        }"#;
        let loaded = parse_project(json);
        assert!(!loaded.ok);
        assert_eq!(loaded.errors[0].code, SerialCode::ParseFailed);
    }

    #[test]
    fn file_roundtrip() {
        let dir = std::env::temp_dir().join("patchwire-persistence-test");
        let path = dir.join("project.json");
        let project = sample_project();
        save_project(&path, &project).unwrap();
        let loaded = load_project(&path);
        assert!(loaded.ok);
        assert_eq!(loaded.project.unwrap(), project);
        let _ = std::fs::remove_dir_all(dir);
    }
}
