//! Static catalog of node types.
//!
//! The registry is constructed once at startup, validated, and passed by
//! reference everywhere downstream; nothing mutates it afterwards. Each
//! entry ties a kebab-case type key to UI metadata, a port layout, param
//! defaults, and the behavior functions the runtime dispatches to.

mod archetype;
mod behavior;

pub use archetype::{
    archetype_layout, custom_layout, Archetype, NodeLayout, PortRole, PortSpec,
};
pub use behavior::{
    control_set_param, node_id_hash, BehaviorCtx, ControlOutcome, InitStateFn, NodeRng,
    NodeState, OnControlFn, OnSignalFn, OutputPulse, SignalOutcome,
};

use std::collections::HashMap;

use patchwire_types::{GroupDefinition, STEP_MAX, STEP_MIN};

/// The registry type key of terminal trigger collectors. The runtime
/// captures pulses arriving here instead of dispatching a behavior.
pub const OUTPUT_TYPE: &str = "output";

/// The registry type key of the periodic source the runtime re-seeds on
/// `reset_pulses`.
pub const PULSE_TYPE: &str = "pulse";

/// The registry type key group-instance nodes carry. Their layout comes
/// from the group definition, not the archetype table.
pub const GROUP_TYPE: &str = "group";

/// Links a node's param to a host effect key through a named mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMap {
    /// Wire-format key the mapped value lands on (`end`, `crush`, ...).
    pub target: &'static str,
    /// Name of the bridge-side value table (`decayTable`, ...).
    pub mapping: &'static str,
}

/// One catalog entry.
#[derive(Debug)]
pub struct NodeTypeDef {
    /// Unique kebab-case key.
    pub type_key: &'static str,
    /// Display label for palettes and diagnostics.
    pub label: &'static str,
    pub layout: Archetype,
    pub inputs: usize,
    pub outputs: usize,
    pub control_ports: usize,
    pub default_param: u8,
    pub param_map: Option<ParamMap>,
    pub init_state: Option<InitStateFn>,
    pub on_control: Option<OnControlFn>,
    pub on_signal: Option<OnSignalFn>,
}

impl NodeTypeDef {
    /// Derive this type's port layout. Custom layouts need the group
    /// definition the instance references.
    pub fn node_layout(&self, group: Option<&GroupDefinition>) -> Result<NodeLayout, String> {
        match self.layout {
            Archetype::Custom => match group {
                Some(def) => Ok(custom_layout(def)),
                None => Err(format!(
                    "type '{}' has a custom layout but no group definition was supplied",
                    self.type_key
                )),
            },
            fixed => archetype_layout(fixed)
                .ok_or_else(|| format!("no fixed layout for archetype '{}'", fixed.key())),
        }
    }
}

/// Stable validation codes raised while constructing a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegErrorCode {
    DuplicateType,
    BadTypeKey,
    MissingField,
    InvalidArchetype,
    PortCountMismatch,
    ControlNotAllowed,
    MissingOnSignal,
    DefaultParamOutOfRange,
}

impl RegErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegErrorCode::DuplicateType => "REG_DUPLICATE_TYPE",
            RegErrorCode::BadTypeKey => "REG_BAD_TYPE_KEY",
            RegErrorCode::MissingField => "REG_MISSING_FIELD",
            RegErrorCode::InvalidArchetype => "REG_INVALID_ARCHETYPE",
            RegErrorCode::PortCountMismatch => "REG_PORT_COUNT_MISMATCH",
            RegErrorCode::ControlNotAllowed => "REG_CONTROL_NOT_ALLOWED",
            RegErrorCode::MissingOnSignal => "REG_MISSING_ON_SIGNAL",
            RegErrorCode::DefaultParamOutOfRange => "REG_DEFAULT_PARAM_OUT_OF_RANGE",
        }
    }
}

/// A rejected catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegError {
    pub type_key: String,
    pub code: RegErrorCode,
    pub message: String,
}

/// The validated catalog. Lookup is by type key.
#[derive(Debug)]
pub struct Registry {
    defs: HashMap<&'static str, NodeTypeDef>,
    /// Insertion order, for stable palette listings and diagnostics.
    order: Vec<&'static str>,
}

impl Registry {
    /// Build a registry from a list of entries, validating each. Any error
    /// rejects construction wholesale; registries are never partially
    /// valid.
    pub fn from_defs(defs: Vec<NodeTypeDef>) -> Result<Self, Vec<RegError>> {
        let mut errors = Vec::new();
        let mut map: HashMap<&'static str, NodeTypeDef> = HashMap::new();
        let mut order = Vec::new();

        for def in defs {
            validate_def(&def, &map, &mut errors);
            if map.contains_key(def.type_key) {
                continue;
            }
            order.push(def.type_key);
            map.insert(def.type_key, def);
        }

        if errors.is_empty() {
            Ok(Self { defs: map, order })
        } else {
            Err(errors)
        }
    }

    /// The builtin catalog.
    pub fn with_builtins() -> Result<Self, Vec<RegError>> {
        Self::from_defs(builtin_defs())
    }

    pub fn get(&self, type_key: &str) -> Option<&NodeTypeDef> {
        self.defs.get(type_key)
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.defs.contains_key(type_key)
    }

    /// Type keys in registration order.
    pub fn type_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }

    /// All param maps in the catalog, for the bridge to key its value
    /// tables by target.
    pub fn param_maps(&self) -> impl Iterator<Item = &ParamMap> + '_ {
        self.order
            .iter()
            .filter_map(move |k| self.defs[k].param_map.as_ref())
    }
}

fn is_kebab_case(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('-')
        && !key.ends_with('-')
        && !key.contains("--")
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validate_def(
    def: &NodeTypeDef,
    existing: &HashMap<&'static str, NodeTypeDef>,
    errors: &mut Vec<RegError>,
) {
    let mut push = |code: RegErrorCode, message: String| {
        errors.push(RegError {
            type_key: def.type_key.to_string(),
            code,
            message,
        });
    };

    if existing.contains_key(def.type_key) {
        push(
            RegErrorCode::DuplicateType,
            format!("type '{}' registered twice", def.type_key),
        );
    }
    if !is_kebab_case(def.type_key) {
        push(
            RegErrorCode::BadTypeKey,
            format!("type key '{}' is not kebab-case", def.type_key),
        );
    }
    if def.label.is_empty() {
        push(RegErrorCode::MissingField, "label is empty".to_string());
    }
    if let Some((inputs, outputs, controls)) = def.layout.expected_counts() {
        if (def.inputs, def.outputs, def.control_ports) != (inputs, outputs, controls) {
            push(
                RegErrorCode::PortCountMismatch,
                format!(
                    "archetype '{}' expects {}/{}/{} ports, got {}/{}/{}",
                    def.layout.key(),
                    inputs,
                    outputs,
                    controls,
                    def.inputs,
                    def.outputs,
                    def.control_ports
                ),
            );
        }
    }
    if def.control_ports > 0 && !def.layout.allows_controls() {
        push(
            RegErrorCode::ControlNotAllowed,
            format!("archetype '{}' has no control slots", def.layout.key()),
        );
    }
    if def.outputs > 0 && def.on_signal.is_none() {
        push(
            RegErrorCode::MissingOnSignal,
            "types with outputs must provide on_signal".to_string(),
        );
    }
    if !(STEP_MIN..=STEP_MAX).contains(&def.default_param) {
        push(
            RegErrorCode::DefaultParamOutOfRange,
            format!("default param {} outside 1..=8", def.default_param),
        );
    }
}

fn builtin_defs() -> Vec<NodeTypeDef> {
    vec![
        NodeTypeDef {
            type_key: PULSE_TYPE,
            label: "Pulse",
            layout: Archetype::SingleIo,
            inputs: 1,
            outputs: 1,
            control_ports: 0,
            default_param: 4,
            param_map: None,
            init_state: None,
            on_control: None,
            on_signal: Some(behavior::pulse_signal),
        },
        NodeTypeDef {
            type_key: "random",
            label: "Random",
            layout: Archetype::SingleIo,
            inputs: 1,
            outputs: 1,
            control_ports: 0,
            default_param: 1,
            param_map: None,
            init_state: None,
            on_control: None,
            on_signal: Some(behavior::random_signal),
        },
        NodeTypeDef {
            type_key: "speed",
            label: "Speed",
            layout: Archetype::SingleIoControl,
            inputs: 1,
            outputs: 1,
            control_ports: 1,
            default_param: 2,
            param_map: None,
            init_state: None,
            on_control: Some(control_set_param),
            on_signal: Some(behavior::speed_signal),
        },
        NodeTypeDef {
            type_key: "set",
            label: "Set",
            layout: Archetype::SingleIoControl,
            inputs: 1,
            outputs: 1,
            control_ports: 1,
            default_param: 1,
            param_map: None,
            init_state: None,
            on_control: Some(control_set_param),
            on_signal: Some(behavior::set_signal),
        },
        NodeTypeDef {
            type_key: "seq",
            label: "Sequence",
            layout: Archetype::MultiOut6Control,
            inputs: 1,
            outputs: 6,
            control_ports: 1,
            default_param: 6,
            param_map: None,
            init_state: Some(behavior::seq_init),
            on_control: Some(control_set_param),
            on_signal: Some(behavior::seq_signal),
        },
        NodeTypeDef {
            type_key: "split",
            label: "Split",
            layout: Archetype::MultiOut6,
            inputs: 1,
            outputs: 6,
            control_ports: 0,
            default_param: 1,
            param_map: None,
            init_state: None,
            on_control: None,
            on_signal: Some(behavior::split_signal),
        },
        NodeTypeDef {
            type_key: "merge",
            label: "Merge",
            layout: Archetype::MultiIn6,
            inputs: 6,
            outputs: 1,
            control_ports: 0,
            default_param: 1,
            param_map: None,
            init_state: None,
            on_control: None,
            on_signal: Some(behavior::merge_signal),
        },
        NodeTypeDef {
            type_key: "decay",
            label: "Decay",
            layout: Archetype::SingleIoControl,
            inputs: 1,
            outputs: 1,
            control_ports: 1,
            default_param: 4,
            param_map: Some(ParamMap {
                target: "end",
                mapping: "decayTable",
            }),
            init_state: None,
            on_control: Some(control_set_param),
            on_signal: Some(behavior::stamp_param_signal),
        },
        NodeTypeDef {
            type_key: "crush",
            label: "Crush",
            layout: Archetype::SingleIoControl,
            inputs: 1,
            outputs: 1,
            control_ports: 1,
            default_param: 4,
            param_map: Some(ParamMap {
                target: "crush",
                mapping: "crushTable",
            }),
            init_state: None,
            on_control: Some(control_set_param),
            on_signal: Some(behavior::stamp_param_signal),
        },
        NodeTypeDef {
            type_key: "lpf",
            label: "Low-pass",
            layout: Archetype::SingleIoControl,
            inputs: 1,
            outputs: 1,
            control_ports: 1,
            default_param: 4,
            param_map: Some(ParamMap {
                target: "lpf",
                mapping: "lpfTable",
            }),
            init_state: None,
            on_control: Some(control_set_param),
            on_signal: Some(behavior::stamp_param_signal),
        },
        NodeTypeDef {
            type_key: "hpf",
            label: "High-pass",
            layout: Archetype::SingleIoControl,
            inputs: 1,
            outputs: 1,
            control_ports: 1,
            default_param: 4,
            param_map: Some(ParamMap {
                target: "hpf",
                mapping: "hpfTable",
            }),
            init_state: None,
            on_control: Some(control_set_param),
            on_signal: Some(behavior::stamp_param_signal),
        },
        NodeTypeDef {
            type_key: OUTPUT_TYPE,
            label: "Output",
            layout: Archetype::SingleIn,
            inputs: 1,
            outputs: 0,
            control_ports: 0,
            default_param: 1,
            param_map: None,
            init_state: None,
            on_control: None,
            on_signal: None,
        },
        NodeTypeDef {
            type_key: GROUP_TYPE,
            label: "Group",
            layout: Archetype::Custom,
            inputs: 0,
            outputs: 0,
            control_ports: 0,
            default_param: 1,
            param_map: None,
            init_state: None,
            on_control: None,
            on_signal: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_validate() {
        let reg = Registry::with_builtins().expect("builtin catalog must be valid");
        assert!(reg.contains("pulse"));
        assert!(reg.contains("output"));
        assert!(reg.contains("lpf"));
        let keys: Vec<_> = reg.type_keys().collect();
        assert_eq!(keys[0], "pulse");
    }

    #[test]
    fn kebab_case_rules() {
        assert!(is_kebab_case("multi-out-6"));
        assert!(is_kebab_case("pulse"));
        assert!(!is_kebab_case("Pulse"));
        assert!(!is_kebab_case("two--dashes"));
        assert!(!is_kebab_case("-lead"));
        assert!(!is_kebab_case(""));
    }

    fn minimal_def() -> NodeTypeDef {
        NodeTypeDef {
            type_key: "thing",
            label: "Thing",
            layout: Archetype::SingleIo,
            inputs: 1,
            outputs: 1,
            control_ports: 0,
            default_param: 1,
            param_map: None,
            init_state: None,
            on_control: None,
            on_signal: Some(super::behavior::merge_signal),
        }
    }

    #[test]
    fn rejects_duplicate_type() {
        let errs = Registry::from_defs(vec![minimal_def(), minimal_def()]).unwrap_err();
        assert!(errs.iter().any(|e| e.code == RegErrorCode::DuplicateType));
    }

    #[test]
    fn rejects_port_count_mismatch() {
        let mut def = minimal_def();
        def.outputs = 3;
        let errs = Registry::from_defs(vec![def]).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| e.code == RegErrorCode::PortCountMismatch));
    }

    #[test]
    fn rejects_control_on_disallowed_layout() {
        let mut def = minimal_def();
        def.control_ports = 1;
        let errs = Registry::from_defs(vec![def]).unwrap_err();
        assert!(errs.iter().any(|e| e.code == RegErrorCode::ControlNotAllowed));
    }

    #[test]
    fn rejects_missing_on_signal() {
        let mut def = minimal_def();
        def.on_signal = None;
        let errs = Registry::from_defs(vec![def]).unwrap_err();
        assert!(errs.iter().any(|e| e.code == RegErrorCode::MissingOnSignal));
    }

    #[test]
    fn rejects_default_param_out_of_range() {
        let mut def = minimal_def();
        def.default_param = 9;
        let errs = Registry::from_defs(vec![def]).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| e.code == RegErrorCode::DefaultParamOutOfRange));
    }
}
