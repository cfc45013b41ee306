//! Module metadata: what the host needs besides the binary.
//!
//! The host uses this to call functions with the right arguments, to find
//! and decode output regions, and to schedule tasks on their triggers.

use rill_types::ast::{Literal, Trigger};
use rill_types::Type;
use serde::{Deserialize, Serialize};

use crate::layout::{FunctionEntry, FunctionTable, Returns, UnitKind};

/// Description of a compiled module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub functions: Vec<FunctionInfo>,
    /// Task triggers mapped to the export that services them.
    pub bindings: Vec<TriggerBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Export name.
    pub name: String,
    pub kind: FuncKind,
    /// Absolute WASM function index.
    pub index: u32,
    /// Config values followed by parameters, in WASM parameter order.
    pub params: Vec<ParamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<Type>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outputs: Vec<OutputInfo>,
    /// Address of the u64 dirty bitmap for multi-output functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty_bitmap: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuncKind {
    Function,
    Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    pub ty: Type,
    /// Bound from configuration rather than per call.
    pub config: bool,
    /// Passed when a call leaves the argument out.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default: Option<Literal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub name: String,
    pub ty: Type,
    /// Absolute address in linear memory.
    pub address: u32,
    /// Bit set in the dirty bitmap when written.
    pub bit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TriggerInfo {
    Channels { names: Vec<String> },
    Interval { nanos: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerBinding {
    pub trigger: TriggerInfo,
    /// Export to invoke when the trigger fires.
    pub function: String,
}

impl ModuleMetadata {
    /// Describe every function in `table`, given how many imports precede them.
    pub fn describe(table: &FunctionTable, import_count: u32) -> Self {
        let mut meta = ModuleMetadata::default();
        for entry in table.iter() {
            meta.functions.push(describe_function(entry, import_count));
            if let Some(trigger) = &entry.trigger {
                meta.bindings.push(TriggerBinding {
                    trigger: match trigger {
                        Trigger::Channels(names) => TriggerInfo::Channels {
                            names: names.iter().map(|n| n.name.clone()).collect(),
                        },
                        Trigger::Interval(nanos) => TriggerInfo::Interval { nanos: *nanos },
                    },
                    function: entry.name.clone(),
                });
            }
        }
        meta
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

fn describe_function(entry: &FunctionEntry, import_count: u32) -> FunctionInfo {
    let params = entry
        .config
        .iter()
        .map(|p| (p, true))
        .chain(entry.params.iter().map(|p| (p, false)))
        .map(|(p, config)| ParamInfo {
            name: p.name.name.clone(),
            ty: p.ty.clone(),
            config,
            default: p.default.clone(),
        })
        .collect();

    let (return_type, outputs, dirty_bitmap) = match &entry.returns {
        Returns::Void => (None, Vec::new(), None),
        Returns::Value(ty) => (Some(ty.clone()), Vec::new(), None),
        Returns::Outputs(layout) => {
            let outputs = layout
                .slots
                .iter()
                .map(|slot| OutputInfo {
                    name: slot.name.clone(),
                    ty: slot.ty.clone(),
                    address: layout.address(slot),
                    bit: slot.bit,
                })
                .collect();
            (None, outputs, Some(layout.bitmap_address()))
        }
    };

    FunctionInfo {
        name: entry.name.clone(),
        kind: match entry.kind {
            UnitKind::Function => FuncKind::Function,
            UnitKind::Task => FuncKind::Task,
        },
        index: import_count + entry.ordinal,
        params,
        return_type,
        outputs,
        dirty_bitmap,
    }
}
