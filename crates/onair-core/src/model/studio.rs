use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::StudioId;

/// Layer reserved for abstract (non-device) objects such as playback callbacks.
pub const CORE_ABSTRACT_LAYER: &str = "core_abstract";

/// Pseudo-device that receives objects on [`CORE_ABSTRACT_LAYER`].
pub const CORE_ABSTRACT_DEVICE: &str = "core_abstract";

/// How a device layer is pre-rolled ahead of being live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookaheadMode {
    /// No lookahead for this layer.
    #[default]
    None,
    /// Load the next occupant on a parallel background layer.
    Preload,
    /// Keep showing the most recent occupant rather than clearing.
    Retain,
    /// Load the next occupant on the live layer whenever it is clear.
    WhenClear,
}

/// Maps a logical layer to a physical device channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub device_id: String,
    #[serde(default)]
    pub channel: Option<u32>,
    #[serde(default)]
    pub lookahead: LookaheadMode,
}

impl Mapping {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            channel: None,
            lookahead: LookaheadMode::None,
        }
    }

    pub fn with_lookahead(mut self, mode: LookaheadMode) -> Self {
        self.lookahead = mode;
        self
    }
}

/// A playout chain with its static layer mapping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Studio {
    pub id: StudioId,
    pub name: String,
    #[serde(default)]
    pub mappings: BTreeMap<String, Mapping>,
}

impl Studio {
    pub fn new(id: impl Into<StudioId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mappings: BTreeMap::new(),
        }
    }

    /// Builder: add a layer mapping.
    pub fn with_mapping(mut self, layer: impl Into<String>, mapping: Mapping) -> Self {
        self.mappings.insert(layer.into(), mapping);
        self
    }
}
