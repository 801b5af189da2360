use serde::{Deserialize, Serialize};

use crate::clock::Time;
use crate::ids::{PartId, RundownId, SegmentId, StudioId};

/// Progress of an operator-controlled hold between two parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    #[default]
    None,
    /// Armed; the next take enters the hold.
    Pending,
    /// Outgoing content is being extended.
    Active,
    /// Extension removed; the next take returns to normal.
    Complete,
}

impl HoldState {
    /// Whether a hold is underway and pointers must not be moved.
    pub fn is_in_progress(self) -> bool {
        matches!(self, HoldState::Pending | HoldState::Active)
    }
}

/// An ordered show: segments of parts, plus the playout pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rundown {
    pub id: RundownId,
    pub studio_id: StudioId,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub rehearsal: bool,
    #[serde(default)]
    pub current_part_id: Option<PartId>,
    #[serde(default)]
    pub next_part_id: Option<PartId>,
    #[serde(default)]
    pub previous_part_id: Option<PartId>,
    #[serde(default)]
    pub next_part_manual: bool,
    #[serde(default)]
    pub hold_state: HoldState,
    #[serde(default)]
    pub started_playback: Option<Time>,
    /// Normalized ingest data handed to the blueprint for the baseline.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Rundown {
    pub fn new(id: impl Into<RundownId>, studio_id: impl Into<StudioId>) -> Self {
        let id = id.into();
        Self {
            external_id: id.to_string(),
            name: id.to_string(),
            id,
            studio_id: studio_id.into(),
            active: false,
            rehearsal: false,
            current_part_id: None,
            next_part_id: None,
            previous_part_id: None,
            next_part_manual: false,
            hold_state: HoldState::None,
            started_playback: None,
            payload: serde_json::Value::Null,
        }
    }
}

/// A group of consecutive parts (one story block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub rundown_id: RundownId,
    #[serde(default)]
    pub external_id: String,
    pub rank: f64,
    #[serde(default)]
    pub name: String,
}

impl Segment {
    pub fn new(id: impl Into<SegmentId>, rundown_id: impl Into<RundownId>, rank: f64) -> Self {
        let id = id.into();
        Self {
            external_id: id.to_string(),
            name: id.to_string(),
            id,
            rundown_id: rundown_id.into(),
            rank,
        }
    }
}
