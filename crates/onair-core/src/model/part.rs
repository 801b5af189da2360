use serde::{Deserialize, Serialize};

use crate::clock::Time;
use crate::ids::{PartId, RundownId, SegmentId};

/// Role of a part in an operator hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldMode {
    #[default]
    None,
    /// A hold may start from this part.
    From,
    /// A hold may end on this part.
    To,
}

/// A single playable story unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub rundown_id: RundownId,
    pub segment_id: SegmentId,
    #[serde(default)]
    pub external_id: String,
    pub rank: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub expected_duration: Option<i64>,
    #[serde(default)]
    pub auto_next: bool,
    #[serde(default)]
    pub auto_next_overlap: Option<i64>,
    /// Duration of the incoming transition into this part.
    #[serde(default)]
    pub transition_duration: Option<i64>,
    /// Explicit minimum overlap with the outgoing part.
    #[serde(default)]
    pub overlap_duration: Option<i64>,
    #[serde(default)]
    pub hold_mode: HoldMode,
    #[serde(default)]
    pub disable_out_transition: bool,
    #[serde(default)]
    pub started_playback: Vec<Time>,
    #[serde(default)]
    pub stopped_playback: Vec<Time>,
    #[serde(default)]
    pub take_times: Vec<Time>,
    /// Actual played duration, once known.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Source changed while on air; regenerate before it plays again.
    #[serde(default)]
    pub dirty: bool,
    /// Normalized ingest data handed to the blueprint.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Part {
    pub fn new(
        id: impl Into<PartId>,
        rundown_id: impl Into<RundownId>,
        segment_id: impl Into<SegmentId>,
        rank: f64,
    ) -> Self {
        let id = id.into();
        Self {
            external_id: id.to_string(),
            title: id.to_string(),
            id,
            rundown_id: rundown_id.into(),
            segment_id: segment_id.into(),
            rank,
            expected_duration: None,
            auto_next: false,
            auto_next_overlap: None,
            transition_duration: None,
            overlap_duration: None,
            hold_mode: HoldMode::None,
            disable_out_transition: false,
            started_playback: Vec::new(),
            stopped_playback: Vec::new(),
            take_times: Vec::new(),
            duration: None,
            dirty: false,
            payload: serde_json::Value::Null,
        }
    }

    pub fn last_started_playback(&self) -> Option<Time> {
        self.started_playback.last().copied()
    }

    pub fn last_take(&self) -> Option<Time> {
        self.take_times.last().copied()
    }

    /// Clear the transient playback fields so the part plays as new.
    pub fn reset_playback(&mut self) {
        self.started_playback.clear();
        self.stopped_playback.clear();
        self.take_times.clear();
        self.duration = None;
    }
}
