use serde::{Deserialize, Serialize};

use crate::clock::Time;
use crate::ids::{AdLibPieceId, PartId, PieceId, RundownId};
use crate::model::timeline::{Duration, TimelineObject, Trigger};

/// How far a piece lives past the end of its own part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfiniteMode {
    #[default]
    None,
    /// Bounded by its part.
    Normal,
    /// Continues into following parts regardless of segment until another
    /// piece takes the source layer.
    OutOnNextPart,
    /// Continues into following parts of the same segment until another
    /// piece takes the source layer.
    OutOnNextSegment,
}

impl InfiniteMode {
    /// Whether pieces in this mode continue across part boundaries.
    pub fn continues(self) -> bool {
        matches!(self, InfiniteMode::OutOnNextPart | InfiniteMode::OutOnNextSegment)
    }
}

/// Device objects carried by a piece.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PieceContent {
    #[serde(default)]
    pub timeline_objects: Vec<TimelineObject>,
}

/// A content item on a part's source layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub rundown_id: RundownId,
    pub part_id: PartId,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    pub source_layer_id: String,
    /// Start, relative to the part.
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub expected_duration: Option<i64>,
    /// Actual played duration, once known.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Operator or playout override of the duration.
    #[serde(default)]
    pub duration_override: Option<Duration>,
    /// End of an infinite run, written by the continuation tracker as an
    /// expression on the superseding piece's group.
    #[serde(default)]
    pub infinite_cap: Option<Duration>,
    #[serde(default)]
    pub infinite_mode: InfiniteMode,
    /// Origin of the infinite run this piece belongs to (own id for origins).
    #[serde(default)]
    pub infinite_id: Option<PieceId>,
    /// The instance this continuation was copied from.
    #[serde(default)]
    pub continues_ref_id: Option<PieceId>,
    #[serde(default)]
    pub content: PieceContent,
    #[serde(default)]
    pub disabled: bool,
    /// Inserted during playout (ad-lib, hold extension).
    #[serde(default)]
    pub dynamically_inserted: bool,
    #[serde(default)]
    pub adlib_source_id: Option<AdLibPieceId>,
    #[serde(default)]
    pub is_transition: bool,
    #[serde(default)]
    pub extend_on_hold: bool,
    #[serde(default)]
    pub started_playback: Option<Time>,
}

impl Piece {
    pub fn new(
        id: impl Into<PieceId>,
        rundown_id: impl Into<RundownId>,
        part_id: impl Into<PartId>,
        source_layer_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            external_id: id.to_string(),
            name: id.to_string(),
            id,
            rundown_id: rundown_id.into(),
            part_id: part_id.into(),
            source_layer_id: source_layer_id.into(),
            trigger: Trigger::Absolute(0),
            expected_duration: None,
            duration: None,
            duration_override: None,
            infinite_cap: None,
            infinite_mode: InfiniteMode::None,
            infinite_id: None,
            continues_ref_id: None,
            content: PieceContent::default(),
            disabled: false,
            dynamically_inserted: false,
            adlib_source_id: None,
            is_transition: false,
            extend_on_hold: false,
            started_playback: None,
        }
    }

    /// Builder: set the infinite mode.
    pub fn with_infinite_mode(mut self, mode: InfiniteMode) -> Self {
        self.infinite_mode = mode;
        self
    }

    /// Builder: append a device object.
    pub fn with_object(mut self, object: TimelineObject) -> Self {
        self.content.timeline_objects.push(object);
        self
    }

    /// Whether this piece belongs to an infinite run started elsewhere.
    pub fn is_continuation(&self) -> bool {
        self.infinite_id.as_ref().is_some_and(|origin| *origin != self.id)
    }

    /// Continuation copies owned and regenerated by the tracker.
    pub fn is_tracked_continuation(&self) -> bool {
        self.is_continuation() && !self.dynamically_inserted
    }

    /// Whether this piece closes, rather than continues, its source layer.
    pub fn ends_infinite(&self) -> bool {
        !self.infinite_mode.continues()
            || self.expected_duration.is_some()
            || self.duration_override.is_some()
    }

    /// Duration used when placing the piece on the timeline; `None` means
    /// it runs until its part (or infinite run) ends.
    pub fn effective_duration(&self) -> Option<Duration> {
        self.duration_override
            .clone()
            .or_else(|| self.infinite_cap.clone())
            .or(self.expected_duration.map(Duration::Millis))
    }

    /// Trigger offset if it is a literal position in the part.
    pub fn trigger_offset(&self) -> Option<Time> {
        match self.trigger {
            Trigger::Absolute(t) => Some(t),
            _ => None,
        }
    }

    /// Whether any of this piece's objects target `layer`.
    pub fn touches_layer(&self, layer: &str) -> bool {
        self.content
            .timeline_objects
            .iter()
            .any(|o| o.layer == layer)
    }
}

/// A piece the operator can insert on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdLibPiece {
    pub id: AdLibPieceId,
    pub rundown_id: RundownId,
    pub part_id: PartId,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    pub source_layer_id: String,
    #[serde(default)]
    pub expected_duration: Option<i64>,
    #[serde(default)]
    pub infinite_mode: InfiniteMode,
    #[serde(default)]
    pub content: PieceContent,
    #[serde(default)]
    pub rank: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_not_a_continuation() {
        let mut piece = Piece::new("a", "ro", "p1", "L");
        piece.infinite_id = Some(PieceId::from("a"));
        assert!(!piece.is_continuation());
        piece.infinite_id = Some(PieceId::from("other"));
        assert!(piece.is_continuation());
        assert!(piece.is_tracked_continuation());
        piece.dynamically_inserted = true;
        assert!(!piece.is_tracked_continuation());
    }

    #[test]
    fn ends_infinite_rules() {
        let piece = Piece::new("a", "ro", "p1", "L");
        assert!(piece.ends_infinite());
        let mut inf = piece.with_infinite_mode(InfiniteMode::OutOnNextPart);
        assert!(!inf.ends_infinite());
        inf.expected_duration = Some(5000);
        assert!(inf.ends_infinite());
    }

    #[test]
    fn effective_duration_precedence() {
        let mut piece = Piece::new("a", "ro", "p1", "L");
        assert_eq!(piece.effective_duration(), None);
        piece.expected_duration = Some(3000);
        assert_eq!(piece.effective_duration(), Some(Duration::Millis(3000)));
        piece.infinite_cap = Some(Duration::Expression("#x.start - #.start".into()));
        assert_eq!(
            piece.effective_duration(),
            Some(Duration::Expression("#x.start - #.start".into()))
        );
        piece.duration_override = Some(Duration::Millis(10));
        assert_eq!(piece.effective_duration(), Some(Duration::Millis(10)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{"id":"a","rundown_id":"ro","part_id":"p1","source_layer_id":"cam"}"#;
        let piece: Piece = serde_json::from_str(json).unwrap();
        assert_eq!(piece.trigger, Trigger::Absolute(0));
        assert_eq!(piece.infinite_mode, InfiniteMode::None);
        assert!(piece.content.timeline_objects.is_empty());
    }
}
