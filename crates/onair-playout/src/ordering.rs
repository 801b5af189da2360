//! Playout order of a rundown's parts.
//!
//! Parts are ordered by (segment rank, segment id, part rank, part id).
//! Ranks are floats and need not be contiguous; ids break ties so the order
//! is total and stable across reloads.

use std::cmp::Ordering;
use std::collections::HashMap;

use onair_core::{Part, PartId, Segment, SegmentId};

/// An ordered snapshot of a rundown's segments and parts.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    pub segments: Vec<Segment>,
    pub parts: Vec<Part>,
}

fn cmp_rank(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

impl Playlist {
    /// Sort `segments` and `parts` into playout order.
    ///
    /// Parts whose segment is unknown sort after all known segments.
    pub fn new(mut segments: Vec<Segment>, mut parts: Vec<Part>) -> Self {
        segments.sort_by(|a, b| cmp_rank(a.rank, b.rank).then_with(|| a.id.cmp(&b.id)));
        let seg_pos: HashMap<&SegmentId, usize> =
            segments.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();
        parts.sort_by(|a, b| {
            let sa = seg_pos.get(&a.segment_id).copied().unwrap_or(usize::MAX);
            let sb = seg_pos.get(&b.segment_id).copied().unwrap_or(usize::MAX);
            sa.cmp(&sb)
                .then_with(|| a.segment_id.cmp(&b.segment_id))
                .then_with(|| cmp_rank(a.rank, b.rank))
                .then_with(|| a.id.cmp(&b.id))
        });
        Self { segments, parts }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn index_of(&self, id: &PartId) -> Option<usize> {
        self.parts.iter().position(|p| p.id == *id)
    }

    pub fn part(&self, id: &PartId) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == *id)
    }

    pub fn part_mut(&mut self, id: &PartId) -> Option<&mut Part> {
        self.parts.iter_mut().find(|p| p.id == *id)
    }

    pub fn first(&self) -> Option<&Part> {
        self.parts.first()
    }

    /// The part directly after `id` in playout order.
    pub fn after(&self, id: &PartId) -> Option<&Part> {
        self.index_of(id).and_then(|i| self.parts.get(i + 1))
    }

    /// The part directly before `id` in playout order.
    pub fn before(&self, id: &PartId) -> Option<&Part> {
        self.index_of(id)
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.parts.get(i))
    }

    /// Parts belonging to `segment`, in order.
    pub fn parts_in_segment<'a>(&'a self, segment: &'a SegmentId) -> impl Iterator<Item = &'a Part> {
        self.parts.iter().filter(move |p| p.segment_id == *segment)
    }

    /// First part after every part of `segment`.
    pub fn first_after_segment(&self, segment: &SegmentId) -> Option<&Part> {
        let last = self.parts.iter().rposition(|p| p.segment_id == *segment)?;
        self.parts.get(last + 1)
    }

    /// Walk from `anchor` by `segment_delta` segments, then `part_delta`
    /// parts, clamping to the rundown's bounds.
    ///
    /// A segment move lands on the first part of the target segment; empty
    /// segments are skipped in the direction of travel. Without an anchor
    /// the walk starts from the first part.
    pub fn move_target(
        &self,
        anchor: Option<&PartId>,
        part_delta: i32,
        segment_delta: i32,
    ) -> Option<&Part> {
        if self.parts.is_empty() {
            return None;
        }
        let mut idx = anchor.and_then(|id| self.index_of(id)).unwrap_or(0);

        if segment_delta != 0 {
            let segments: Vec<&SegmentId> = self
                .segments
                .iter()
                .map(|s| &s.id)
                .filter(|id| self.parts.iter().any(|p| p.segment_id == **id))
                .collect();
            if let Some(cur) = segments
                .iter()
                .position(|id| **id == self.parts[idx].segment_id)
            {
                let target = (cur as i64 + segment_delta as i64)
                    .clamp(0, segments.len() as i64 - 1) as usize;
                if let Some(first) = self
                    .parts
                    .iter()
                    .position(|p| p.segment_id == *segments[target])
                {
                    idx = first;
                }
            }
        }

        let target = (idx as i64 + part_delta as i64).clamp(0, self.parts.len() as i64 - 1);
        self.parts.get(target as usize)
    }
}
