//! Ingest: structural changes from the newsroom side.
//!
//! Each operation stores the change under the rundown's lock and then asks
//! for a debounced recompute, so a burst of edits to one rundown costs a
//! single recompute once it settles.

use rusqlite::Connection;
use tracing::{debug, info};

use onair_core::rank::{needs_rebalance, rebalance_ranks};
use onair_core::{hash_id, Error, Part, PartId, Result, Rundown, RundownId, Segment, SegmentId, Studio};
use onair_db::queries::{baseline, parts, rundowns, segments, studios};

use super::{PlayoutService, RundownState};
use crate::blueprint::validate_baseline;
use crate::context::BlueprintContext;

/// Stable id of a part from its rundown and external id.
pub fn part_id_for(rundown_id: &RundownId, external_id: &str) -> PartId {
    PartId::from(hash_id(&format!("{rundown_id}_{external_id}")))
}

impl PlayoutService {
    /// Store a studio and its layer mappings.
    pub fn ingest_studio(&self, studio: &Studio) -> Result<()> {
        self.transaction(|conn, events| {
            studios::upsert_studio(conn, studio)?;
            if rundowns::get_active_rundown(conn, &studio.id)?.is_some() {
                self.compile_studio(conn, &studio.id, None, events)?;
            }
            info!(studio_id = %studio.id, mappings = studio.mappings.len(), "Studio ingested");
            Ok(())
        })
    }

    /// Create or update a rundown's metadata.
    ///
    /// Playout pointers of an existing rundown are kept. An active rundown
    /// gets its baseline regenerated.
    pub fn ingest_rundown(&self, rundown: &Rundown) -> Result<Rundown> {
        let stored = self.with_rundown(&rundown.id, |conn, _events| {
            let stored = match rundowns::get_rundown(conn, &rundown.id)? {
                Some(existing) => {
                    if existing.active && existing.studio_id != rundown.studio_id {
                        return Err(Error::Conflict(format!(
                            "rundown {} is active and cannot change studio",
                            rundown.id
                        )));
                    }
                    Rundown {
                        studio_id: rundown.studio_id.clone(),
                        external_id: rundown.external_id.clone(),
                        name: rundown.name.clone(),
                        payload: rundown.payload.clone(),
                        ..existing
                    }
                }
                None => {
                    let mut fresh = Rundown::new(rundown.id.clone(), rundown.studio_id.clone());
                    fresh.external_id = rundown.external_id.clone();
                    fresh.name = rundown.name.clone();
                    fresh.payload = rundown.payload.clone();
                    fresh
                }
            };

            if stored.active {
                let blueprint = self.blueprints.get(&stored.studio_id);
                let mut ctx = BlueprintContext::baseline(stored.studio_id.clone(), stored.id.clone());
                let objects = blueprint.get_baseline(&mut ctx, &stored)?;
                validate_baseline(&objects)?;
                baseline::replace_baseline(conn, &stored.id, &objects)?;
            }
            rundowns::upsert_rundown(conn, &stored)?;
            info!(rundown_id = %stored.id, "Rundown ingested");
            Ok(stored)
        })?;
        self.schedule_recompute(&stored.id);
        Ok(stored)
    }

    /// Create or update a segment.
    pub fn ingest_segment(&self, segment: &Segment) -> Result<()> {
        self.with_rundown(&segment.rundown_id, |conn, _events| {
            rundowns::get_rundown(conn, &segment.rundown_id)?
                .ok_or_else(|| Error::not_found("rundown", &segment.rundown_id))?;
            segments::upsert_segment(conn, segment)?;
            self.rebalance_segments(conn, &segment.rundown_id)
        })?;
        debug!(segment_id = %segment.id, "Segment ingested");
        self.schedule_recompute(&segment.rundown_id);
        Ok(())
    }

    /// Create or update a part and regenerate its content.
    ///
    /// The part id is derived from the rundown id and `part.external_id`.
    /// A part that is on air is only marked dirty; it is regenerated the
    /// next time it is set as next.
    pub fn ingest_part(&self, part: &Part) -> Result<PartId> {
        if part.external_id.is_empty() {
            return Err(Error::Validation("part has no external id".into()));
        }
        let rundown_id = part.rundown_id.clone();
        let id = part_id_for(&rundown_id, &part.external_id);

        self.with_rundown(&rundown_id, |conn, _events| {
            let rundown = rundowns::get_rundown(conn, &rundown_id)?
                .ok_or_else(|| Error::not_found("rundown", &rundown_id))?;
            let segment = segments::get_segment(conn, &part.segment_id)?
                .ok_or_else(|| Error::not_found("segment", &part.segment_id))?;
            if segment.rundown_id != rundown_id {
                return Err(Error::Validation(format!(
                    "segment {} belongs to rundown {}",
                    segment.id, segment.rundown_id
                )));
            }

            let mut stored = part.clone();
            stored.id = id.clone();
            if let Some(existing) = parts::get_part(conn, &id)? {
                stored.started_playback = existing.started_playback;
                stored.stopped_playback = existing.stopped_playback;
                stored.take_times = existing.take_times;
                stored.duration = existing.duration;
            }

            let on_air = rundown.active && rundown.current_part_id.as_ref() == Some(&id);
            if on_air {
                stored.dirty = true;
                parts::upsert_part(conn, &stored)?;
                info!(part_id = %id, "Part on air changed; regenerating when next");
            } else {
                stored.dirty = false;
                parts::upsert_part(conn, &stored)?;
                self.generate_part(conn, &rundown.studio_id, &stored)?;
            }
            self.rebalance_parts(conn, &stored.segment_id)
        })?;

        self.schedule_recompute(&rundown_id);
        Ok(id)
    }

    /// Remove a part. The part on air cannot be removed.
    pub fn remove_part(&self, rundown_id: &RundownId, part_id: &PartId) -> Result<()> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            if state.playlist.part(part_id).is_none() {
                return Err(Error::not_found("part", part_id));
            }
            if state.rundown.current_part_id.as_ref() == Some(part_id) {
                return Err(Error::InvalidState(format!("part {part_id} is on air")));
            }
            if state.rundown.next_part_id.as_ref() == Some(part_id) {
                let replacement = state
                    .playlist
                    .after(part_id)
                    .map(|p| p.id.clone())
                    .filter(|id| state.rundown.current_part_id.as_ref() != Some(id));
                self.replace_next(conn, &mut state, replacement, events)?;
            }
            if state.rundown.previous_part_id.as_ref() == Some(part_id) {
                state.rundown.previous_part_id = None;
            }
            state.save_rundown(conn)?;
            parts::delete_part(conn, part_id)?;
            info!(rundown_id = %rundown_id, part_id = %part_id, "Part removed");
            Ok(())
        })?;
        self.schedule_recompute(rundown_id);
        Ok(())
    }

    /// Remove a segment and its parts. A segment holding the part on air
    /// cannot be removed.
    pub fn remove_segment(&self, rundown_id: &RundownId, segment_id: &SegmentId) -> Result<()> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            if !state.playlist.segments.iter().any(|s| s.id == *segment_id) {
                return Err(Error::not_found("segment", segment_id));
            }
            let in_segment = |id: Option<&PartId>| {
                id.and_then(|id| state.playlist.part(id))
                    .is_some_and(|p| p.segment_id == *segment_id)
            };
            if in_segment(state.rundown.current_part_id.as_ref()) {
                return Err(Error::InvalidState(format!(
                    "segment {segment_id} holds the part on air"
                )));
            }
            let next_inside = in_segment(state.rundown.next_part_id.as_ref());
            let previous_inside = in_segment(state.rundown.previous_part_id.as_ref());

            if next_inside {
                let replacement = state.playlist.first_after_segment(segment_id).map(|p| p.id.clone());
                self.replace_next(conn, &mut state, replacement, events)?;
            }
            if previous_inside {
                state.rundown.previous_part_id = None;
            }
            state.save_rundown(conn)?;
            segments::delete_segment(conn, segment_id)?;
            info!(rundown_id = %rundown_id, segment_id = %segment_id, "Segment removed");
            Ok(())
        })?;
        self.schedule_recompute(rundown_id);
        Ok(())
    }

    /// Point next at `replacement` while the old next is being removed.
    fn replace_next(
        &self,
        conn: &Connection,
        state: &mut RundownState,
        replacement: Option<PartId>,
        events: &mut Vec<onair_core::events::EventPayload>,
    ) -> Result<()> {
        if let Some(id) = &replacement {
            self.prepare_next(conn, state, id)?;
        }
        state.rundown.next_part_id = replacement.clone();
        state.rundown.next_part_manual = false;
        events.push(onair_core::events::EventPayload::NextPartChanged {
            rundown_id: state.rundown.id.clone(),
            part_id: replacement,
        });
        Ok(())
    }

    fn rebalance_segments(&self, conn: &Connection, rundown_id: &RundownId) -> Result<()> {
        let mut list = segments::list_segments(conn, rundown_id)?;
        list.sort_by(|a, b| a.rank.total_cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        let ranks: Vec<f64> = list.iter().map(|s| s.rank).collect();
        if !needs_rebalance(&ranks, self.config.rank_epsilon) {
            return Ok(());
        }
        for (segment, rank) in list.iter_mut().zip(rebalance_ranks(ranks.len())) {
            segment.rank = rank;
            segments::upsert_segment(conn, segment)?;
        }
        debug!(rundown_id = %rundown_id, count = list.len(), "Segment ranks rebalanced");
        Ok(())
    }

    fn rebalance_parts(&self, conn: &Connection, segment_id: &SegmentId) -> Result<()> {
        let mut list = parts::list_parts_in_segment(conn, segment_id)?;
        list.sort_by(|a, b| a.rank.total_cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        let ranks: Vec<f64> = list.iter().map(|p| p.rank).collect();
        if !needs_rebalance(&ranks, self.config.rank_epsilon) {
            return Ok(());
        }
        for (part, rank) in list.iter_mut().zip(rebalance_ranks(ranks.len())) {
            part.rank = rank;
            parts::upsert_part(conn, part)?;
        }
        debug!(segment_id = %segment_id, count = list.len(), "Part ranks rebalanced");
        Ok(())
    }
}
