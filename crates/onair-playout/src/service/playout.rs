//! Operator-driven transitions: activation, take, hold, next-part moves
//! and ad-libs.

use rusqlite::Connection;
use tracing::{debug, info};

use onair_core::events::{EventPayload, StoryStatus};
use onair_core::{
    hash_id, AdLibPieceId, Error, HoldMode, HoldState, Part, PartId, Piece, PieceId, Result,
    Rundown, RundownId, Time, Trigger,
};
use onair_db::queries::{adlibs, baseline, parts};

use super::{PlayoutService, RundownState};
use crate::blueprint::validate_baseline;
use crate::context::BlueprintContext;
use crate::timeline::allows_transition;

pub(super) fn story(rundown_id: &RundownId, part_id: &PartId, status: StoryStatus) -> EventPayload {
    EventPayload::StoryStatus {
        rundown_id: rundown_id.clone(),
        part_id: part_id.clone(),
        status,
    }
}

fn require_active(state: &RundownState) -> Result<()> {
    if state.rundown.active {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "rundown {} is not active",
            state.rundown.id
        )))
    }
}

/// Id of the copy that extends `source` through a hold.
fn hold_copy_id(source: &PieceId) -> PieceId {
    PieceId::from(format!("{source}_hold"))
}

fn is_hold_copy(piece: &Piece) -> bool {
    piece.dynamically_inserted && piece.extend_on_hold && piece.is_continuation()
}

impl PlayoutService {
    // -- Activation ----------------------------------------------------------

    /// Put a rundown on air (or into rehearsal).
    ///
    /// Fails with a conflict if another rundown of the same studio is
    /// already active. Activating an active rundown only updates the
    /// rehearsal flag.
    pub fn activate(&self, rundown_id: &RundownId, rehearsal: bool) -> Result<Rundown> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            if state.rundown.active {
                if state.rundown.rehearsal != rehearsal {
                    state.rundown.rehearsal = rehearsal;
                    state.save_rundown(conn)?;
                }
                return Ok(state.rundown);
            }

            let studio_id = state.rundown.studio_id.clone();
            if let Some(other) = onair_db::queries::rundowns::get_active_rundown(conn, &studio_id)? {
                return Err(Error::Conflict(format!(
                    "rundown {} is already active in studio {studio_id}",
                    other.id
                )));
            }

            let blueprint = self.blueprints.get(&studio_id);
            let mut ctx = BlueprintContext::baseline(studio_id.clone(), rundown_id.clone());
            let objects = blueprint.get_baseline(&mut ctx, &state.rundown)?;
            validate_baseline(&objects)?;
            baseline::replace_baseline(conn, rundown_id, &objects)?;

            state.rundown.active = true;
            state.rundown.rehearsal = rehearsal;
            state.rundown.current_part_id = None;
            state.rundown.previous_part_id = None;
            state.rundown.hold_state = HoldState::None;
            state.rundown.next_part_manual = false;
            let first = state.playlist.first().map(|p| p.id.clone());
            if let Some(first) = &first {
                self.prepare_next(conn, &mut state, first)?;
            }
            state.rundown.next_part_id = first.clone();
            state.save_rundown(conn)?;

            state.update_infinites(conn, None, true)?;
            self.compile_studio(conn, &studio_id, None, events)?;

            events.push(EventPayload::RundownActivated {
                rundown_id: rundown_id.clone(),
                rehearsal,
            });
            events.push(EventPayload::NextPartChanged {
                rundown_id: rundown_id.clone(),
                part_id: first.clone(),
            });
            if let Some(first) = &first {
                events.push(story(rundown_id, first, StoryStatus::Next));
            }
            self.log_transition("Rundown activated", &state.rundown);
            Ok(state.rundown)
        })
    }

    /// Take a rundown off air and clear its timeline.
    pub fn deactivate(&self, rundown_id: &RundownId) -> Result<Rundown> {
        let now = self.clock.now();
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            if !state.rundown.active {
                return Ok(state.rundown);
            }

            if let Some(current) = state.rundown.current_part_id.clone() {
                state.save_part(conn, &current, |part| stop_playback(part, now))?;
                events.push(story(rundown_id, &current, StoryStatus::Off));
            }
            if let Some(next) = &state.rundown.next_part_id {
                events.push(story(rundown_id, next, StoryStatus::Off));
            }

            state.rundown.active = false;
            state.rundown.current_part_id = None;
            state.rundown.next_part_id = None;
            state.rundown.previous_part_id = None;
            state.rundown.next_part_manual = false;
            state.rundown.hold_state = HoldState::None;
            state.save_rundown(conn)?;

            self.compile_studio(conn, &state.rundown.studio_id, None, events)?;
            events.push(EventPayload::RundownDeactivated {
                rundown_id: rundown_id.clone(),
            });
            self.log_transition("Rundown deactivated", &state.rundown);
            Ok(state.rundown)
        })
    }

    /// Return a rundown to its pre-show state.
    ///
    /// Playback history and pieces inserted during playout are dropped. An
    /// active rundown stays active with its first part as next.
    pub fn reset_rundown(&self, rundown_id: &RundownId) -> Result<Rundown> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;

            let dynamic: Vec<PieceId> = state
                .pieces
                .iter()
                .filter(|p| p.dynamically_inserted)
                .map(|p| p.id.clone())
                .collect();
            for id in &dynamic {
                state.remove_piece(conn, id)?;
            }
            let played: Vec<Piece> = state
                .pieces
                .iter()
                .filter(|p| {
                    p.started_playback.is_some()
                        || p.duration.is_some()
                        || (p.extend_on_hold && p.infinite_id.as_ref() == Some(&p.id))
                })
                .cloned()
                .collect();
            for mut piece in played {
                piece.started_playback = None;
                piece.duration = None;
                if piece.infinite_id.as_ref() == Some(&piece.id) && piece.ends_infinite() {
                    piece.infinite_id = None;
                }
                state.save_piece(conn, piece)?;
            }
            let part_ids: Vec<PartId> = state.playlist.parts.iter().map(|p| p.id.clone()).collect();
            for id in &part_ids {
                state.save_part(conn, id, Part::reset_playback)?;
            }

            state.rundown.current_part_id = None;
            state.rundown.previous_part_id = None;
            state.rundown.hold_state = HoldState::None;
            state.rundown.next_part_manual = false;
            state.rundown.started_playback = None;
            state.rundown.next_part_id = if state.rundown.active {
                state.playlist.first().map(|p| p.id.clone())
            } else {
                None
            };
            state.save_rundown(conn)?;

            state.update_infinites(conn, None, true)?;
            if state.rundown.active {
                self.compile_studio(conn, &state.rundown.studio_id, None, events)?;
            }

            events.push(EventPayload::RundownReset {
                rundown_id: rundown_id.clone(),
            });
            events.push(EventPayload::NextPartChanged {
                rundown_id: rundown_id.clone(),
                part_id: state.rundown.next_part_id.clone(),
            });
            info!(rundown_id = %rundown_id, removed = dynamic.len(), "Rundown reset");
            Ok(state.rundown)
        })
    }

    // -- Take ----------------------------------------------------------------

    /// Advance the rundown: next becomes current, current becomes previous.
    ///
    /// A take while a hold is active ends the extension instead; a take
    /// after a completed hold only clears the hold.
    pub fn take(&self, rundown_id: &RundownId) -> Result<Rundown> {
        let now = self.clock.now();
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            require_active(&state)?;
            if let Some(current) = state.current_part() {
                self.check_take_allowed(&state, current, now)?;
            }

            match state.rundown.hold_state {
                HoldState::Complete => {
                    state.rundown.hold_state = HoldState::None;
                    state.save_rundown(conn)?;
                    self.compile_studio(conn, &state.rundown.studio_id, None, events)?;
                    self.log_transition("Hold cleared", &state.rundown);
                    return Ok(state.rundown);
                }
                HoldState::Active => {
                    self.complete_hold(conn, &mut state)?;
                    self.compile_studio(conn, &state.rundown.studio_id, None, events)?;
                    self.log_transition("Hold completed", &state.rundown);
                    return Ok(state.rundown);
                }
                HoldState::None | HoldState::Pending => {}
            }

            let taken = state
                .rundown
                .next_part_id
                .clone()
                .ok_or_else(|| Error::InvalidState("no next part to take".into()))?;
            let outgoing = state.rundown.current_part_id.clone();

            state.save_part(conn, &taken, |part| part.take_times.push(now))?;
            if state.rundown.hold_state == HoldState::Pending {
                if let Some(outgoing) = &outgoing {
                    self.start_hold(conn, &mut state, outgoing, &taken)?;
                }
                state.rundown.hold_state = HoldState::Active;
            }

            let next = state.playlist.after(&taken).map(|p| p.id.clone());
            if let Some(next) = &next {
                self.prepare_next(conn, &mut state, next)?;
            }
            state.rundown.previous_part_id = outgoing.clone();
            state.rundown.current_part_id = Some(taken.clone());
            state.rundown.next_part_id = next.clone();
            state.rundown.next_part_manual = false;
            state.save_rundown(conn)?;

            let anchor = outgoing.as_ref().unwrap_or(&taken).clone();
            state.update_infinites(conn, Some(&anchor), false)?;
            self.compile_studio(conn, &state.rundown.studio_id, None, events)?;

            events.push(EventPayload::PartTaken {
                rundown_id: rundown_id.clone(),
                part_id: taken.clone(),
                previous_part_id: outgoing.clone(),
            });
            if let Some(outgoing) = &outgoing {
                events.push(story(rundown_id, outgoing, StoryStatus::Off));
            }
            events.push(story(rundown_id, &taken, StoryStatus::OnAir));
            if let Some(next) = &next {
                events.push(story(rundown_id, next, StoryStatus::Next));
            }
            events.push(EventPayload::NextPartChanged {
                rundown_id: rundown_id.clone(),
                part_id: next,
            });
            self.log_transition("Take", &state.rundown);
            Ok(state.rundown)
        })
    }

    /// Refuse takes that come too soon after the last one, or while the
    /// current part's incoming transition is still running.
    fn check_take_allowed(&self, state: &RundownState, current: &Part, now: Time) -> Result<()> {
        let last = current.last_take().max(current.last_started_playback());
        if let Some(last) = last {
            let elapsed = now - last;
            if elapsed < self.config.min_take_span_ms as i64 {
                return Err(Error::TooSoon(format!(
                    "last take was {elapsed}ms ago (minimum {}ms)",
                    self.config.min_take_span_ms
                )));
            }
        }
        if let (Some(started), Some(transition)) =
            (current.last_started_playback(), current.transition_duration)
        {
            if allows_transition(state.previous_part(), state.rundown.hold_state)
                && now < started + transition
            {
                return Err(Error::TooSoon(format!(
                    "transition into {} still running",
                    current.id
                )));
            }
        }
        Ok(())
    }

    /// Reset `part_id` so it plays as new when taken.
    ///
    /// Clears playback history, drops pieces inserted during an earlier
    /// play, and regenerates the part if its source changed while on air.
    pub(super) fn prepare_next(&self, conn: &Connection, state: &mut RundownState, part_id: &PartId) -> Result<()> {
        let dirty = state.playlist.part(part_id).is_some_and(|p| p.dirty);
        if dirty {
            let studio_id = state.rundown.studio_id.clone();
            if let Some(part) = state.playlist.part(part_id).cloned() {
                self.generate_part(conn, &studio_id, &part)?;
            }
            state.pieces = onair_db::queries::pieces::list_pieces_for_rundown(conn, &state.rundown.id)?;
            debug!(part_id = %part_id, "Regenerated dirty part");
        }

        let stale: Vec<PieceId> = state
            .pieces
            .iter()
            .filter(|p| p.part_id == *part_id && p.dynamically_inserted)
            .map(|p| p.id.clone())
            .collect();
        for id in &stale {
            state.remove_piece(conn, id)?;
        }
        let played: Vec<Piece> = state
            .pieces
            .iter()
            .filter(|p| p.part_id == *part_id && p.started_playback.is_some())
            .cloned()
            .collect();
        for mut piece in played {
            piece.started_playback = None;
            piece.duration = None;
            state.save_piece(conn, piece)?;
        }
        state.save_part(conn, part_id, |part| {
            part.reset_playback();
            part.dirty = false;
        })
    }

    // -- Hold ----------------------------------------------------------------

    /// Arm a hold between the current part and the next.
    pub fn activate_hold(&self, rundown_id: &RundownId) -> Result<Rundown> {
        self.with_rundown(rundown_id, |conn, _events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            require_active(&state)?;
            if state.rundown.hold_state.is_in_progress() {
                return Err(Error::InvalidState("a hold is already in progress".into()));
            }
            let current = state
                .current_part()
                .ok_or_else(|| Error::InvalidState("no part is on air".into()))?;
            let next = state
                .next_part()
                .ok_or_else(|| Error::InvalidState("no next part".into()))?;
            if current.hold_mode != HoldMode::From || next.hold_mode != HoldMode::To {
                return Err(Error::InvalidState(format!(
                    "cannot hold from {} to {}",
                    current.id, next.id
                )));
            }

            state.rundown.hold_state = HoldState::Pending;
            state.save_rundown(conn)?;
            self.log_transition("Hold armed", &state.rundown);
            Ok(state.rundown)
        })
    }

    /// Copy the outgoing part's hold-extendable pieces into the incoming part.
    fn start_hold(
        &self,
        conn: &Connection,
        state: &mut RundownState,
        from: &PartId,
        to: &PartId,
    ) -> Result<()> {
        let sources: Vec<Piece> = state
            .pieces
            .iter()
            .filter(|p| p.part_id == *from && p.extend_on_hold && !p.disabled)
            .cloned()
            .collect();
        for mut source in sources {
            let mut copy = source.clone();
            copy.id = hold_copy_id(&source.id);
            copy.part_id = to.clone();
            copy.trigger = Trigger::Absolute(0);
            copy.infinite_id = Some(source.id.clone());
            copy.continues_ref_id = Some(source.id.clone());
            copy.dynamically_inserted = true;
            copy.started_playback = None;
            copy.duration = None;
            state.save_piece(conn, copy)?;

            if source.infinite_id.is_none() {
                source.infinite_id = Some(source.id.clone());
                state.save_piece(conn, source)?;
            }
        }
        Ok(())
    }

    /// End an active hold: drop the extension copies and their markers.
    fn complete_hold(&self, conn: &Connection, state: &mut RundownState) -> Result<()> {
        let copies: Vec<Piece> = state.pieces.iter().filter(|p| is_hold_copy(p)).cloned().collect();
        for copy in &copies {
            state.remove_piece(conn, &copy.id)?;
            let source = copy
                .infinite_id
                .as_ref()
                .and_then(|id| state.pieces.iter().find(|p| p.id == *id))
                .filter(|p| p.ends_infinite())
                .cloned();
            if let Some(mut source) = source {
                source.infinite_id = None;
                state.save_piece(conn, source)?;
            }
        }
        state.rundown.hold_state = HoldState::Complete;
        state.save_rundown(conn)?;
        let anchor = state.rundown.current_part_id.clone();
        state.update_infinites(conn, anchor.as_ref(), false)
    }

    // -- Next part -----------------------------------------------------------

    /// Point next at `part_id`, or clear it.
    pub fn set_next(&self, rundown_id: &RundownId, part_id: Option<&PartId>, manual: bool) -> Result<Rundown> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            self.set_next_in(conn, &mut state, part_id, manual, events)?;
            Ok(state.rundown)
        })
    }

    fn set_next_in(
        &self,
        conn: &Connection,
        state: &mut RundownState,
        part_id: Option<&PartId>,
        manual: bool,
        events: &mut Vec<EventPayload>,
    ) -> Result<()> {
        require_active(state)?;
        if state.rundown.hold_state.is_in_progress() {
            return Err(Error::InvalidState("cannot change next part during a hold".into()));
        }
        if let Some(id) = part_id {
            if state.playlist.part(id).is_none() {
                return Err(match parts::get_part(conn, id)? {
                    Some(other) => Error::Conflict(format!(
                        "part {id} belongs to rundown {}",
                        other.rundown_id
                    )),
                    None => Error::not_found("part", id),
                });
            }
            if state.rundown.current_part_id.as_ref() == Some(id) {
                return Err(Error::InvalidState(format!("part {id} is on air")));
            }
        }

        let rundown_id = state.rundown.id.clone();
        let old = state.rundown.next_part_id.clone();
        if let Some(id) = part_id {
            self.prepare_next(conn, state, id)?;
        }
        state.rundown.next_part_id = part_id.cloned();
        state.rundown.next_part_manual = manual && part_id.is_some();
        state.save_rundown(conn)?;

        let anchor = state
            .rundown
            .current_part_id
            .clone()
            .or_else(|| part_id.cloned());
        state.update_infinites(conn, anchor.as_ref(), false)?;
        self.compile_studio(conn, &state.rundown.studio_id, None, events)?;

        if let Some(old) = old.as_ref().filter(|old| Some(*old) != part_id) {
            events.push(story(&rundown_id, old, StoryStatus::Off));
        }
        if let Some(id) = part_id {
            events.push(story(&rundown_id, id, StoryStatus::Next));
        }
        events.push(EventPayload::NextPartChanged {
            rundown_id,
            part_id: part_id.cloned(),
        });
        self.log_transition("Next part set", &state.rundown);
        Ok(())
    }

    /// Move next by whole segments, then by parts.
    ///
    /// The walk starts at the current next part (or the current part when
    /// nothing is next). Landing on the part on air retries once from there.
    pub fn move_next(&self, rundown_id: &RundownId, part_delta: i32, segment_delta: i32) -> Result<Option<PartId>> {
        if part_delta == 0 && segment_delta == 0 {
            return Err(Error::Validation("move_next needs a non-zero delta".into()));
        }
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            require_active(&state)?;
            let current = state.rundown.current_part_id.clone();
            let anchor = state.rundown.next_part_id.clone().or_else(|| current.clone());

            let mut target = state
                .playlist
                .move_target(anchor.as_ref(), part_delta, segment_delta)
                .map(|p| p.id.clone());
            if target.is_some() && target == current {
                target = state
                    .playlist
                    .move_target(current.as_ref(), part_delta, segment_delta)
                    .map(|p| p.id.clone());
            }
            let target = target
                .filter(|t| Some(t) != current.as_ref())
                .ok_or_else(|| Error::InvalidState("no part to move next to".into()))?;

            self.set_next_in(conn, &mut state, Some(&target), true, events)?;
            Ok(Some(target))
        })
    }

    // -- Ad-libs -------------------------------------------------------------

    /// Insert an ad-lib into the part on air.
    ///
    /// The new piece starts now: at the current offset into the part when
    /// the part is already playing, otherwise on the `now` trigger.
    pub fn start_adlib(&self, rundown_id: &RundownId, adlib_id: &AdLibPieceId) -> Result<PieceId> {
        let now = self.clock.now();
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            require_active(&state)?;
            if state.rundown.hold_state == HoldState::Active {
                return Err(Error::InvalidState("cannot start an ad-lib during a hold".into()));
            }
            let current = state
                .current_part()
                .cloned()
                .ok_or_else(|| Error::InvalidState("no part is on air".into()))?;
            let adlib = adlibs::get_adlib(conn, adlib_id)?
                .ok_or_else(|| Error::not_found("adlib", adlib_id))?;
            if adlib.rundown_id != *rundown_id {
                return Err(Error::Conflict(format!(
                    "adlib {adlib_id} belongs to rundown {}",
                    adlib.rundown_id
                )));
            }

            let id = PieceId::from(hash_id(&format!("{}_{}_{now}", current.id, adlib.id)));
            let mut piece = Piece::new(id.clone(), rundown_id.clone(), current.id.clone(), adlib.source_layer_id.clone());
            piece.external_id = adlib.external_id.clone();
            piece.name = adlib.name.clone();
            piece.expected_duration = adlib.expected_duration;
            piece.infinite_mode = adlib.infinite_mode;
            piece.content = adlib.content.clone();
            piece.dynamically_inserted = true;
            piece.adlib_source_id = Some(adlib.id.clone());
            piece.trigger = match current.last_started_playback() {
                Some(started) => Trigger::Absolute((now - started).max(0)),
                None => Trigger::Now,
            };
            state.save_piece(conn, piece)?;

            state.update_infinites(conn, Some(&current.id), false)?;
            self.compile_studio(conn, &state.rundown.studio_id, None, events)?;
            info!(rundown_id = %rundown_id, adlib_id = %adlib_id, piece_id = %id, "Ad-lib started");
            Ok(id)
        })
    }
}

/// Close the open playback interval of `part` at `time`.
pub(super) fn stop_playback(part: &mut Part, time: Time) {
    if part.started_playback.len() > part.stopped_playback.len() {
        part.stopped_playback.push(time);
        if let Some(started) = part.last_started_playback() {
            part.duration = Some(time - started);
        }
    }
}
