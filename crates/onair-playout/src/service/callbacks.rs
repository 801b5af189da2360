//! Playback reports from the device gateway.
//!
//! The gateway fires these when the abstract first-objects of part and
//! piece groups start or stop. Reports for parts the rundown no longer
//! points at are logged and ignored.

use tracing::{debug, warn};

use onair_core::events::{EventPayload, StoryStatus};
use onair_core::{PartId, PieceId, Result, RundownId, Time};

use super::playout::{stop_playback, story};
use super::{PlayoutService, RundownState};

impl PlayoutService {
    /// A part's group started playing.
    ///
    /// When the gateway starts the next part on its own (autonext), the
    /// pointers shift exactly as for a take, at the reported time. A start
    /// of the next part is only honoured while the current part autonexts
    /// and no hold is underway. `now` piece starts of the part are pinned
    /// to the reported time.
    pub fn on_part_playback_started(&self, rundown_id: &RundownId, part_id: &PartId, time: Time) -> Result<()> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            if !state.rundown.active {
                debug!(rundown_id = %rundown_id, part_id = %part_id, "Playback report for inactive rundown");
                return Ok(());
            }

            let is_current = state.rundown.current_part_id.as_ref() == Some(part_id);
            let is_next = state.rundown.next_part_id.as_ref() == Some(part_id);
            if is_current {
                if state.current_part().and_then(|p| p.last_started_playback()) == Some(time) {
                    return Ok(());
                }
                state.save_part(conn, part_id, |part| part.started_playback.push(time))?;
            } else if is_next {
                let autonexting = state.current_part().is_some_and(|p| p.auto_next);
                if !autonexting || state.rundown.hold_state.is_in_progress() {
                    warn!(
                        rundown_id = %rundown_id,
                        part_id = %part_id,
                        hold_state = ?state.rundown.hold_state,
                        "Playback started for next part while current part does not autonext"
                    );
                    return Ok(());
                }
                let outgoing = state.rundown.current_part_id.clone();
                state.save_part(conn, part_id, |part| {
                    part.take_times.push(time);
                    part.started_playback.push(time);
                })?;
                let next = state.playlist.after(part_id).map(|p| p.id.clone());
                if let Some(next) = &next {
                    self.prepare_next(conn, &mut state, next)?;
                }
                state.rundown.previous_part_id = outgoing.clone();
                state.rundown.current_part_id = Some(part_id.clone());
                state.rundown.next_part_id = next.clone();
                state.rundown.next_part_manual = false;

                let anchor = outgoing.clone().unwrap_or_else(|| part_id.clone());
                state.update_infinites(conn, Some(&anchor), false)?;

                events.push(EventPayload::PartTaken {
                    rundown_id: rundown_id.clone(),
                    part_id: part_id.clone(),
                    previous_part_id: outgoing.clone(),
                });
                if let Some(outgoing) = &outgoing {
                    events.push(story(rundown_id, outgoing, StoryStatus::Off));
                }
                events.push(story(rundown_id, part_id, StoryStatus::OnAir));
                if let Some(next) = &next {
                    events.push(story(rundown_id, next, StoryStatus::Next));
                }
                events.push(EventPayload::NextPartChanged {
                    rundown_id: rundown_id.clone(),
                    part_id: next,
                });
                self.log_transition("Autonext", &state.rundown);
            } else {
                warn!(rundown_id = %rundown_id, part_id = %part_id, "Playback started for a part that is neither current nor next");
                return Ok(());
            }

            if state.rundown.started_playback.is_none() {
                state.rundown.started_playback = Some(time);
            }
            state.save_rundown(conn)?;
            state.pin_now_starts(conn, time)?;
            self.compile_studio(conn, &state.rundown.studio_id, Some(time), events)?;
            Ok(())
        })
    }

    /// A part's group stopped playing.
    pub fn on_part_playback_stopped(&self, rundown_id: &RundownId, part_id: &PartId, time: Time) -> Result<()> {
        self.with_rundown(rundown_id, |conn, _events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            if state.playlist.part(part_id).is_none() {
                warn!(rundown_id = %rundown_id, part_id = %part_id, "Playback stopped for unknown part");
                return Ok(());
            }
            state.save_part(conn, part_id, |part| stop_playback(part, time))
        })
    }

    /// A piece's group started playing.
    ///
    /// Infinite runs anchor on their origin's reported start, so the
    /// timeline is recompiled.
    pub fn on_piece_playback_started(&self, rundown_id: &RundownId, piece_id: &PieceId, time: Time) -> Result<()> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            let Some(mut piece) = state.pieces.iter().find(|p| p.id == *piece_id).cloned() else {
                warn!(rundown_id = %rundown_id, piece_id = %piece_id, "Playback started for unknown piece");
                return Ok(());
            };
            if piece.started_playback == Some(time) {
                return Ok(());
            }
            piece.started_playback = Some(time);
            piece.duration = None;
            state.save_piece(conn, piece)?;
            if state.rundown.active {
                self.compile_studio(conn, &state.rundown.studio_id, None, events)?;
            }
            Ok(())
        })
    }

    /// A piece's group stopped playing.
    pub fn on_piece_playback_stopped(&self, rundown_id: &RundownId, piece_id: &PieceId, time: Time) -> Result<()> {
        self.with_rundown(rundown_id, |conn, _events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            let Some(mut piece) = state.pieces.iter().find(|p| p.id == *piece_id).cloned() else {
                warn!(rundown_id = %rundown_id, piece_id = %piece_id, "Playback stopped for unknown piece");
                return Ok(());
            };
            if let Some(started) = piece.started_playback {
                piece.duration = Some(time - started);
                state.save_piece(conn, piece)?;
            }
            Ok(())
        })
    }
}
