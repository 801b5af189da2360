//! Playout service: the state machine and everything it drives.
//!
//! [`PlayoutService`] owns the database pool and the process-scoped
//! registries (blueprints, per-rundown and per-studio locks, the recompute
//! debouncer). Every transition runs under the rundown's lock inside one
//! SQLite transaction, recompiles the studio timeline under the studio's
//! lock in that same transaction, and only then sends notifications.

mod callbacks;
mod ingest;
mod playout;

pub use ingest::part_id_for;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration as StdDuration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use onair_core::config::PlayoutConfig;
use onair_core::events::{EventPayload, StoryStatus};
use onair_core::{
    AdLibPiece, Clock, Error, HoldState, Part, PartId, Piece, PieceId, Result, Rundown, RundownId, StudioId, Time,
    TimelineObject, Trigger,
};
use onair_db::queries::{adlibs, baseline, parts, pieces, rundowns, segments, studios, timeline as timeline_q};
use onair_db::{get_conn, DbPool};
use onair_resolver::{layer_state_at, resolve, snap_now, ResolveOptions};

use crate::blueprint::{validate_part_output, BlueprintRegistry};
use crate::context::BlueprintContext;
use crate::debounce::Debouncer;
use crate::infinites::compute_infinites;
use crate::locks::LockRegistry;
use crate::notify::{self, Notifier};
use crate::ordering::Playlist;
use crate::store::{save_timeline, TimelineDiff};
use crate::timeline::{compile_timeline, objects_by_device, CompileInput, CompileOptions};

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

// ---------------------------------------------------------------------------
// RundownState
// ---------------------------------------------------------------------------

/// A rundown with its ordered parts and all of its pieces, read fresh at
/// the start of a transition.
pub(crate) struct RundownState {
    pub rundown: Rundown,
    pub playlist: Playlist,
    pub pieces: Vec<Piece>,
}

impl RundownState {
    pub fn load(conn: &Connection, rundown_id: &RundownId) -> Result<Self> {
        let rundown = rundowns::get_rundown(conn, rundown_id)?
            .ok_or_else(|| Error::not_found("rundown", rundown_id))?;
        let playlist = Playlist::new(
            segments::list_segments(conn, rundown_id)?,
            parts::list_parts(conn, rundown_id)?,
        );
        let pieces = pieces::list_pieces_for_rundown(conn, rundown_id)?;
        Ok(Self {
            rundown,
            playlist,
            pieces,
        })
    }

    pub fn current_part(&self) -> Option<&Part> {
        self.playlist.part(self.rundown.current_part_id.as_ref()?)
    }

    pub fn next_part(&self) -> Option<&Part> {
        self.playlist.part(self.rundown.next_part_id.as_ref()?)
    }

    pub fn previous_part(&self) -> Option<&Part> {
        self.playlist.part(self.rundown.previous_part_id.as_ref()?)
    }

    /// Update `part` in memory and in the store.
    pub fn save_part(&mut self, conn: &Connection, part_id: &PartId, f: impl FnOnce(&mut Part)) -> Result<()> {
        let part = self
            .playlist
            .part_mut(part_id)
            .ok_or_else(|| Error::not_found("part", part_id))?;
        f(part);
        parts::upsert_part(conn, part)
    }

    pub fn save_piece(&mut self, conn: &Connection, piece: Piece) -> Result<()> {
        pieces::upsert_piece(conn, &piece)?;
        match self.pieces.iter_mut().find(|p| p.id == piece.id) {
            Some(existing) => *existing = piece,
            None => self.pieces.push(piece),
        }
        Ok(())
    }

    pub fn remove_piece(&mut self, conn: &Connection, piece_id: &PieceId) -> Result<()> {
        pieces::delete_piece(conn, piece_id)?;
        self.pieces.retain(|p| p.id != *piece_id);
        Ok(())
    }

    pub fn save_rundown(&self, conn: &Connection) -> Result<()> {
        rundowns::upsert_rundown(conn, &self.rundown)
    }

    /// Replace `now` starts on the current part's pieces with their offset
    /// from the part's reported start, so later compiles keep the same
    /// start instead of snapping again.
    pub fn pin_now_starts(&mut self, conn: &Connection, epoch: Time) -> Result<usize> {
        let Some(part) = self.current_part() else {
            return Ok(0);
        };
        let Some(part_start) = part.last_started_playback() else {
            return Ok(0);
        };
        let part_id = part.id.clone();
        let offset = (epoch - part_start).max(0);

        let pinned: Vec<Piece> = self
            .pieces
            .iter()
            .filter(|p| p.part_id == part_id && p.trigger == Trigger::Now)
            .map(|p| {
                let mut piece = p.clone();
                piece.trigger = Trigger::Absolute(offset);
                piece
            })
            .collect();
        let count = pinned.len();
        for piece in pinned {
            debug!(piece_id = %piece.id, offset, "Pinned now start");
            self.save_piece(conn, piece)?;
        }
        Ok(count)
    }

    /// Re-run the continuation tracker from `anchor` and store its output.
    pub fn update_infinites(
        &mut self,
        conn: &Connection,
        anchor: Option<&PartId>,
        run_to_end: bool,
    ) -> Result<()> {
        let changes = compute_infinites(&self.playlist.parts, &self.pieces, anchor, run_to_end);
        if changes.is_empty() {
            return Ok(());
        }
        debug!(
            rundown_id = %self.rundown.id,
            upserts = changes.upserts.len(),
            removals = changes.removals.len(),
            "Infinite continuations updated"
        );
        for id in &changes.removals {
            self.remove_piece(conn, id)?;
        }
        for piece in changes.upserts {
            self.save_piece(conn, piece)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PlayoutService
// ---------------------------------------------------------------------------

/// Process-scoped playout controller.
pub struct PlayoutService {
    pool: DbPool,
    config: PlayoutConfig,
    clock: Arc<dyn Clock>,
    blueprints: BlueprintRegistry,
    notifier: Arc<dyn Notifier>,
    rundown_locks: LockRegistry,
    studio_locks: LockRegistry,
    debouncer: Debouncer,
    this: Weak<PlayoutService>,
}

impl PlayoutService {
    pub fn new(
        pool: DbPool,
        config: PlayoutConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Self::with_blueprints(pool, config, clock, notifier, BlueprintRegistry::default())
    }

    pub fn with_blueprints(
        pool: DbPool,
        config: PlayoutConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        blueprints: BlueprintRegistry,
    ) -> Arc<Self> {
        let debouncer = Debouncer::new(StdDuration::from_millis(config.recompute_debounce_ms));
        Arc::new_cyclic(|this| Self {
            pool,
            config,
            clock,
            blueprints,
            notifier,
            rundown_locks: LockRegistry::new(),
            studio_locks: LockRegistry::new(),
            debouncer,
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &PlayoutConfig {
        &self.config
    }

    pub fn blueprints(&self) -> &BlueprintRegistry {
        &self.blueprints
    }

    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Run `f` in one immediate transaction.
    ///
    /// Notifications collected by `f` go out only after the commit.
    fn transaction<T>(
        &self,
        f: impl FnOnce(&Connection, &mut Vec<EventPayload>) -> Result<T>,
    ) -> Result<T> {
        let conn = get_conn(&self.pool)?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate).map_err(db_err)?;
        let mut events = Vec::new();
        let value = f(&tx, &mut events)?;
        tx.commit().map_err(db_err)?;
        notify::deliver(self.notifier.as_ref(), events);
        Ok(value)
    }

    /// Run `f` in a transaction while holding the rundown's lock.
    fn with_rundown<T>(
        &self,
        rundown_id: &RundownId,
        f: impl FnOnce(&Connection, &mut Vec<EventPayload>) -> Result<T>,
    ) -> Result<T> {
        self.rundown_locks
            .with_lock(rundown_id.as_str(), || self.transaction(f))
    }

    // -- Timeline ------------------------------------------------------------

    /// Compile and store the studio timeline inside the caller's transaction.
    fn compile_studio(
        &self,
        conn: &Connection,
        studio_id: &StudioId,
        snap: Option<Time>,
        events: &mut Vec<EventPayload>,
    ) -> Result<TimelineDiff> {
        self.studio_locks.with_lock(studio_id.as_str(), || {
            let studio = studios::get_studio(conn, studio_id)?.ok_or_else(|| {
                Error::Configuration(format!("studio {studio_id} not found"))
            })?;

            let active = rundowns::get_active_rundown(conn, studio_id)?;
            let mut objects = match &active {
                None => Vec::new(),
                Some(rundown) => {
                    let state = RundownState::load(conn, &rundown.id)?;
                    let baseline = baseline::list_baseline(conn, &rundown.id)?;
                    let input = CompileInput {
                        studio: &studio,
                        rundown: Some(&state.rundown),
                        playlist: &state.playlist,
                        pieces: &state.pieces,
                        baseline: &baseline,
                    };
                    compile_timeline(&input, &CompileOptions::from(&self.config))?
                }
            };
            if let Some(epoch) = snap {
                let snapped = snap_now(&mut objects, epoch);
                debug!(studio_id = %studio_id, snapped, "Snapped now triggers");
            }

            let diff = save_timeline(conn, studio_id, &objects, self.clock.now())?;
            if !diff.is_noop() {
                debug!(studio_id = %studio_id, devices = ?objects_by_device(&objects), "Timeline changed");
                events.push(EventPayload::TimelineUpdated {
                    studio_id: studio_id.clone(),
                    inserted: diff.inserted,
                    updated: diff.updated,
                    removed: diff.removed,
                });
            }
            Ok(diff)
        })
    }

    /// Recompile and store the studio timeline.
    pub fn update_timeline(&self, studio_id: &StudioId) -> Result<TimelineDiff> {
        self.transaction(|conn, events| self.compile_studio(conn, studio_id, None, events))
    }

    /// The stored timeline of a studio.
    pub fn timeline(&self, studio_id: &StudioId) -> Result<Vec<TimelineObject>> {
        let conn = get_conn(&self.pool)?;
        timeline_q::list_timeline(&conn, studio_id)
    }

    /// Winning object per layer of the stored timeline at `time`.
    pub fn state_at(&self, studio_id: &StudioId, time: Time) -> Result<BTreeMap<String, TimelineObject>> {
        let objects = self.timeline(studio_id)?;
        let resolution = resolve(&objects, &ResolveOptions { now: self.clock.now() });
        Ok(layer_state_at(&resolution, time)
            .into_iter()
            .map(|(layer, r)| (layer, r.object.clone()))
            .collect())
    }

    // -- Reads ---------------------------------------------------------------

    pub fn rundown(&self, rundown_id: &RundownId) -> Result<Rundown> {
        let conn = get_conn(&self.pool)?;
        rundowns::get_rundown(&conn, rundown_id)?.ok_or_else(|| Error::not_found("rundown", rundown_id))
    }

    pub fn parts(&self, rundown_id: &RundownId) -> Result<Vec<Part>> {
        let conn = get_conn(&self.pool)?;
        let playlist = Playlist::new(
            segments::list_segments(&conn, rundown_id)?,
            parts::list_parts(&conn, rundown_id)?,
        );
        Ok(playlist.parts)
    }

    pub fn pieces(&self, rundown_id: &RundownId) -> Result<Vec<Piece>> {
        let conn = get_conn(&self.pool)?;
        pieces::list_pieces_for_rundown(&conn, rundown_id)
    }

    pub fn adlibs(&self, rundown_id: &RundownId) -> Result<Vec<AdLibPiece>> {
        let conn = get_conn(&self.pool)?;
        adlibs::list_adlibs_for_rundown(&conn, rundown_id)
    }

    /// The active rundown of a studio, if any.
    pub fn active_rundown(&self, studio_id: &StudioId) -> Result<Option<Rundown>> {
        let conn = get_conn(&self.pool)?;
        rundowns::get_active_rundown(&conn, studio_id)
    }

    // -- Blueprint -----------------------------------------------------------

    /// Run the blueprint for `part` and replace its generated content.
    ///
    /// Pieces inserted during playout and continuation copies are kept.
    fn generate_part(&self, conn: &Connection, studio_id: &StudioId, part: &Part) -> Result<()> {
        let blueprint = self.blueprints.get(studio_id);
        let mut ctx = BlueprintContext::part(studio_id.clone(), part.rundown_id.clone(), part.id.clone());
        let output = blueprint.get_part(&mut ctx, part)?;
        validate_part_output(part, &output)?;

        for piece in pieces::list_pieces_for_part(conn, &part.id)? {
            if !piece.dynamically_inserted && !piece.is_tracked_continuation() {
                pieces::delete_piece(conn, &piece.id)?;
            }
        }
        for piece in &output.pieces {
            pieces::upsert_piece(conn, piece)?;
        }
        adlibs::delete_adlibs_for_part(conn, &part.id)?;
        for adlib in &output.adlib_pieces {
            adlibs::upsert_adlib(conn, adlib)?;
        }

        let notes = ctx.into_notes();
        if !notes.is_empty() {
            warn!(part_id = %part.id, notes = notes.len(), "Blueprint left notes");
        }
        debug!(
            part_id = %part.id,
            blueprint = blueprint.name(),
            pieces = output.pieces.len(),
            adlibs = output.adlib_pieces.len(),
            "Part generated"
        );
        Ok(())
    }

    // -- Recompute -----------------------------------------------------------

    /// Full recompute of a rundown: continuation tracking from the top,
    /// then the studio timeline when the rundown is active.
    pub fn recompute(&self, rundown_id: &RundownId) -> Result<()> {
        self.with_rundown(rundown_id, |conn, events| {
            let mut state = RundownState::load(conn, rundown_id)?;
            if state.rundown.active {
                self.follow_order(conn, &mut state, events)?;
            }
            state.update_infinites(conn, None, true)?;
            if state.rundown.active {
                self.compile_studio(conn, &state.rundown.studio_id, None, events)?;
            }
            Ok(())
        })
    }

    /// Re-point an automatically chosen next part after the part order
    /// changed. Manual picks and holds are left alone.
    fn follow_order(&self, conn: &Connection, state: &mut RundownState, events: &mut Vec<EventPayload>) -> Result<()> {
        if state.rundown.next_part_manual || state.rundown.hold_state != HoldState::None {
            return Ok(());
        }
        let expected = match &state.rundown.current_part_id {
            Some(current) => state.playlist.after(current),
            None => state.playlist.first(),
        }
        .map(|p| p.id.clone());
        if expected == state.rundown.next_part_id {
            return Ok(());
        }

        if let Some(id) = &expected {
            self.prepare_next(conn, state, id)?;
        }
        if let Some(old) = &state.rundown.next_part_id {
            if state.playlist.part(old).is_some() {
                events.push(playout::story(&state.rundown.id, old, StoryStatus::Off));
            }
        }
        if let Some(id) = &expected {
            events.push(playout::story(&state.rundown.id, id, StoryStatus::Next));
        }
        events.push(EventPayload::NextPartChanged {
            rundown_id: state.rundown.id.clone(),
            part_id: expected.clone(),
        });
        state.rundown.next_part_id = expected;
        state.save_rundown(conn)?;
        self.log_transition("Next follows part order", &state.rundown);
        Ok(())
    }

    /// Coalesce recompute requests for a rundown.
    fn schedule_recompute(&self, rundown_id: &RundownId) {
        let this = self.this.clone();
        let id = rundown_id.clone();
        self.debouncer.schedule(rundown_id.as_str(), move || {
            let Some(service) = this.upgrade() else {
                return;
            };
            if let Err(e) = service.recompute(&id) {
                warn!(rundown_id = %id, "Debounced recompute failed: {}", e);
            }
        });
    }

    /// Recompute jobs waiting on the debouncer.
    pub fn pending_recomputes(&self) -> usize {
        self.debouncer.pending()
    }

    fn log_transition(&self, what: &str, rundown: &Rundown) {
        info!(
            rundown_id = %rundown.id,
            current = ?rundown.current_part_id,
            next = ?rundown.next_part_id,
            hold = ?rundown.hold_state,
            "{}",
            what
        );
    }
}
