//! Infinite-continuation tracking.
//!
//! Walks the ordered parts of a rundown and decides, per source layer, which
//! infinite piece is still running when each part plays. A running infinite
//! is materialized on every part it spans as a continuation copy with the
//! deterministic id `<infiniteId>_<partId>`. When a later part puts its own
//! piece on the layer the run ends there: no copy is made on that part or
//! after it, and every member of the run gets an `infinite_cap` expression
//! pointing at the superseding piece's group.
//!
//! [`compute_infinites`] is pure. It returns the pieces to write and the
//! continuation copies to delete; running it again on its own output yields
//! no changes.

use std::collections::{BTreeMap, HashMap, HashSet};

use onair_core::{Duration, InfiniteMode, Part, PartId, Piece, PieceId, SegmentId, Trigger};
use tracing::{debug, warn};

/// Writes produced by a tracker run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfiniteChanges {
    /// New or modified pieces (continuation copies and capped run members).
    pub upserts: Vec<Piece>,
    /// Continuation copies that no longer belong to any run.
    pub removals: Vec<PieceId>,
}

impl InfiniteChanges {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }
}

/// Id of the continuation copy of run `infinite_id` on `part_id`.
pub fn continuation_id(infinite_id: &PieceId, part_id: &PartId) -> PieceId {
    PieceId::from(format!("{infinite_id}_{part_id}"))
}

/// Cap expression ending a run where `superseder` starts.
pub fn supersede_cap(superseder: &PieceId) -> Duration {
    Duration::Expression(format!("#piece_group_{superseder}.start - #.start"))
}

/// A run that is live entering the current part.
struct ActiveRun {
    origin: PieceId,
    mode: InfiniteMode,
    segment: SegmentId,
    /// Instance on the most recently processed part.
    last_instance: PieceId,
    members: Vec<PieceId>,
}

/// Working copy of the rundown's pieces.
struct Working {
    pieces: Vec<Piece>,
    index: HashMap<PieceId, usize>,
}

impl Working {
    fn get(&self, id: &PieceId) -> Option<&Piece> {
        self.index.get(id).map(|&i| &self.pieces[i])
    }

    fn get_mut(&mut self, id: &PieceId) -> Option<&mut Piece> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.pieces[i]),
            None => None,
        }
    }

    fn insert(&mut self, piece: Piece) {
        match self.index.get(&piece.id) {
            Some(&i) => self.pieces[i] = piece,
            None => {
                self.index.insert(piece.id.clone(), self.pieces.len());
                self.pieces.push(piece);
            }
        }
    }
}

fn start_offset(piece: &Piece) -> i64 {
    piece.trigger_offset().unwrap_or(0)
}

/// Whether `piece` opens a run on its layer.
fn is_origin(piece: &Piece) -> bool {
    !piece.disabled && !piece.is_continuation() && !piece.ends_infinite()
}

fn cap_run(working: &mut Working, run: &ActiveRun, superseder: &PieceId) {
    let cap = supersede_cap(superseder);
    for member in &run.members {
        if let Some(piece) = working.get_mut(member) {
            piece.infinite_cap = Some(cap.clone());
        }
    }
    debug!(origin = %run.origin, superseded_by = %superseder, "Infinite run capped");
}

/// Recompute continuation copies and run caps.
///
/// `parts` must be in playout order and `pieces` must hold every piece of
/// the rundown. Copies on parts before `anchor` are left untouched, though
/// runs crossing the anchor are still followed from their origins. Unless
/// `run_to_end` is set the walk stops once nothing is running and nothing
/// further down could change.
pub fn compute_infinites(
    parts: &[Part],
    pieces: &[Piece],
    anchor: Option<&PartId>,
    run_to_end: bool,
) -> InfiniteChanges {
    let start_idx = anchor
        .and_then(|id| parts.iter().position(|p| p.id == *id))
        .unwrap_or(0);
    let part_pos: HashMap<&PartId, usize> =
        parts.iter().enumerate().map(|(i, p)| (&p.id, i)).collect();

    let original: HashMap<&PieceId, &Piece> = pieces.iter().map(|p| (&p.id, p)).collect();
    let mut by_part: HashMap<&PartId, Vec<&Piece>> = HashMap::new();
    for piece in pieces {
        by_part.entry(&piece.part_id).or_default().push(piece);
    }

    // Tracked copies from the anchor onward are regenerated from scratch.
    let regenerated = |p: &Piece| {
        p.is_tracked_continuation()
            && part_pos
                .get(&p.part_id)
                .map_or(true, |&i| i >= start_idx)
    };
    for piece in pieces.iter().filter(|p| regenerated(p)) {
        let origin_ok = piece
            .infinite_id
            .as_ref()
            .and_then(|id| original.get(id))
            .and_then(|o| part_pos.get(&o.part_id))
            .zip(part_pos.get(&piece.part_id))
            .is_some_and(|(o, c)| o <= c);
        if !origin_ok {
            warn!(piece_id = %piece.id, "Continuation has no reachable origin; dropping it");
        }
    }

    let mut working = Working {
        pieces: Vec::with_capacity(pieces.len()),
        index: HashMap::with_capacity(pieces.len()),
    };
    for piece in pieces.iter().filter(|p| !regenerated(p)) {
        let mut piece = piece.clone();
        piece.infinite_cap = None;
        if is_origin(&piece) {
            piece.infinite_id = Some(piece.id.clone());
        } else if piece.infinite_id.as_ref() == Some(&piece.id) && !piece.extend_on_hold {
            // Hold sources keep their marker until the hold completes.
            piece.infinite_id = None;
        }
        working.insert(piece);
    }

    // Parts after this index hold no further origins.
    let last_origin_idx = parts.iter().rposition(|part| {
        by_part
            .get(&part.id)
            .is_some_and(|ps| ps.iter().any(|p| is_origin(p)))
    });

    let mut active: BTreeMap<String, ActiveRun> = BTreeMap::new();

    for (idx, part) in parts.iter().enumerate() {
        let emit = idx >= start_idx;

        active.retain(|layer, run| {
            let keep = run.mode != InfiniteMode::OutOnNextSegment || run.segment == part.segment_id;
            if !keep {
                debug!(layer = %layer, origin = %run.origin, "Infinite ends at segment boundary");
            }
            keep
        });

        let mut own: Vec<&Piece> = by_part
            .get(&part.id)
            .map(|ps| {
                ps.iter()
                    .copied()
                    .filter(|p| !p.is_tracked_continuation() && !p.disabled)
                    .collect()
            })
            .unwrap_or_default();
        own.sort_by_key(|p| start_offset(p));

        // Runs entering this part: superseded or continued.
        let entering: Vec<String> = active.keys().cloned().collect();
        for layer in entering {
            let Some(run) = active.get(&layer) else { continue };
            let superseder = own
                .iter()
                .find(|p| p.source_layer_id == layer && p.infinite_id.as_ref() != Some(&run.origin));
            if let Some(superseder) = superseder {
                let superseder = superseder.id.clone();
                if let Some(run) = active.remove(&layer) {
                    cap_run(&mut working, &run, &superseder);
                }
                continue;
            }

            let existing_extension = own
                .iter()
                .find(|p| p.source_layer_id == layer && p.infinite_id.as_ref() == Some(&run.origin))
                .map(|p| p.id.clone());
            let instance_id = match existing_extension {
                Some(id) => id,
                None => {
                    let copy_id = continuation_id(&run.origin, &part.id);
                    if emit {
                        if let Some(origin) = working.get(&run.origin) {
                            let copy = make_copy(origin, &copy_id, part, &run.last_instance, original.get(&copy_id).copied());
                            working.insert(copy);
                        }
                    }
                    copy_id
                }
            };
            if let Some(run) = active.get_mut(&layer) {
                run.last_instance = instance_id.clone();
                run.members.push(instance_id);
            }
        }

        // Pieces of this part, in start order, open or close runs.
        for piece in &own {
            if let Some(run) = active.get(&piece.source_layer_id) {
                let member = piece.infinite_id.as_ref() == Some(&run.origin);
                let from_this_part = working
                    .get(&run.origin)
                    .is_some_and(|o| o.part_id == part.id);
                if !member && from_this_part {
                    if let Some(run) = active.remove(&piece.source_layer_id) {
                        cap_run(&mut working, &run, &piece.id);
                    }
                }
            }
            if is_origin(piece) {
                active.insert(
                    piece.source_layer_id.clone(),
                    ActiveRun {
                        origin: piece.id.clone(),
                        mode: piece.infinite_mode,
                        segment: part.segment_id.clone(),
                        last_instance: piece.id.clone(),
                        members: vec![piece.id.clone()],
                    },
                );
            }
        }

        if !run_to_end
            && emit
            && active.is_empty()
            && last_origin_idx.map_or(true, |i| i <= idx)
        {
            debug!(part_id = %part.id, "Infinite tracking settled early");
            break;
        }
    }

    diff(pieces, &working, |p| regenerated(p))
}

fn make_copy(
    origin: &Piece,
    copy_id: &PieceId,
    part: &Part,
    previous: &PieceId,
    existing: Option<&Piece>,
) -> Piece {
    let mut copy = origin.clone();
    copy.id = copy_id.clone();
    copy.part_id = part.id.clone();
    copy.external_id = origin.external_id.clone();
    copy.trigger = Trigger::Absolute(0);
    copy.infinite_id = Some(origin.id.clone());
    copy.continues_ref_id = Some(previous.clone());
    copy.infinite_cap = None;
    copy.dynamically_inserted = false;
    copy.started_playback = existing.and_then(|e| e.started_playback);
    copy.duration = existing.and_then(|e| e.duration);
    copy.duration_override = existing.and_then(|e| e.duration_override.clone());
    copy
}

fn diff<F>(original: &[Piece], working: &Working, regenerated: F) -> InfiniteChanges
where
    F: Fn(&Piece) -> bool,
{
    let before: HashMap<&PieceId, &Piece> = original.iter().map(|p| (&p.id, p)).collect();
    let upserts: Vec<Piece> = working
        .pieces
        .iter()
        .filter(|p| before.get(&p.id).map_or(true, |old| *old != *p))
        .cloned()
        .collect();
    let kept: HashSet<&PieceId> = working.pieces.iter().map(|p| &p.id).collect();
    let removals = original
        .iter()
        .filter(|p| regenerated(p) && !kept.contains(&p.id))
        .map(|p| p.id.clone())
        .collect();
    InfiniteChanges { upserts, removals }
}
