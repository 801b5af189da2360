//! Lookahead planning.
//!
//! For every mapped layer with a lookahead mode, find the device objects
//! that will next occupy the layer and emit low-priority copies so the
//! device can load them early.

use std::collections::HashSet;

use tracing::debug;

use onair_core::{Duration, LookaheadMode, Part, Piece, TimelineObject, Trigger};
use onair_resolver::{resolve, ResolveOptions};

use crate::timeline::{
    allows_transition, piece_group_id, piece_key, CompileInput, CompileOptions,
    LOOKAHEAD_PRIORITY,
};

/// Class added to every lookahead object.
pub const LOOKAHEAD_CLASS: &str = "lookahead";

/// Layer that preloaded objects for `layer` are placed on.
pub fn preload_layer(layer: &str) -> String {
    format!("{layer}_lookahead")
}

/// A part visited while searching forward.
struct Scan<'a> {
    part: &'a Part,
    preceding: Option<&'a Part>,
    is_current: bool,
    /// The part's live objects are on the compiled timeline.
    on_timeline: bool,
}

fn is_candidate(piece: &Piece, layer: &str) -> bool {
    !piece.disabled && !piece.is_continuation() && piece.touches_layer(layer)
}

/// Pieces of the current part that have yet to start.
fn is_pending(piece: &Piece) -> bool {
    piece.started_playback.is_none()
        && match piece.trigger {
            Trigger::Absolute(offset) => offset > 0,
            Trigger::Relative(_) | Trigger::Logical(_) => true,
            Trigger::Now => false,
        }
}

fn scan_order<'a>(input: &CompileInput<'a>, limit: usize) -> Vec<Scan<'a>> {
    let mut scans = Vec::new();
    let current = input.current_part();
    let next = input.next_part();

    if let Some(current) = current {
        scans.push(Scan {
            part: current,
            preceding: input.previous_part(),
            is_current: true,
            on_timeline: true,
        });
    }
    if let Some(next) = next {
        let preceding = current.or_else(|| input.playlist.before(&next.id));
        scans.push(Scan {
            part: next,
            preceding,
            is_current: false,
            on_timeline: current.is_some_and(|c| c.auto_next && c.expected_duration.is_some()),
        });
        let mut prev = next;
        while let Some(after) = input.playlist.after(&prev.id) {
            if scans.len() >= limit {
                break;
            }
            scans.push(Scan {
                part: after,
                preceding: Some(prev),
                is_current: false,
                on_timeline: false,
            });
            prev = after;
        }
    }
    scans.truncate(limit);
    scans
}

/// Candidate pieces in play order, filtered for transitions.
fn ordered_pieces<'a>(pieces: Vec<&'a Piece>, layer: &str, allow_transition: bool) -> Vec<&'a Piece> {
    if pieces.len() <= 1 {
        return pieces;
    }

    let mut objects = vec![TimelineObject::group("part", Trigger::Absolute(0), None)];
    for piece in &pieces {
        let trigger = match &piece.trigger {
            Trigger::Now => Trigger::Absolute(0),
            other => other.clone(),
        };
        let mut obj = TimelineObject::group(piece_group_id(piece_key(piece)), trigger, None)
            .in_group("part");
        obj.is_transition = piece.is_transition;
        objects.push(obj);
    }
    let resolution = resolve(&objects, &ResolveOptions { now: 0 });

    let mut ordered: Vec<&Piece> = resolution
        .resolved
        .iter()
        .filter_map(|r| {
            pieces
                .iter()
                .copied()
                .find(|p| piece_group_id(piece_key(p)) == r.object.id)
        })
        .collect();
    for piece in &pieces {
        if !ordered.iter().any(|p| p.id == piece.id) {
            ordered.push(*piece);
        }
    }

    let has_transition = allow_transition
        && ordered.iter().any(|p| p.is_transition && p.touches_layer(layer));
    ordered
        .into_iter()
        .filter(|p| {
            if p.is_transition {
                return allow_transition;
            }
            // With a transition covering the layer the primary object at
            // zero loads through the transition instead.
            !(has_transition && p.trigger == Trigger::Absolute(0))
        })
        .collect()
}

fn layer_objects<'a>(pieces: &[&'a Piece], layer: &str) -> Vec<&'a TimelineObject> {
    pieces
        .iter()
        .flat_map(|p| p.content.timeline_objects.iter())
        .filter(|o| o.layer == layer)
        .collect()
}

fn emit(
    layer: &str,
    mode: LookaheadMode,
    objects: &[&TimelineObject],
    on_timeline: bool,
    out: &mut Vec<TimelineObject>,
) {
    let mut previous_id: Option<String> = None;
    for (i, source) in objects.iter().enumerate() {
        let id = format!("lookahead_{i}_{}", source.id);
        let mut obj = (*source).clone();
        obj.id = id.clone();
        obj.trigger = match &previous_id {
            None => Trigger::Absolute(0),
            Some(prev) => Trigger::Relative(format!("#{prev}.start + 0")),
        };
        obj.duration = on_timeline.then(|| Duration::Expression(format!("#{}.start - #.start", source.id)));
        obj.in_group = None;
        obj.priority = LOOKAHEAD_PRIORITY;
        obj.is_lookahead = true;
        obj.is_override = false;
        obj.was_now = false;
        if !obj.classes.iter().any(|c| c == LOOKAHEAD_CLASS) {
            obj.classes.push(LOOKAHEAD_CLASS.to_string());
        }
        if mode == LookaheadMode::Preload {
            obj.layer = preload_layer(layer);
            obj.lookahead_for_layer = Some(layer.to_string());
        }
        out.push(obj);
        previous_id = Some(id);
    }
}

fn plan_layer(
    input: &CompileInput<'_>,
    scans: &[Scan<'_>],
    layer: &str,
    mode: LookaheadMode,
    out: &mut Vec<TimelineObject>,
) {
    let hold = input.rundown.map(|r| r.hold_state).unwrap_or_default();

    if mode == LookaheadMode::Retain {
        let all: Vec<&Piece> = input
            .pieces
            .iter()
            .filter(|p| is_candidate(p, layer))
            .collect();
        if let [only] = all.as_slice() {
            let on_timeline = scans
                .iter()
                .find(|s| s.part.id == only.part_id)
                .is_some_and(|s| s.on_timeline && !(s.is_current && !is_pending(only)));
            emit(layer, mode, &layer_objects(&[*only], layer), on_timeline, out);
            return;
        }
    }

    for scan in scans {
        let candidates: Vec<&Piece> = input
            .pieces_of(&scan.part.id)
            .into_iter()
            .filter(|p| is_candidate(p, layer))
            .filter(|p| !scan.is_current || is_pending(p))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        let allow = allows_transition(scan.preceding, hold);
        let ordered = ordered_pieces(candidates, layer, allow);
        let objects = layer_objects(&ordered, layer);
        if objects.is_empty() {
            continue;
        }
        debug!(layer, part_id = %scan.part.id, count = objects.len(), "Lookahead found");
        emit(layer, mode, &objects, scan.on_timeline, out);
        return;
    }

    if mode == LookaheadMode::Retain {
        retain_previous(input, layer, mode, out);
    }
}

/// Most recent occupant earlier in the current segment.
fn retain_previous(
    input: &CompileInput<'_>,
    layer: &str,
    mode: LookaheadMode,
    out: &mut Vec<TimelineObject>,
) {
    let Some(current) = input.current_part() else {
        return;
    };
    let mut part = Some(current);
    let mut visited = HashSet::new();
    while let Some(p) = part.filter(|p| p.segment_id == current.segment_id) {
        if !visited.insert(&p.id) {
            break;
        }
        let candidates: Vec<&Piece> = input
            .pieces_of(&p.id)
            .into_iter()
            .filter(|piece| is_candidate(piece, layer))
            .collect();
        let ordered = ordered_pieces(candidates, layer, true);
        if let Some(last) = ordered.last() {
            let objects = layer_objects(&[*last], layer);
            if !objects.is_empty() {
                debug!(layer, part_id = %p.id, "Lookahead retained from earlier part");
                emit(layer, mode, &objects, false, out);
                return;
            }
        }
        part = input.playlist.before(&p.id);
    }
}

/// Lookahead objects for every mapping that asks for them.
pub fn plan_lookahead(input: &CompileInput<'_>, options: &CompileOptions) -> Vec<TimelineObject> {
    let mut out = Vec::new();
    if !input.rundown.is_some_and(|r| r.active) || options.max_lookahead_parts == 0 {
        return out;
    }
    let scans = scan_order(input, options.max_lookahead_parts);
    for (layer, mapping) in &input.studio.mappings {
        if mapping.lookahead == LookaheadMode::None {
            continue;
        }
        plan_layer(input, &scans, layer, mapping.lookahead, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::Playlist;
    use onair_core::{Mapping, PartId, Rundown, Segment, Studio};

    fn studio(mode: LookaheadMode) -> Studio {
        Studio::new("st1", "Studio 1").with_mapping("vt", Mapping::new("caspar").with_lookahead(mode))
    }

    fn clip(id: &str, part: &str, offset: i64) -> Piece {
        let mut piece = Piece::new(id, "ro1", part, "vt")
            .with_object(TimelineObject::new(format!("{id}_obj"), "vt", Trigger::Absolute(0)));
        piece.trigger = Trigger::Absolute(offset);
        piece
    }

    fn parts(n: usize) -> Playlist {
        let parts = (1..=n)
            .map(|i| Part::new(format!("p{i}"), "ro1", "s1", i as f64))
            .collect();
        Playlist::new(vec![Segment::new("s1", "ro1", 1.0)], parts)
    }

    fn rundown(current: Option<&str>, next: Option<&str>) -> Rundown {
        let mut ro = Rundown::new("ro1", "st1");
        ro.active = true;
        ro.current_part_id = current.map(PartId::from);
        ro.next_part_id = next.map(PartId::from);
        ro
    }

    fn plan(studio: &Studio, ro: &Rundown, playlist: &Playlist, pieces: &[Piece]) -> Vec<TimelineObject> {
        let input = CompileInput {
            studio,
            rundown: Some(ro),
            playlist,
            pieces,
            baseline: &[],
        };
        plan_lookahead(&input, &CompileOptions::default())
    }

    #[test]
    fn preload_finds_next_occupant() {
        let studio = studio(LookaheadMode::Preload);
        let playlist = parts(4);
        let ro = rundown(Some("p1"), Some("p2"));
        let pieces = vec![clip("a", "p3", 0)];
        let out = plan(&studio, &ro, &playlist, &pieces);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "lookahead_0_a_obj");
        assert_eq!(out[0].layer, "vt_lookahead");
        assert_eq!(out[0].lookahead_for_layer.as_deref(), Some("vt"));
        assert!(out[0].is_lookahead);
        assert_eq!(out[0].classes, vec![LOOKAHEAD_CLASS]);
        assert_eq!(out[0].duration, None);
    }

    #[test]
    fn when_clear_stays_on_live_layer() {
        let studio = studio(LookaheadMode::WhenClear);
        let playlist = parts(2);
        let ro = rundown(Some("p1"), Some("p2"));
        let out = plan(&studio, &ro, &playlist, &[clip("a", "p2", 0)]);
        assert_eq!(out[0].layer, "vt");
        assert_eq!(out[0].lookahead_for_layer, None);
    }

    #[test]
    fn none_mode_is_skipped() {
        let studio = studio(LookaheadMode::None);
        let playlist = parts(2);
        let ro = rundown(Some("p1"), Some("p2"));
        assert!(plan(&studio, &ro, &playlist, &[clip("a", "p2", 0)]).is_empty());
    }

    #[test]
    fn pending_piece_in_current_part_comes_first() {
        let studio = studio(LookaheadMode::Preload);
        let playlist = parts(2);
        let ro = rundown(Some("p1"), Some("p2"));
        let pieces = vec![clip("live", "p1", 0), clip("later", "p1", 5_000), clip("b", "p2", 0)];
        let out = plan(&studio, &ro, &playlist, &pieces);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "lookahead_0_later_obj");
        assert_eq!(
            out[0].duration,
            Some(Duration::Expression("#later_obj.start - #.start".into()))
        );
    }

    #[test]
    fn multiple_pieces_are_chained_in_start_order() {
        let studio = studio(LookaheadMode::Preload);
        let playlist = parts(2);
        let ro = rundown(Some("p1"), Some("p2"));
        let pieces = vec![clip("second", "p2", 3_000), clip("first", "p2", 1_000)];
        let out = plan(&studio, &ro, &playlist, &pieces);
        let ids: Vec<&str> = out.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["lookahead_0_first_obj", "lookahead_1_second_obj"]);
        assert_eq!(out[0].trigger, Trigger::Absolute(0));
        assert_eq!(
            out[1].trigger,
            Trigger::Relative("#lookahead_0_first_obj.start + 0".into())
        );
    }

    #[test]
    fn transition_covers_primary_object() {
        let studio = studio(LookaheadMode::Preload);
        let playlist = parts(2);
        let ro = rundown(Some("p1"), Some("p2"));
        let mut wipe = clip("wipe", "p2", 0);
        wipe.is_transition = true;
        let pieces = vec![clip("main", "p2", 0), wipe];
        let out = plan(&studio, &ro, &playlist, &pieces);
        let ids: Vec<&str> = out.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["lookahead_0_wipe_obj"]);
    }

    #[test]
    fn disabled_out_transition_skips_transition_piece() {
        let studio = studio(LookaheadMode::Preload);
        let mut playlist = parts(2);
        playlist.parts[0].disable_out_transition = true;
        let ro = rundown(Some("p1"), Some("p2"));
        let mut wipe = clip("wipe", "p2", 0);
        wipe.is_transition = true;
        let pieces = vec![clip("main", "p2", 0), wipe];
        let out = plan(&studio, &ro, &playlist, &pieces);
        let ids: Vec<&str> = out.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["lookahead_0_main_obj"]);
    }

    #[test]
    fn retain_falls_back_to_earlier_part_in_segment() {
        let studio = studio(LookaheadMode::Retain);
        let playlist = parts(3);
        let ro = rundown(Some("p2"), Some("p3"));
        let pieces = vec![clip("old", "p1", 0), clip("older", "p1", 0)];
        let out = plan(&studio, &ro, &playlist, &pieces);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "lookahead_0_older_obj");
    }

    #[test]
    fn retain_single_candidate_shortcut() {
        let studio = studio(LookaheadMode::Retain);
        let playlist = parts(3);
        let ro = rundown(Some("p3"), None);
        let out = plan(&studio, &ro, &playlist, &[clip("only", "p1", 0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "lookahead_0_only_obj");
    }

    #[test]
    fn search_is_bounded() {
        let studio = studio(LookaheadMode::Preload);
        let playlist = parts(20);
        let ro = rundown(Some("p1"), Some("p2"));
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &[clip("far", "p15", 0)],
            baseline: &[],
        };
        let options = CompileOptions {
            max_lookahead_parts: 5,
            ..CompileOptions::default()
        };
        assert!(plan_lookahead(&input, &options).is_empty());
    }
}
