//! Timeline compilation.
//!
//! Turns the active rundown's playout state into the flat list of
//! [`TimelineObject`]s the device gateway executes:
//!
//! 1. baseline objects, always on
//! 2. the previous part, decaying through the overlap window
//! 3. the current part, with infinite runs split into their own top-level
//!    groups anchored at the run's original start
//! 4. the next part pre-positioned at the current part's end when the
//!    current part autonexts
//! 5. lookahead objects
//!
//! Every leaf object is then routed to a device through the studio's
//! mapping table and every group is tagged with the devices of all of its
//! descendants.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::json;
use tracing::{debug, error, warn};

use onair_core::config::PlayoutConfig;
use onair_core::{
    Duration, Error, HoldState, Part, PartId, Piece, PieceId, Result, Rundown, Studio,
    TimelineObject, Trigger, CORE_ABSTRACT_DEVICE, CORE_ABSTRACT_LAYER,
};
use onair_resolver::{referenced_ids, rename_references};

use crate::lookahead;
use crate::ordering::Playlist;

/// Added to the previous part's priorities so the current part wins shared
/// layers during the overlap.
pub const PREVIOUS_PART_PRIORITY_OFFSET: i32 = 1;

/// Added to baseline priorities so any part content wins over them.
pub const BASELINE_PRIORITY_OFFSET: i32 = 100;

/// Priority of lookahead objects, below all live content.
pub const LOOKAHEAD_PRIORITY: i32 = 1000;

/// Prefix applied to every id of the previous part's objects.
pub const PREVIOUS_PREFIX: &str = "previous_";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything the compiler reads.
pub struct CompileInput<'a> {
    pub studio: &'a Studio,
    /// The studio's active rundown, if any.
    pub rundown: Option<&'a Rundown>,
    pub playlist: &'a Playlist,
    /// All pieces of the rundown, continuation copies included.
    pub pieces: &'a [Piece],
    pub baseline: &'a [TimelineObject],
}

impl<'a> CompileInput<'a> {
    /// Enabled pieces of `part`, in stored order.
    pub fn pieces_of(&self, part: &PartId) -> Vec<&'a Piece> {
        self.pieces
            .iter()
            .filter(|p| p.part_id == *part && !p.disabled)
            .collect()
    }

    fn hold_state(&self) -> HoldState {
        self.rundown.map(|r| r.hold_state).unwrap_or_default()
    }

    pub fn current_part(&self) -> Option<&'a Part> {
        let id = self.rundown?.current_part_id.as_ref()?;
        self.playlist.part(id)
    }

    pub fn next_part(&self) -> Option<&'a Part> {
        let id = self.rundown?.next_part_id.as_ref()?;
        self.playlist.part(id)
    }

    pub fn previous_part(&self) -> Option<&'a Part> {
        let id = self.rundown?.previous_part_id.as_ref()?;
        self.playlist.part(id)
    }
}

/// Compiler switches.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Halt on leaf objects whose layer has no mapping.
    pub strict_mappings: bool,
    pub max_lookahead_parts: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::from(&PlayoutConfig::default())
    }
}

impl From<&PlayoutConfig> for CompileOptions {
    fn from(config: &PlayoutConfig) -> Self {
        Self {
            strict_mappings: config.strict_mappings,
            max_lookahead_parts: config.max_lookahead_parts,
        }
    }
}

// ---------------------------------------------------------------------------
// Ids and expressions
// ---------------------------------------------------------------------------

pub fn part_group_id(part: &PartId) -> String {
    format!("part_group_{part}")
}

pub fn part_first_object_id(part: &PartId) -> String {
    format!("part_group_firstobject_{part}")
}

pub fn piece_group_id(key: &str) -> String {
    format!("piece_group_{key}")
}

pub fn piece_first_object_id(key: &str) -> String {
    format!("piece_group_firstobject_{key}")
}

pub fn infinite_group_id(infinite: &PieceId) -> String {
    format!("infinite_group_{infinite}")
}

/// `base + offset`, written with the sign the parser expects.
pub fn offset_expr(base: &str, offset: i64) -> String {
    if offset < 0 {
        format!("{base} - {}", offset.unsigned_abs())
    } else {
        format!("{base} + {offset}")
    }
}

/// Key naming a piece's group. Members of an infinite run share the run's
/// key so the group keeps its id from part to part.
pub fn piece_key(piece: &Piece) -> &str {
    if is_run_member(piece) {
        piece.infinite_id.as_ref().map_or(piece.id.as_str(), |id| id.as_str())
    } else {
        piece.id.as_str()
    }
}

/// Whether `piece` belongs to an infinite run that outlives its part.
pub fn is_run_member(piece: &Piece) -> bool {
    piece.is_continuation()
        || (piece.infinite_id.as_ref() == Some(&piece.id) && !piece.ends_infinite())
}

// ---------------------------------------------------------------------------
// Transitions and overlap
// ---------------------------------------------------------------------------

/// Whether the incoming part's transition plays after `from`.
pub fn allows_transition(from: Option<&Part>, hold: HoldState) -> bool {
    from.is_some_and(|p| !p.disable_out_transition)
        && !matches!(hold, HoldState::Active | HoldState::Complete)
}

/// Length of the window in which `from` and `to` both play.
pub fn overlap_duration(from: &Part, to: &Part, to_pieces: &[&Piece], allow_transition: bool) -> i64 {
    let transition = if allow_transition {
        to.transition_duration.or_else(|| {
            to_pieces
                .iter()
                .find(|p| p.is_transition)
                .and_then(|p| p.expected_duration)
        })
    } else {
        None
    };
    let base = transition.or(from.auto_next_overlap).unwrap_or(0);
    base.max(to.overlap_duration.unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

struct PartRender<'p> {
    part: &'p Part,
    pieces: Vec<&'p Piece>,
    trigger: Trigger,
    duration: Option<Duration>,
    priority_offset: i32,
    allow_transition: bool,
}

fn render_piece(
    piece: &Piece,
    parent: &str,
    trigger: Trigger,
    priority_offset: i32,
    out: &mut Vec<TimelineObject>,
) {
    let key = piece_key(piece);
    let group_id = piece_group_id(key);

    let mut group = TimelineObject::group(group_id.clone(), trigger, piece.effective_duration())
        .in_group(parent)
        .with_content(json!({ "piece_id": piece.id }));
    group.is_transition = piece.is_transition;
    out.push(group);

    let mut first = TimelineObject::new(
        piece_first_object_id(key),
        CORE_ABSTRACT_LAYER,
        Trigger::Absolute(0),
    )
    .in_group(group_id.clone())
    .with_content(json!({
        "callback": "piece_playback_started",
        "rundown_id": piece.rundown_id,
        "piece_id": piece.id,
    }));
    first.is_abstract = true;
    out.push(first);

    for obj in &piece.content.timeline_objects {
        let mut obj = obj.clone();
        if obj.in_group.is_none() {
            obj.in_group = Some(group_id.clone());
        }
        obj.priority += priority_offset;
        obj.is_transition |= piece.is_transition;
        out.push(obj);
    }
}

fn render_part(render: PartRender<'_>, out: &mut Vec<TimelineObject>) {
    let part = render.part;
    let group_id = part_group_id(&part.id);
    out.push(
        TimelineObject::group(group_id.clone(), render.trigger, render.duration)
            .with_content(json!({ "part_id": part.id })),
    );

    let mut first = TimelineObject::new(
        part_first_object_id(&part.id),
        CORE_ABSTRACT_LAYER,
        Trigger::Absolute(0),
    )
    .in_group(group_id.clone())
    .with_content(json!({
        "callback": "part_playback_started",
        "rundown_id": part.rundown_id,
        "part_id": part.id,
    }));
    first.is_abstract = true;
    out.push(first);

    for piece in render.pieces {
        if piece.is_transition && !render.allow_transition {
            debug!(piece_id = %piece.id, "Transition skipped");
            continue;
        }
        render_piece(piece, &group_id, piece.trigger.clone(), render.priority_offset, out);
    }
}

/// Prefix every id in `objects` and rewrite references between them.
fn rename_set(objects: &mut [TimelineObject], prefix: &str) {
    let ids: HashSet<String> = objects.iter().map(|o| o.id.clone()).collect();
    let rename = |id: &str| ids.contains(id).then(|| format!("{prefix}{id}"));
    for obj in objects.iter_mut() {
        obj.id = format!("{prefix}{}", obj.id);
        if let Some(group) = obj.in_group.as_deref().and_then(|g| rename(g)) {
            obj.in_group = Some(group);
        }
        match &mut obj.trigger {
            Trigger::Relative(e) | Trigger::Logical(e) => *e = rename_references(e, rename),
            Trigger::Absolute(_) | Trigger::Now => {}
        }
        if let Some(Duration::Expression(e)) = &mut obj.duration {
            *e = rename_references(e, rename);
        }
    }
}

/// Start of the infinite run `piece` belongs to, if it is known.
fn run_anchor(input: &CompileInput<'_>, piece: &Piece) -> Option<Trigger> {
    let origin_id = piece.infinite_id.as_ref()?;
    let origin = input.pieces.iter().find(|p| p.id == *origin_id);

    if let Some(started) = origin.and_then(|o| o.started_playback).or(piece.started_playback) {
        return Some(Trigger::Absolute(started));
    }
    let origin = origin?;
    let part = input.playlist.part(&origin.part_id)?;
    match (part.last_started_playback(), origin.trigger_offset()) {
        (Some(part_start), Some(offset)) => Some(Trigger::Absolute(part_start + offset)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Compile
// ---------------------------------------------------------------------------

/// Compile the studio timeline.
///
/// With no active rundown the timeline is empty. A studio without any
/// mappings is a configuration error.
pub fn compile_timeline(
    input: &CompileInput<'_>,
    options: &CompileOptions,
) -> Result<Vec<TimelineObject>> {
    let Some(rundown) = input.rundown.filter(|r| r.active) else {
        return Ok(Vec::new());
    };
    if input.studio.mappings.is_empty() {
        error!(studio_id = %input.studio.id, "Studio has no layer mappings");
        return Err(Error::Configuration(format!(
            "studio {} has no layer mappings",
            input.studio.id
        )));
    }

    let mut out: Vec<TimelineObject> = Vec::new();

    for obj in input.baseline {
        let mut obj = obj.clone();
        obj.priority += BASELINE_PRIORITY_OFFSET;
        out.push(obj);
    }

    let hold = input.hold_state();
    let current = input.current_part();
    let next = input.next_part();
    let previous = input.previous_part();

    if let Some(current) = current {
        let current_pieces = input.pieces_of(&current.id);
        let current_runs: HashSet<&PieceId> = current_pieces
            .iter()
            .filter(|p| is_run_member(p))
            .filter_map(|p| p.infinite_id.as_ref())
            .collect();
        let current_group = part_group_id(&current.id);

        // Previous part, decaying into the current one.
        if let Some(previous) = previous {
            if let Some(started) = previous.last_started_playback() {
                let allow = allows_transition(Some(previous), hold);
                let overlap = overlap_duration(previous, current, &current_pieces, allow);
                let pieces = input
                    .pieces_of(&previous.id)
                    .into_iter()
                    .filter(|p| {
                        !p.infinite_id
                            .as_ref()
                            .is_some_and(|id| current_runs.contains(id))
                    })
                    .collect();
                let mut set = Vec::new();
                render_part(
                    PartRender {
                        part: previous,
                        pieces,
                        trigger: Trigger::Absolute(started),
                        duration: Some(Duration::Expression(format!(
                            "{} - #.start",
                            offset_expr(&format!("#{current_group}.start"), overlap)
                        ))),
                        priority_offset: PREVIOUS_PART_PRIORITY_OFFSET,
                        allow_transition: false,
                    },
                    &mut set,
                );
                rename_set(&mut set, PREVIOUS_PREFIX);
                out.extend(set);
            }
        }

        // Current part. Autonext needs a known length to place the next part.
        let autonext_length = match (current.auto_next, next, current.expected_duration) {
            (true, Some(_), Some(length)) => Some(length),
            (true, Some(next), None) => {
                warn!(
                    part_id = %current.id,
                    next_part_id = %next.id,
                    "Autonext part has no expected duration; next part not preloaded"
                );
                None
            }
            _ => None,
        };

        let (runs, own): (Vec<&Piece>, Vec<&Piece>) =
            current_pieces.iter().partition(|p| is_run_member(p));
        render_part(
            PartRender {
                part: current,
                pieces: own,
                trigger: current
                    .last_started_playback()
                    .map_or(Trigger::Now, Trigger::Absolute),
                duration: autonext_length.map(Duration::Millis),
                priority_offset: 0,
                allow_transition: allows_transition(previous, hold),
            },
            &mut out,
        );

        for piece in runs {
            let Some(infinite_id) = piece.infinite_id.as_ref() else {
                continue;
            };
            let anchor = run_anchor(input, piece).unwrap_or_else(|| {
                let base = format!("#{current_group}.start");
                Trigger::Relative(match piece.trigger_offset() {
                    Some(offset) if offset != 0 => offset_expr(&base, offset),
                    _ => base,
                })
            });
            let group_id = infinite_group_id(infinite_id);
            out.push(
                TimelineObject::group(group_id.clone(), anchor, None)
                    .with_content(json!({ "infinite_id": infinite_id })),
            );
            render_piece(piece, &group_id, Trigger::Absolute(0), 0, &mut out);
        }

        // Autonext preload.
        if let (Some(next), Some(_)) = (next, autonext_length) {
            let next_pieces = input.pieces_of(&next.id);
            let allow = allows_transition(Some(current), hold);
            let overlap = overlap_duration(current, next, &next_pieces, allow);
            let pieces = next_pieces
                .into_iter()
                .filter(|p| {
                    !p.infinite_id
                        .as_ref()
                        .is_some_and(|id| current_runs.contains(id))
                })
                .collect();
            render_part(
                PartRender {
                    part: next,
                    pieces,
                    trigger: Trigger::Relative(offset_expr(
                        &format!("#{current_group}.end"),
                        -overlap,
                    )),
                    duration: None,
                    priority_offset: 0,
                    allow_transition: allow,
                },
                &mut out,
            );
        }
    }

    out.extend(lookahead::plan_lookahead(input, options));

    let mut out = dedupe(out);
    strip_dangling_durations(&mut out);
    let mut out = apply_mappings(input.studio, out, options.strict_mappings)?;
    assign_group_devices(&mut out);

    debug!(
        rundown_id = %rundown.id,
        objects = out.len(),
        "Timeline compiled"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

fn dedupe(objects: Vec<TimelineObject>) -> Vec<TimelineObject> {
    let mut seen = HashSet::with_capacity(objects.len());
    objects
        .into_iter()
        .filter(|o| {
            let fresh = seen.insert(o.id.clone());
            if !fresh {
                warn!(object_id = %o.id, "Duplicate timeline object id; later copy dropped");
            }
            fresh
        })
        .collect()
}

/// Clear duration expressions that reference objects not on the timeline;
/// the object then runs until its group ends.
fn strip_dangling_durations(objects: &mut [TimelineObject]) {
    let ids: HashSet<String> = objects.iter().map(|o| o.id.clone()).collect();
    for obj in objects.iter_mut() {
        let dangling = obj
            .duration
            .as_ref()
            .and_then(Duration::expression)
            .is_some_and(|e| referenced_ids(e).iter().any(|id| !ids.contains(id)));
        if dangling {
            debug!(object_id = %obj.id, "Duration references an object not on the timeline");
            obj.duration = None;
        }
    }
}

fn apply_mappings(
    studio: &Studio,
    objects: Vec<TimelineObject>,
    strict: bool,
) -> Result<Vec<TimelineObject>> {
    let mut out = Vec::with_capacity(objects.len());
    for mut obj in objects {
        if obj.is_group {
            out.push(obj);
            continue;
        }
        if let Some(mapping) = studio.mappings.get(obj.mapping_layer()) {
            obj.device_ids = vec![mapping.device_id.clone()];
        } else if obj.is_abstract {
            obj.layer = CORE_ABSTRACT_LAYER.to_string();
            obj.device_ids = vec![CORE_ABSTRACT_DEVICE.to_string()];
        } else if strict {
            error!(
                studio_id = %studio.id,
                object_id = %obj.id,
                layer = %obj.layer,
                "No mapping for layer; compilation halted"
            );
            return Err(Error::Timeline(format!(
                "object {} is on unmapped layer {}",
                obj.id, obj.layer
            )));
        } else {
            warn!(object_id = %obj.id, layer = %obj.layer, "No mapping for layer; object dropped");
            continue;
        }
        out.push(obj);
    }
    Ok(out)
}

/// Tag each group with the union of its descendants' devices.
fn assign_group_devices(objects: &mut [TimelineObject]) {
    let mut devices: HashMap<String, BTreeSet<String>> = objects
        .iter()
        .filter(|o| o.is_group)
        .map(|o| (o.id.clone(), BTreeSet::new()))
        .collect();

    loop {
        let mut changed = false;
        for obj in objects.iter() {
            let Some(parent) = obj.in_group.as_ref() else {
                continue;
            };
            let own: Vec<String> = if obj.is_group {
                devices
                    .get(&obj.id)
                    .map(|d| d.iter().cloned().collect())
                    .unwrap_or_default()
            } else {
                obj.device_ids.clone()
            };
            if let Some(target) = devices.get_mut(parent) {
                for d in own {
                    changed |= target.insert(d);
                }
            }
        }
        if !changed {
            break;
        }
    }

    for obj in objects.iter_mut().filter(|o| o.is_group) {
        if let Some(d) = devices.remove(&obj.id) {
            obj.device_ids = d.into_iter().collect();
        }
    }
}

/// Group the compiled objects by device, for diagnostics.
pub fn objects_by_device(objects: &[TimelineObject]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for obj in objects.iter().filter(|o| !o.is_group) {
        for d in &obj.device_ids {
            *counts.entry(d.as_str()).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use onair_core::{InfiniteMode, LookaheadMode, Mapping, Segment};
    use onair_resolver::{resolve, ResolveOptions};

    fn studio() -> Studio {
        Studio::new("st1", "Studio 1")
            .with_mapping("cam", Mapping::new("atem"))
            .with_mapping("vt", Mapping::new("caspar"))
            .with_mapping("gfx", Mapping::new("caspar"))
    }

    fn playlist(parts: Vec<Part>) -> Playlist {
        Playlist::new(vec![Segment::new("s1", "ro1", 1.0)], parts)
    }

    fn piece(id: &str, part: &str, layer: &str) -> Piece {
        Piece::new(id, "ro1", part, layer)
            .with_object(TimelineObject::new(format!("{id}_obj"), layer, Trigger::Absolute(0)))
    }

    fn live_rundown(current: &str, next: Option<&str>) -> Rundown {
        let mut ro = Rundown::new("ro1", "st1");
        ro.active = true;
        ro.current_part_id = Some(current.into());
        ro.next_part_id = next.map(PartId::from);
        ro
    }

    fn get<'a>(objects: &'a [TimelineObject], id: &str) -> &'a TimelineObject {
        objects
            .iter()
            .find(|o| o.id == id)
            .unwrap_or_else(|| panic!("missing {id}"))
    }

    #[test]
    fn inactive_rundown_compiles_to_nothing() {
        let studio = studio();
        let playlist = playlist(vec![Part::new("p1", "ro1", "s1", 1.0)]);
        let ro = Rundown::new("ro1", "st1");
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &[],
            baseline: &[TimelineObject::new("bg", "cam", Trigger::Absolute(0))],
        };
        assert!(compile_timeline(&input, &CompileOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn studio_without_mappings_is_configuration_error() {
        let studio = Studio::new("st1", "empty");
        let playlist = playlist(vec![Part::new("p1", "ro1", "s1", 1.0)]);
        let ro = live_rundown("p1", None);
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &[],
            baseline: &[],
        };
        let err = compile_timeline(&input, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn current_part_group_and_devices() {
        let studio = studio();
        let mut p1 = Part::new("p1", "ro1", "s1", 1.0);
        p1.started_playback = vec![10_000];
        let playlist = playlist(vec![p1, Part::new("p2", "ro1", "s1", 2.0)]);
        let ro = live_rundown("p1", Some("p2"));
        let pieces = vec![piece("a", "p1", "cam"), piece("b", "p1", "vt")];
        let baseline = vec![TimelineObject::new("bg", "gfx", Trigger::Absolute(0))];
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &pieces,
            baseline: &baseline,
        };
        let out = compile_timeline(&input, &CompileOptions::default()).unwrap();

        let group = get(&out, "part_group_p1");
        assert_eq!(group.trigger, Trigger::Absolute(10_000));
        assert_eq!(group.device_ids, vec!["atem", "caspar", CORE_ABSTRACT_DEVICE]);
        assert_eq!(get(&out, "a_obj").in_group.as_deref(), Some("piece_group_a"));
        assert_eq!(get(&out, "bg").priority, BASELINE_PRIORITY_OFFSET);
        assert_eq!(get(&out, "part_group_firstobject_p1").layer, CORE_ABSTRACT_LAYER);
        // p2 is not autonexted into, so it is not on the timeline.
        assert!(out.iter().all(|o| o.id != "part_group_p2"));
    }

    #[test]
    fn unmapped_layer_strict_and_lenient() {
        let studio = studio();
        let playlist = playlist(vec![Part::new("p1", "ro1", "s1", 1.0)]);
        let ro = live_rundown("p1", None);
        let pieces = vec![piece("a", "p1", "nowhere")];
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &pieces,
            baseline: &[],
        };
        let err = compile_timeline(&input, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Timeline(_)));

        let lenient = CompileOptions {
            strict_mappings: false,
            ..CompileOptions::default()
        };
        let out = compile_timeline(&input, &lenient).unwrap();
        assert!(out.iter().all(|o| o.id != "a_obj"));
        assert!(out.iter().any(|o| o.id == "piece_group_a"));
    }

    #[test]
    fn previous_part_decays_through_overlap() {
        let studio = studio();
        let mut p1 = Part::new("p1", "ro1", "s1", 1.0);
        p1.started_playback = vec![1_000];
        let mut p2 = Part::new("p2", "ro1", "s1", 2.0);
        p2.started_playback = vec![5_000];
        p2.transition_duration = Some(400);
        let playlist = playlist(vec![p1, p2]);
        let mut ro = live_rundown("p2", None);
        ro.previous_part_id = Some("p1".into());
        let pieces = vec![piece("a", "p1", "cam"), piece("b", "p2", "cam")];
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &pieces,
            baseline: &[],
        };
        let out = compile_timeline(&input, &CompileOptions::default()).unwrap();

        let prev = get(&out, "previous_part_group_p1");
        assert_eq!(prev.trigger, Trigger::Absolute(1_000));
        assert_eq!(
            prev.duration,
            Some(Duration::Expression("#part_group_p2.start + 400 - #.start".into()))
        );
        let a = get(&out, "previous_a_obj");
        assert_eq!(a.in_group.as_deref(), Some("previous_piece_group_a"));
        assert_eq!(a.priority, PREVIOUS_PART_PRIORITY_OFFSET);

        let resolution = resolve(&out, &ResolveOptions { now: 0 });
        assert_eq!(resolution.end_of("previous_part_group_p1"), Some(Some(5_400)));
    }

    #[test]
    fn infinite_continuation_gets_its_own_group() {
        let studio = studio();
        let mut p1 = Part::new("p1", "ro1", "s1", 1.0);
        p1.started_playback = vec![1_000];
        let mut p2 = Part::new("p2", "ro1", "s1", 2.0);
        p2.started_playback = vec![5_000];
        let playlist = playlist(vec![p1, p2]);
        let mut ro = live_rundown("p2", None);
        ro.previous_part_id = Some("p1".into());

        let mut origin = piece("A", "p1", "gfx").with_infinite_mode(InfiniteMode::OutOnNextPart);
        origin.infinite_id = Some("A".into());
        origin.started_playback = Some(1_200);
        let mut copy = origin.clone();
        copy.id = "A_p2".into();
        copy.part_id = "p2".into();
        copy.continues_ref_id = Some("A".into());
        copy.started_playback = None;

        let pieces = vec![origin, copy];
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &pieces,
            baseline: &[],
        };
        let out = compile_timeline(&input, &CompileOptions::default()).unwrap();

        let group = get(&out, "infinite_group_A");
        assert_eq!(group.trigger, Trigger::Absolute(1_200));
        assert!(group.in_group.is_none());
        assert_eq!(get(&out, "piece_group_A").in_group.as_deref(), Some("infinite_group_A"));
        // The origin continues, so the previous part does not carry it.
        assert!(out.iter().all(|o| o.id != "previous_piece_group_A"));
        assert_eq!(out.iter().filter(|o| o.id == "A_obj").count(), 1);
    }

    #[test]
    fn autonext_preloads_next_part() {
        let studio = studio();
        let mut p1 = Part::new("p1", "ro1", "s1", 1.0);
        p1.started_playback = vec![1_000];
        p1.auto_next = true;
        p1.expected_duration = Some(3_000);
        p1.auto_next_overlap = Some(250);
        let playlist = playlist(vec![p1, Part::new("p2", "ro1", "s1", 2.0)]);
        let ro = live_rundown("p1", Some("p2"));
        let pieces = vec![piece("a", "p1", "cam"), piece("b", "p2", "cam")];
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &pieces,
            baseline: &[],
        };
        let out = compile_timeline(&input, &CompileOptions::default()).unwrap();
        assert_eq!(get(&out, "part_group_p1").duration, Some(Duration::Millis(3_000)));
        assert_eq!(
            get(&out, "part_group_p2").trigger,
            Trigger::Relative("#part_group_p1.end - 250".into())
        );
        let resolution = resolve(&out, &ResolveOptions { now: 0 });
        assert_eq!(resolution.start_of("part_group_p2"), Some(3_750));
    }

    #[test]
    fn autonext_without_length_does_not_preload() {
        let studio = studio();
        let mut p1 = Part::new("p1", "ro1", "s1", 1.0);
        p1.auto_next = true;
        let playlist = playlist(vec![p1, Part::new("p2", "ro1", "s1", 2.0)]);
        let ro = live_rundown("p1", Some("p2"));
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &[],
            baseline: &[],
        };
        let out = compile_timeline(&input, &CompileOptions::default()).unwrap();
        assert!(out.iter().all(|o| o.id != "part_group_p2"));
        assert_eq!(get(&out, "part_group_p1").trigger, Trigger::Now);
    }

    #[test]
    fn transition_respects_out_transition_flag() {
        let studio = studio();
        let mut p1 = Part::new("p1", "ro1", "s1", 1.0);
        p1.started_playback = vec![0];
        p1.disable_out_transition = true;
        let mut p2 = Part::new("p2", "ro1", "s1", 2.0);
        p2.started_playback = vec![1_000];
        let playlist = playlist(vec![p1, p2]);
        let mut ro = live_rundown("p2", None);
        ro.previous_part_id = Some("p1".into());
        let mut wipe = piece("wipe", "p2", "cam");
        wipe.is_transition = true;
        wipe.expected_duration = Some(500);
        let pieces = vec![wipe];
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &pieces,
            baseline: &[],
        };
        let out = compile_timeline(&input, &CompileOptions::default()).unwrap();
        assert!(out.iter().all(|o| o.id != "piece_group_wipe"));
        assert_eq!(
            get(&out, "previous_part_group_p1").duration,
            Some(Duration::Expression("#part_group_p2.start + 0 - #.start".into()))
        );
    }

    #[test]
    fn overlap_policy() {
        let from = Part::new("a", "ro1", "s1", 1.0);
        let mut to = Part::new("b", "ro1", "s1", 2.0);
        let mut wipe = Piece::new("w", "ro1", "b", "cam");
        wipe.is_transition = true;
        wipe.expected_duration = Some(300);
        assert_eq!(overlap_duration(&from, &to, &[&wipe], true), 300);
        assert_eq!(overlap_duration(&from, &to, &[&wipe], false), 0);
        to.transition_duration = Some(700);
        assert_eq!(overlap_duration(&from, &to, &[&wipe], true), 700);
        // An explicit transition length is ignored when the transition is not played.
        assert_eq!(overlap_duration(&from, &to, &[&wipe], false), 0);
        to.overlap_duration = Some(900);
        assert_eq!(overlap_duration(&from, &to, &[], true), 900);

        let mut from = from;
        from.auto_next_overlap = Some(200);
        let to = Part::new("b", "ro1", "s1", 2.0);
        assert_eq!(overlap_duration(&from, &to, &[], false), 200);
    }

    #[test]
    fn nested_group_devices_propagate() {
        let mut objects = vec![
            TimelineObject::group("outer", Trigger::Absolute(0), None),
            TimelineObject::group("inner", Trigger::Absolute(0), None).in_group("outer"),
            TimelineObject::new("leaf", "cam", Trigger::Absolute(0)).in_group("inner"),
        ];
        objects[2].device_ids = vec!["atem".into()];
        assign_group_devices(&mut objects);
        assert_eq!(objects[0].device_ids, vec!["atem"]);
        assert_eq!(objects[1].device_ids, vec!["atem"]);
    }

    #[test]
    fn lookahead_is_appended() {
        let studio = studio().with_mapping("vt", Mapping::new("caspar").with_lookahead(LookaheadMode::Preload));
        let mut p1 = Part::new("p1", "ro1", "s1", 1.0);
        p1.started_playback = vec![0];
        let playlist = playlist(vec![p1, Part::new("p2", "ro1", "s1", 2.0)]);
        let ro = live_rundown("p1", Some("p2"));
        let pieces = vec![piece("clip", "p2", "vt")];
        let input = CompileInput {
            studio: &studio,
            rundown: Some(&ro),
            playlist: &playlist,
            pieces: &pieces,
            baseline: &[],
        };
        let out = compile_timeline(&input, &CompileOptions::default()).unwrap();
        let la = get(&out, "lookahead_0_clip_obj");
        assert_eq!(la.layer, "vt_lookahead");
        assert_eq!(la.device_ids, vec!["caspar"]);
        assert_eq!(la.priority, LOOKAHEAD_PRIORITY);
    }

    #[test]
    fn offset_expr_signs() {
        assert_eq!(offset_expr("#a.end", -250), "#a.end - 250");
        assert_eq!(offset_expr("#a.start", 0), "#a.start + 0");
    }
}
