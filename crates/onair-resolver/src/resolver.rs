//! Resolution of a set of timeline objects to absolute start/end times.
//!
//! Objects form a DAG: each object depends on its parent group and on every
//! object referenced by its trigger or duration expression. The graph is
//! evaluated with Kahn's algorithm; ready objects are taken in input order so
//! the result is deterministic. Objects that sit on a cycle, reference a
//! missing id, fail to parse, or depend on such an object are reported as
//! unresolved and never abort the run.

use std::collections::{BTreeSet, HashMap};

use onair_core::{Duration, Time, TimelineObject, Trigger};
use tracing::{debug, warn};

use crate::expr::{self, Attr, Expr, Logical, Reference, Value};

/// Inputs that are not part of the object set.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Time substituted for `now` triggers.
    pub now: Time,
}

/// Why an object could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    DuplicateId,
    MissingReference(String),
    MissingParent(String),
    InvalidExpression(String),
    /// The object sits on (or downstream of) a reference cycle.
    Cycle,
    /// A dependency was itself unresolved.
    DependencyUnresolved(String),
    /// The trigger evaluated to an open-ended value.
    UnboundedStart,
}

/// An object that could not be placed in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Unresolved {
    pub id: String,
    pub reason: UnresolvedReason,
}

/// An object with absolute timing.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub object: TimelineObject,
    pub start: Time,
    /// `None` when the object never ends.
    pub end: Option<Time>,
    /// Position in the input.
    pub index: usize,
}

impl Resolved {
    /// Whether the object is playing at `time`.
    pub fn is_active_at(&self, time: Time) -> bool {
        self.start <= time && self.end.map_or(true, |end| time < end)
    }

    pub fn duration(&self) -> Option<i64> {
        self.end.map(|end| end - self.start)
    }
}

/// Result of resolving a set of objects.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Resolved objects, sorted by start time with transitions after
    /// non-transitions at equal starts and input order as the final
    /// tie-break.
    pub resolved: Vec<Resolved>,
    pub unresolved: Vec<Unresolved>,
}

impl Resolution {
    pub fn get(&self, id: &str) -> Option<&Resolved> {
        self.resolved.iter().find(|r| r.object.id == id)
    }

    pub fn start_of(&self, id: &str) -> Option<Time> {
        self.get(id).map(|r| r.start)
    }

    pub fn end_of(&self, id: &str) -> Option<Option<Time>> {
        self.get(id).map(|r| r.end)
    }

    pub fn is_unresolved(&self, id: &str) -> bool {
        self.unresolved.iter().any(|u| u.id == id)
    }
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

enum StartRule {
    Absolute(Time),
    Now,
    Relative(Expr),
    Logical(Logical),
}

enum EndRule {
    Inherit,
    Millis(i64),
    Expression(Expr),
}

struct Node {
    start: StartRule,
    end: EndRule,
    parent: Option<usize>,
    deps: Vec<usize>,
}

#[derive(Clone, Copy)]
struct Timing {
    start: Time,
    end: Option<Time>,
}

fn prepare(
    index: usize,
    obj: &TimelineObject,
    by_id: &HashMap<&str, usize>,
) -> Result<Node, UnresolvedReason> {
    let start = match &obj.trigger {
        Trigger::Absolute(t) => StartRule::Absolute(*t),
        Trigger::Now => StartRule::Now,
        Trigger::Relative(e) => StartRule::Relative(
            expr::parse(e).map_err(|err| UnresolvedReason::InvalidExpression(err.to_string()))?,
        ),
        Trigger::Logical(e) => StartRule::Logical(
            expr::parse_logical(e)
                .map_err(|err| UnresolvedReason::InvalidExpression(err.to_string()))?,
        ),
    };
    let end = match &obj.duration {
        None => EndRule::Inherit,
        Some(Duration::Millis(d)) => EndRule::Millis(*d),
        Some(Duration::Expression(e)) => EndRule::Expression(
            expr::parse(e).map_err(|err| UnresolvedReason::InvalidExpression(err.to_string()))?,
        ),
    };

    let parent = match &obj.in_group {
        Some(group) => Some(
            *by_id
                .get(group.as_str())
                .ok_or_else(|| UnresolvedReason::MissingParent(group.clone()))?,
        ),
        None => None,
    };

    let is_self = |r: &Reference| r.id.as_deref().map_or(true, |id| id == obj.id);

    let mut trigger_refs: Vec<&Reference> = match &start {
        StartRule::Relative(e) => e.references(),
        StartRule::Logical(l) => l.references(),
        _ => Vec::new(),
    };
    if trigger_refs.iter().any(|r| is_self(*r)) {
        return Err(UnresolvedReason::InvalidExpression(
            "trigger references its own object".into(),
        ));
    }
    if let EndRule::Expression(e) = &end {
        for r in e.references() {
            if is_self(r) {
                if r.attr != Attr::Start {
                    return Err(UnresolvedReason::InvalidExpression(format!(
                        "duration references its own {}",
                        r.attr
                    )));
                }
            } else {
                trigger_refs.push(r);
            }
        }
    }

    let mut deps: Vec<usize> = parent.into_iter().collect();
    for r in trigger_refs {
        let Some(id) = r.id.as_deref() else { continue };
        let dep = *by_id
            .get(id)
            .ok_or_else(|| UnresolvedReason::MissingReference(id.to_string()))?;
        if dep == index {
            return Err(UnresolvedReason::Cycle);
        }
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }

    Ok(Node {
        start,
        end,
        parent,
        deps,
    })
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn lookup_value(
    r: &Reference,
    self_start: Option<Time>,
    by_id: &HashMap<&str, usize>,
    timings: &[Option<Timing>],
) -> Option<Value> {
    let timing = match r.id.as_deref() {
        None => {
            return match r.attr {
                Attr::Start => self_start.map(Value::Finite),
                _ => None,
            }
        }
        Some(id) => timings[*by_id.get(id)?]?,
    };
    Some(match r.attr {
        Attr::Start => Value::Finite(timing.start),
        Attr::End => timing.end.map_or(Value::Infinite, Value::Finite),
        Attr::Duration => timing
            .end
            .map_or(Value::Infinite, |end| Value::Finite(end - timing.start)),
    })
}

fn evaluate(
    node: &Node,
    options: &ResolveOptions,
    by_id: &HashMap<&str, usize>,
    timings: &[Option<Timing>],
) -> Result<Timing, UnresolvedReason> {
    let parent = node.parent.and_then(|p| timings[p]);
    let parent_start = parent.map(|p| p.start);

    let raw_start = match &node.start {
        StartRule::Absolute(t) => parent_start.unwrap_or(0) + t,
        StartRule::Now => options.now,
        StartRule::Relative(e) => {
            match e.eval(&|r| lookup_value(r, None, by_id, timings)) {
                Some(Value::Finite(v)) => v,
                Some(Value::Infinite) => return Err(UnresolvedReason::UnboundedStart),
                None => {
                    return Err(UnresolvedReason::InvalidExpression(
                        "trigger could not be evaluated".into(),
                    ))
                }
            }
        }
        StartRule::Logical(Logical::Always) => parent_start.unwrap_or(0),
        StartRule::Logical(logical) => {
            let starts = logical
                .references()
                .into_iter()
                .filter_map(|r| lookup_value(r, None, by_id, timings))
                .filter_map(Value::finite);
            let picked = match logical {
                Logical::Any(_) => starts.min(),
                _ => starts.max(),
            };
            picked.ok_or(UnresolvedReason::InvalidExpression(
                "logical trigger has no resolved references".into(),
            ))?
        }
    };
    let start = parent_start.map_or(raw_start, |ps| raw_start.max(ps));

    let own_end = match &node.end {
        EndRule::Inherit => None,
        EndRule::Millis(d) => Some(start + (*d).max(0)),
        EndRule::Expression(e) => match e.eval(&|r| lookup_value(r, Some(start), by_id, timings)) {
            Some(Value::Finite(d)) => Some(start + d.max(0)),
            Some(Value::Infinite) => None,
            None => {
                return Err(UnresolvedReason::InvalidExpression(
                    "duration could not be evaluated".into(),
                ))
            }
        },
    };
    let parent_end = parent.and_then(|p| p.end);
    let end = match (own_end, parent_end) {
        (Some(e), Some(pe)) => Some(e.min(pe)),
        (None, Some(pe)) => Some(pe),
        (e, None) => e,
    }
    .map(|e| e.max(start));

    Ok(Timing { start, end })
}

/// Resolve `objects` to absolute times.
pub fn resolve(objects: &[TimelineObject], options: &ResolveOptions) -> Resolution {
    let mut unresolved = Vec::new();
    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(objects.len());
    let mut duplicate = vec![false; objects.len()];
    for (i, obj) in objects.iter().enumerate() {
        if by_id.contains_key(obj.id.as_str()) {
            duplicate[i] = true;
        } else {
            by_id.insert(obj.id.as_str(), i);
        }
    }

    let mut nodes: Vec<Option<Node>> = Vec::with_capacity(objects.len());
    let mut failed: Vec<Option<UnresolvedReason>> = vec![None; objects.len()];
    for (i, obj) in objects.iter().enumerate() {
        if duplicate[i] {
            failed[i] = Some(UnresolvedReason::DuplicateId);
            nodes.push(None);
            continue;
        }
        match prepare(i, obj, &by_id) {
            Ok(node) => nodes.push(Some(node)),
            Err(reason) => {
                failed[i] = Some(reason);
                nodes.push(None);
            }
        }
    }

    let mut in_degree = vec![0usize; objects.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); objects.len()];
    for (i, node) in nodes.iter().enumerate() {
        if let Some(node) = node {
            in_degree[i] = node.deps.len();
            for &dep in &node.deps {
                dependents[dep].push(i);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..objects.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut settled = vec![false; objects.len()];
    let mut timings: Vec<Option<Timing>> = vec![None; objects.len()];

    while let Some(i) = ready.pop_first() {
        settled[i] = true;
        if failed[i].is_none() {
            if let Some(node) = &nodes[i] {
                let blocked = node.deps.iter().find(|&&d| timings[d].is_none());
                match blocked {
                    Some(&d) => {
                        failed[i] = Some(UnresolvedReason::DependencyUnresolved(
                            objects[d].id.clone(),
                        ))
                    }
                    None => match evaluate(node, options, &by_id, &timings) {
                        Ok(timing) => timings[i] = Some(timing),
                        Err(reason) => failed[i] = Some(reason),
                    },
                }
            }
        }
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    for i in 0..objects.len() {
        if !settled[i] {
            failed[i] = Some(UnresolvedReason::Cycle);
        }
    }

    let mut resolved = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        match (&failed[i], timings[i]) {
            (None, Some(timing)) => resolved.push(Resolved {
                object: obj.clone(),
                start: timing.start,
                end: timing.end,
                index: i,
            }),
            (reason, _) => {
                let reason = reason.clone().unwrap_or(UnresolvedReason::Cycle);
                warn!(object_id = %obj.id, reason = ?reason, "Timeline object unresolved");
                unresolved.push(Unresolved {
                    id: obj.id.clone(),
                    reason,
                });
            }
        }
    }

    resolved.sort_by_key(|r| (r.start, r.object.is_transition, r.index));
    debug!(
        resolved = resolved.len(),
        unresolved = unresolved.len(),
        "Resolved timeline"
    );

    Resolution {
        resolved,
        unresolved,
    }
}

// ---------------------------------------------------------------------------
// Now snapping
// ---------------------------------------------------------------------------

/// Replace unsnapped `now` triggers with absolute times at `epoch`.
///
/// Top-level objects get `epoch` itself; objects inside a group get the
/// offset from the group's resolved start. Snapped objects are marked
/// `was_now` and are left alone by later calls. Returns how many objects
/// were snapped.
pub fn snap_now(objects: &mut [TimelineObject], epoch: Time) -> usize {
    let pending = objects
        .iter()
        .any(|o| o.trigger == Trigger::Now && !o.was_now);
    if !pending {
        return 0;
    }

    let resolution = resolve(objects, &ResolveOptions { now: epoch });
    let mut snapped = 0;
    for obj in objects.iter_mut() {
        if obj.trigger != Trigger::Now || obj.was_now {
            continue;
        }
        let offset = match &obj.in_group {
            None => Some(epoch),
            Some(group) => resolution
                .start_of(group)
                .map(|group_start| (epoch - group_start).max(0)),
        };
        match offset {
            Some(t) => {
                obj.trigger = Trigger::Absolute(t);
                obj.was_now = true;
                snapped += 1;
            }
            None => warn!(object_id = %obj.id, "Cannot snap now trigger: group unresolved"),
        }
    }
    snapped
}

/// Undo [`snap_now`]: snapped objects go back to `now` triggers.
pub fn reset_now(objects: &mut [TimelineObject]) -> usize {
    let mut reset = 0;
    for obj in objects.iter_mut().filter(|o| o.was_now) {
        obj.trigger = Trigger::Now;
        obj.was_now = false;
        reset += 1;
    }
    reset
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ResolveOptions {
        ResolveOptions { now: 50_000 }
    }

    fn obj(id: &str, trigger: Trigger) -> TimelineObject {
        TimelineObject::new(id, "layer", trigger)
    }

    #[test]
    fn absolute_and_relative() {
        let objects = vec![
            obj("a", Trigger::Absolute(1000)).with_duration(Duration::Millis(2000)),
            obj("b", Trigger::Relative("#a.end + 500".into())),
        ];
        let res = resolve(&objects, &opts());
        assert!(res.unresolved.is_empty());
        assert_eq!(res.start_of("a"), Some(1000));
        assert_eq!(res.end_of("a"), Some(Some(3000)));
        assert_eq!(res.start_of("b"), Some(3500));
        assert_eq!(res.end_of("b"), Some(None));
    }

    #[test]
    fn forward_reference_resolves_regardless_of_input_order() {
        let objects = vec![
            obj("b", Trigger::Relative("#a.start + 10".into())),
            obj("a", Trigger::Absolute(100)),
        ];
        let res = resolve(&objects, &opts());
        assert_eq!(res.start_of("b"), Some(110));
    }

    #[test]
    fn now_uses_option() {
        let res = resolve(&[obj("a", Trigger::Now)], &opts());
        assert_eq!(res.start_of("a"), Some(50_000));
    }

    #[test]
    fn missing_reference_is_unresolved_not_fatal() {
        let objects = vec![
            obj("a", Trigger::Relative("#ghost.start".into())),
            obj("b", Trigger::Absolute(0)),
            obj("c", Trigger::Relative("#a.end".into())),
        ];
        let res = resolve(&objects, &opts());
        assert_eq!(res.start_of("b"), Some(0));
        assert_eq!(res.unresolved.len(), 2);
        assert!(res
            .unresolved
            .iter()
            .any(|u| u.id == "a"
                && u.reason == UnresolvedReason::MissingReference("ghost".into())));
        assert!(res
            .unresolved
            .iter()
            .any(|u| u.id == "c" && u.reason == UnresolvedReason::DependencyUnresolved("a".into())));
    }

    #[test]
    fn cycles_are_unresolved() {
        let objects = vec![
            obj("a", Trigger::Relative("#b.start".into())),
            obj("b", Trigger::Relative("#a.start".into())),
            obj("c", Trigger::Relative("#b.end".into())),
            obj("d", Trigger::Absolute(5)),
        ];
        let res = resolve(&objects, &opts());
        assert_eq!(res.resolved.len(), 1);
        assert!(res
            .unresolved
            .iter()
            .all(|u| u.reason == UnresolvedReason::Cycle));
    }

    #[test]
    fn self_trigger_is_invalid() {
        let res = resolve(&[obj("a", Trigger::Relative("#.start".into()))], &opts());
        assert!(matches!(
            res.unresolved[0].reason,
            UnresolvedReason::InvalidExpression(_)
        ));
    }

    #[test]
    fn group_children_are_offset_and_capped() {
        let objects = vec![
            TimelineObject::group("g", Trigger::Absolute(10_000), Some(Duration::Millis(5000))),
            obj("child", Trigger::Absolute(1000)).in_group("g"),
            obj("long", Trigger::Absolute(0))
                .in_group("g")
                .with_duration(Duration::Millis(60_000)),
        ];
        let res = resolve(&objects, &opts());
        assert_eq!(res.start_of("child"), Some(11_000));
        assert_eq!(res.end_of("child"), Some(Some(15_000)));
        assert_eq!(res.end_of("long"), Some(Some(15_000)));
    }

    #[test]
    fn missing_parent_is_unresolved() {
        let res = resolve(&[obj("a", Trigger::Absolute(0)).in_group("nope")], &opts());
        assert_eq!(
            res.unresolved[0].reason,
            UnresolvedReason::MissingParent("nope".into())
        );
    }

    #[test]
    fn duration_expression_with_self_reference() {
        let objects = vec![
            obj("cur", Trigger::Absolute(20_000)),
            obj("prev", Trigger::Absolute(10_000))
                .with_duration(Duration::Expression("#cur.start + 500 - #.start".into())),
        ];
        let res = resolve(&objects, &opts());
        assert_eq!(res.end_of("prev"), Some(Some(20_500)));
    }

    #[test]
    fn negative_duration_clamps_to_zero() {
        let objects = vec![
            obj("x", Trigger::Absolute(100)),
            obj("y", Trigger::Absolute(500))
                .with_duration(Duration::Expression("#x.start - #.start".into())),
        ];
        let res = resolve(&objects, &opts());
        assert_eq!(res.end_of("y"), Some(Some(500)));
    }

    #[test]
    fn logical_triggers() {
        let objects = vec![
            obj("a", Trigger::Absolute(100)),
            obj("b", Trigger::Absolute(300)),
            obj("all", Trigger::Logical("#a & #b".into())),
            obj("any", Trigger::Logical("#a | #b".into())),
            obj("always", Trigger::Logical("1".into())),
        ];
        let res = resolve(&objects, &opts());
        assert_eq!(res.start_of("all"), Some(300));
        assert_eq!(res.start_of("any"), Some(100));
        assert_eq!(res.start_of("always"), Some(0));
    }

    #[test]
    fn transitions_sort_after_equal_start() {
        let mut transition = obj("t", Trigger::Absolute(0));
        transition.is_transition = true;
        let objects = vec![transition, obj("a", Trigger::Absolute(0)), obj("b", Trigger::Absolute(0))];
        let res = resolve(&objects, &opts());
        let ids: Vec<&str> = res.resolved.iter().map(|r| r.object.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "t"]);
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let objects = vec![obj("a", Trigger::Absolute(1)), obj("a", Trigger::Absolute(2))];
        let res = resolve(&objects, &opts());
        assert_eq!(res.start_of("a"), Some(1));
        assert_eq!(res.unresolved[0].reason, UnresolvedReason::DuplicateId);
    }

    #[test]
    fn snap_now_is_idempotent() {
        let mut objects = vec![
            TimelineObject::group("g", Trigger::Now, None),
            obj("inner", Trigger::Now).in_group("g"),
        ];
        assert_eq!(snap_now(&mut objects, 10_000), 2);
        assert_eq!(objects[0].trigger, Trigger::Absolute(10_000));
        assert_eq!(objects[1].trigger, Trigger::Absolute(0));
        assert!(objects[0].was_now);

        assert_eq!(snap_now(&mut objects, 99_000), 0);
        assert_eq!(objects[0].trigger, Trigger::Absolute(10_000));

        assert_eq!(reset_now(&mut objects), 2);
        assert_eq!(objects[0].trigger, Trigger::Now);
        assert_eq!(snap_now(&mut objects, 99_000), 2);
        assert_eq!(objects[0].trigger, Trigger::Absolute(99_000));
    }

    #[test]
    fn overlap_expression_tracks_current_group_shift() {
        let build = |cur_start: Time| {
            vec![
                TimelineObject::group("part_group_cur", Trigger::Absolute(cur_start), None),
                TimelineObject::group(
                    "previous_part_group_prev",
                    Trigger::Absolute(1_000),
                    Some(Duration::Expression(
                        "#part_group_cur.start + 400 - #.start".into(),
                    )),
                ),
            ]
        };
        let first = resolve(&build(10_000), &opts());
        assert_eq!(first.end_of("previous_part_group_prev"), Some(Some(10_400)));
        let shifted = resolve(&build(12_500), &opts());
        assert_eq!(shifted.end_of("previous_part_group_prev"), Some(Some(12_900)));
    }
}
