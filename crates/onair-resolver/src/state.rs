//! Per-layer state queries over a resolved timeline.

use std::collections::BTreeMap;

use onair_core::Time;

use crate::resolver::{Resolution, Resolved};

/// The object playing on each layer at `time`.
///
/// Among objects active on the same layer, override objects win first, then
/// the lowest priority, then the latest start, then the earliest input
/// position. Groups and layerless objects are ignored.
pub fn layer_state_at(resolution: &Resolution, time: Time) -> BTreeMap<String, &Resolved> {
    let mut state: BTreeMap<String, &Resolved> = BTreeMap::new();
    for candidate in resolution
        .resolved
        .iter()
        .filter(|r| !r.object.is_group && !r.object.layer.is_empty())
        .filter(|r| r.is_active_at(time))
    {
        match state.get(candidate.object.layer.as_str()) {
            Some(current) if !beats(candidate, current) => {}
            _ => {
                state.insert(candidate.object.layer.clone(), candidate);
            }
        }
    }
    state
}

fn beats(a: &Resolved, b: &Resolved) -> bool {
    let key = |r: &Resolved| {
        (
            !r.object.is_override,
            r.object.priority,
            std::cmp::Reverse(r.start),
            r.index,
        )
    };
    key(a) < key(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{resolve, ResolveOptions};
    use onair_core::{Duration, TimelineObject, Trigger};

    fn on(id: &str, layer: &str, start: Time, priority: i32) -> TimelineObject {
        let mut obj = TimelineObject::new(id, layer, Trigger::Absolute(start));
        obj.priority = priority;
        obj
    }

    #[test]
    fn lowest_priority_wins() {
        let objects = vec![on("live", "vt", 0, 0), on("lookahead", "vt", 0, 1000)];
        let res = resolve(&objects, &ResolveOptions { now: 0 });
        let state = layer_state_at(&res, 10);
        assert_eq!(state["vt"].object.id, "live");
    }

    #[test]
    fn override_beats_priority() {
        let mut forced = on("forced", "vt", 0, 5);
        forced.is_override = true;
        let objects = vec![on("live", "vt", 0, 0), forced];
        let res = resolve(&objects, &ResolveOptions { now: 0 });
        assert_eq!(layer_state_at(&res, 10)["vt"].object.id, "forced");
    }

    #[test]
    fn latest_start_wins_at_equal_priority() {
        let objects = vec![on("early", "cam", 0, 0), on("late", "cam", 100, 0)];
        let res = resolve(&objects, &ResolveOptions { now: 0 });
        assert_eq!(layer_state_at(&res, 50)["cam"].object.id, "early");
        assert_eq!(layer_state_at(&res, 150)["cam"].object.id, "late");
    }

    #[test]
    fn ended_objects_drop_out() {
        let objects = vec![on("a", "gfx", 0, 0).with_duration(Duration::Millis(100))];
        let res = resolve(&objects, &ResolveOptions { now: 0 });
        assert!(layer_state_at(&res, 100).is_empty());
    }
}
