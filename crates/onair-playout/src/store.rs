//! Persisting compiled timelines.
//!
//! The device gateway watches the stored timeline and re-sends whatever
//! changes, so only objects whose serialized content differs are written.
//! After each save a per-device stat (object count and content hash) is
//! refreshed, again only when it changed.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::Connection;
use sha2::{Digest, Sha256};

use onair_core::{Error, Result, StudioId, Time, TimelineObject, TimelineStat};
use onair_db::queries::timeline;

/// Counts of what a save actually wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineDiff {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl TimelineDiff {
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }
}

fn body_of(obj: &TimelineObject) -> Result<String> {
    serde_json::to_string(obj).map_err(|e| Error::Internal(format!("timeline encode: {e}")))
}

/// Device an object is counted under; objects without one (groups with no
/// mapped children) are not counted.
fn device_of(obj: &TimelineObject) -> Option<&str> {
    obj.device_ids.first().map(String::as_str)
}

/// Write `objects` as the studio's timeline.
pub fn save_timeline(
    conn: &Connection,
    studio_id: &StudioId,
    objects: &[TimelineObject],
    now: Time,
) -> Result<TimelineDiff> {
    let existing: HashMap<String, (i64, String)> = timeline::list_timeline_bodies(conn, studio_id)?
        .into_iter()
        .map(|(id, position, body)| (id, (position, body)))
        .collect();

    let mut diff = TimelineDiff::default();
    let mut seen = HashSet::with_capacity(objects.len());
    let mut bodies: Vec<(&TimelineObject, String)> = Vec::with_capacity(objects.len());

    for (position, obj) in objects.iter().enumerate() {
        if !seen.insert(obj.id.as_str()) {
            return Err(Error::Timeline(format!("duplicate timeline object id {}", obj.id)));
        }
        let body = body_of(obj)?;
        match existing.get(&obj.id) {
            Some((_, old)) if *old == body => diff.unchanged += 1,
            Some(_) => {
                timeline::upsert_timeline_object(conn, studio_id, position as i64, obj)?;
                diff.updated += 1;
            }
            None => {
                timeline::upsert_timeline_object(conn, studio_id, position as i64, obj)?;
                diff.inserted += 1;
            }
        }
        bodies.push((obj, body));
    }

    for id in existing.keys().filter(|id| !seen.contains(id.as_str())) {
        timeline::delete_timeline_object(conn, studio_id, id)?;
        diff.removed += 1;
    }

    update_stats(conn, studio_id, &bodies, now)?;

    tracing::debug!(
        studio_id = %studio_id,
        inserted = diff.inserted,
        updated = diff.updated,
        removed = diff.removed,
        "Timeline saved"
    );
    Ok(diff)
}

/// Hash of a device's objects, taken over their bodies in id order.
pub fn device_hash<'a>(bodies: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut sorted: Vec<(&str, &str)> = bodies.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let mut hasher = Sha256::new();
    for (id, body) in sorted {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
        hasher.update(body.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn update_stats(
    conn: &Connection,
    studio_id: &StudioId,
    bodies: &[(&TimelineObject, String)],
    now: Time,
) -> Result<()> {
    let mut per_device: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for (obj, body) in bodies {
        if let Some(device) = device_of(obj) {
            per_device
                .entry(device)
                .or_default()
                .push((obj.id.as_str(), body.as_str()));
        }
    }

    let old: HashMap<String, TimelineStat> = timeline::list_stats(conn, studio_id)?
        .into_iter()
        .map(|s| (s.device_id.clone(), s))
        .collect();

    for (device, entries) in &per_device {
        let stat = TimelineStat {
            device_id: device.to_string(),
            object_count: entries.len(),
            hash: device_hash(entries.iter().copied()),
            updated_at: now,
        };
        let changed = old
            .get(*device)
            .map_or(true, |o| o.hash != stat.hash || o.object_count != stat.object_count);
        if changed {
            timeline::upsert_stat(conn, studio_id, &stat)?;
        }
    }

    for device in old.keys().filter(|d| !per_device.contains_key(d.as_str())) {
        timeline::delete_stat(conn, studio_id, device)?;
    }
    Ok(())
}
