use serde::{Deserialize, Serialize};

use crate::clock::Time;

/// When a timeline object starts.
///
/// At the top level an `Absolute` value is an epoch time; inside a group it
/// is an offset from the group's start. `Relative` expressions reference
/// other objects (`#<id>.start + 200`, `#<id>.end - 500`) and always yield
/// absolute times. `Logical` expressions start the object once the
/// referenced objects have started (`#a & #b`, `#a | #b`, or `1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Trigger {
    Absolute(Time),
    Now,
    Relative(String),
    Logical(String),
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::Absolute(0)
    }
}

impl Trigger {
    /// The expression text, for triggers that carry one.
    pub fn expression(&self) -> Option<&str> {
        match self {
            Trigger::Relative(e) | Trigger::Logical(e) => Some(e),
            Trigger::Absolute(_) | Trigger::Now => None,
        }
    }
}

/// Length of a timeline object: literal milliseconds or an expression such
/// as `#next.start - #.start` (where `#.` is the object itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Duration {
    Millis(i64),
    Expression(String),
}

impl Duration {
    pub fn expression(&self) -> Option<&str> {
        match self {
            Duration::Expression(e) => Some(e),
            Duration::Millis(_) => None,
        }
    }
}

/// A compiled, device-addressable timed instruction.
///
/// `duration: None` means the object runs until its group ends (or forever
/// at the top level).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineObject {
    pub id: String,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Logical layer; empty for groups.
    #[serde(default)]
    pub layer: String,
    /// Gateway-interpreted payload.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_group: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    /// Not addressed to hardware (callbacks, markers).
    #[serde(default)]
    pub is_abstract: bool,
    /// Same-layer conflicts: lower wins unless `is_override` is set.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_override: bool,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Target devices, resolved from the mapping table at compile time.
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub is_transition: bool,
    #[serde(default)]
    pub is_lookahead: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead_for_layer: Option<String>,
    /// Trigger was `now` and has been snapped to an absolute time.
    #[serde(default)]
    pub was_now: bool,
}

impl TimelineObject {
    /// A leaf object on `layer`.
    pub fn new(id: impl Into<String>, layer: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            layer: layer.into(),
            trigger,
            ..Default::default()
        }
    }

    /// A group object.
    pub fn group(id: impl Into<String>, trigger: Trigger, duration: Option<Duration>) -> Self {
        Self {
            id: id.into(),
            trigger,
            duration,
            is_group: true,
            ..Default::default()
        }
    }

    /// Builder: place inside a group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.in_group = Some(group.into());
        self
    }

    /// Builder: set the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builder: set the gateway payload.
    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    /// The layer used for mapping lookup.
    pub fn mapping_layer(&self) -> &str {
        self.lookahead_for_layer.as_deref().unwrap_or(&self.layer)
    }
}

/// Per-device summary of the persisted timeline, recomputed after every
/// compile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineStat {
    pub device_id: String,
    pub object_count: usize,
    /// SHA-256 over the device's objects in id order.
    pub hash: String,
    pub updated_at: Time,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_serde_shapes() {
        let json = serde_json::to_value(Trigger::Absolute(5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "absolute", "value": 5}));
        let json = serde_json::to_value(Trigger::Now).unwrap();
        assert_eq!(json, serde_json::json!({"type": "now"}));
        let back: Trigger =
            serde_json::from_value(serde_json::json!({"type": "relative", "value": "#a.end"}))
                .unwrap();
        assert_eq!(back, Trigger::Relative("#a.end".into()));
    }

    #[test]
    fn duration_is_untagged() {
        let d: Duration = serde_json::from_str("1500").unwrap();
        assert_eq!(d, Duration::Millis(1500));
        let d: Duration = serde_json::from_str("\"#a.start - #.start\"").unwrap();
        assert_eq!(d.expression(), Some("#a.start - #.start"));
    }

    #[test]
    fn mapping_layer_prefers_lookahead_source() {
        let mut obj = TimelineObject::new("x", "vt_lookahead", Trigger::Absolute(0));
        assert_eq!(obj.mapping_layer(), "vt_lookahead");
        obj.lookahead_for_layer = Some("vt".into());
        assert_eq!(obj.mapping_layer(), "vt");
    }
}
