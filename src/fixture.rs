//! Rundown fixtures: a studio, one rundown and its segments and parts in a
//! single JSON document, fed through the regular ingest path.
//!
//! ```json
//! {
//!   "studio": { "id": "st1", "name": "Studio 1", "mappings": { "cam": { "device_id": "atem" } } },
//!   "rundown": { "id": "ro1", "name": "Evening news" },
//!   "segments": [{ "id": "s1", "name": "Opening" }],
//!   "parts": [{ "external_id": "P1", "segment_id": "s1", "payload": { "pieces": [] } }]
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use onair_core::{HoldMode, Part, PartId, Rundown, RundownId, Segment, SegmentId, Studio};
use onair_playout::PlayoutService;

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub studio: Studio,
    pub rundown: RundownFixture,
    #[serde(default)]
    pub segments: Vec<SegmentFixture>,
    #[serde(default)]
    pub parts: Vec<PartFixture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RundownFixture {
    pub id: RundownId,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentFixture {
    pub id: SegmentId,
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to the position in the list.
    #[serde(default)]
    pub rank: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartFixture {
    pub external_id: String,
    pub segment_id: SegmentId,
    /// Defaults to the position in the list.
    #[serde(default)]
    pub rank: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub expected_duration: Option<i64>,
    #[serde(default)]
    pub auto_next: bool,
    #[serde(default)]
    pub auto_next_overlap: Option<i64>,
    #[serde(default)]
    pub transition_duration: Option<i64>,
    #[serde(default)]
    pub overlap_duration: Option<i64>,
    #[serde(default)]
    pub hold_mode: HoldMode,
    #[serde(default)]
    pub disable_out_transition: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// What an import wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub studio_id: String,
    pub rundown_id: String,
    pub segments: usize,
    /// Stored part ids, in fixture order.
    pub parts: Vec<PartId>,
}

/// Read a fixture from a JSON file.
pub fn load_fixture(path: &Path) -> Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse fixture: {:?}", path))
}

impl PartFixture {
    fn to_part(&self, rundown_id: &RundownId, position: usize) -> Part {
        let mut part = Part::new(
            self.external_id.as_str(),
            rundown_id.clone(),
            self.segment_id.clone(),
            self.rank.unwrap_or(position as f64),
        );
        part.external_id = self.external_id.clone();
        if let Some(title) = &self.title {
            part.title = title.clone();
        }
        part.expected_duration = self.expected_duration;
        part.auto_next = self.auto_next;
        part.auto_next_overlap = self.auto_next_overlap;
        part.transition_duration = self.transition_duration;
        part.overlap_duration = self.overlap_duration;
        part.hold_mode = self.hold_mode;
        part.disable_out_transition = self.disable_out_transition;
        part.payload = self.payload.clone();
        part
    }
}

/// Ingest every document of `fixture`.
pub fn import_fixture(service: &PlayoutService, fixture: &Fixture) -> onair_core::Result<ImportSummary> {
    service.ingest_studio(&fixture.studio)?;

    let mut rundown = Rundown::new(fixture.rundown.id.clone(), fixture.studio.id.clone());
    if let Some(external_id) = &fixture.rundown.external_id {
        rundown.external_id = external_id.clone();
    }
    if let Some(name) = &fixture.rundown.name {
        rundown.name = name.clone();
    }
    rundown.payload = fixture.rundown.payload.clone();
    let rundown = service.ingest_rundown(&rundown)?;

    for (position, spec) in fixture.segments.iter().enumerate() {
        let mut segment = Segment::new(spec.id.clone(), rundown.id.clone(), spec.rank.unwrap_or(position as f64));
        if let Some(name) = &spec.name {
            segment.name = name.clone();
        }
        service.ingest_segment(&segment)?;
    }

    let mut parts = Vec::with_capacity(fixture.parts.len());
    for (position, spec) in fixture.parts.iter().enumerate() {
        parts.push(service.ingest_part(&spec.to_part(&rundown.id, position))?);
    }

    tracing::info!(
        rundown_id = %rundown.id,
        segments = fixture.segments.len(),
        parts = parts.len(),
        "Fixture imported"
    );
    Ok(ImportSummary {
        studio_id: fixture.studio.id.to_string(),
        rundown_id: rundown.id.to_string(),
        segments: fixture.segments.len(),
        parts,
    })
}
