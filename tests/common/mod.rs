//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`PlayoutService`] to an in-memory
//! DB, a [`ManualClock`] and a [`RecordingNotifier`], plus small builders
//! for fixture documents.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use onair::fixture::{import_fixture, Fixture, ImportSummary};
use onair_core::config::PlayoutConfig;
use onair_core::events::EventPayload;
use onair_core::{ManualClock, PartId, Piece, RundownId, StudioId, Time};
use onair_db::{init_memory_pool, DbPool};
use onair_playout::service::part_id_for;
use onair_playout::{Notifier, PlayoutService, UserActions};

/// Clock value every harness starts at.
pub const START: Time = 1_700_000_000_000;

/// Notifier that keeps every payload it is sent.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EventPayload>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<EventPayload> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, payload: EventPayload) -> onair_core::Result<()> {
        self.sent.lock().push(payload);
        Ok(())
    }
}

/// Playout service backed by an in-memory database.
pub struct TestHarness {
    pub service: Arc<PlayoutService>,
    pub actions: UserActions,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub db: DbPool,
}

impl TestHarness {
    /// Harness with immediate recomputes and no take spacing.
    pub fn new() -> Self {
        Self::with_config(PlayoutConfig {
            min_take_span_ms: 0,
            recompute_debounce_ms: 0,
            ..PlayoutConfig::default()
        })
    }

    pub fn with_config(config: PlayoutConfig) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let clock = Arc::new(ManualClock::new(START));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = PlayoutService::new(db.clone(), config, clock.clone(), notifier.clone());
        let actions = UserActions::new(service.clone());
        Self {
            service,
            actions,
            clock,
            notifier,
            db,
        }
    }

    /// Import `fixture` through the ingest path.
    pub fn import(&self, fixture: &Fixture) -> ImportSummary {
        import_fixture(&self.service, fixture).expect("fixture import failed")
    }

    pub fn rundown_id(&self) -> RundownId {
        RundownId::from("ro1")
    }

    pub fn studio_id(&self) -> StudioId {
        StudioId::from("st1")
    }

    /// Stored id of the part ingested as `external_id`.
    pub fn part(&self, external_id: &str) -> PartId {
        part_id_for(&self.rundown_id(), external_id)
    }

    /// Pieces currently stored on the part ingested as `external_id`.
    pub fn pieces_of(&self, external_id: &str) -> Vec<Piece> {
        let part = self.part(external_id);
        self.service
            .pieces(&self.rundown_id())
            .expect("list pieces")
            .into_iter()
            .filter(|p| p.part_id == part)
            .collect()
    }

    /// The piece on `external_part` whose external id is `external_piece`.
    pub fn piece(&self, external_part: &str, external_piece: &str) -> Piece {
        self.pieces_of(external_part)
            .into_iter()
            .find(|p| p.external_id == external_piece)
            .unwrap_or_else(|| panic!("no piece {external_piece} on {external_part}"))
    }

    /// Take and report the gateway starting the taken part one frame later.
    pub fn take_and_play(&self) {
        self.clock.advance(40);
        let rundown = self.service.take(&self.rundown_id()).expect("take");
        let current = rundown.current_part_id.expect("part on air after take");
        self.clock.advance(40);
        self.service
            .on_part_playback_started(&self.rundown_id(), &current, self.clock_now())
            .expect("playback started");
    }

    pub fn clock_now(&self) -> Time {
        onair_core::Clock::now(self.clock.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// Piece document for the passthrough blueprint with one object on `layer`.
pub fn piece(external_id: &str, layer: &str) -> Value {
    json!({
        "external_id": external_id,
        "source_layer_id": layer,
        "objects": [{ "id": format!("{external_id}_obj"), "layer": layer }]
    })
}

/// Like [`piece`], continuing into later parts.
pub fn infinite_piece(external_id: &str, layer: &str) -> Value {
    let mut value = piece(external_id, layer);
    value["infinite_mode"] = json!("out_on_next_part");
    value
}

/// Part document with `pieces`.
pub fn part(external_id: &str, segment_id: &str, pieces: Vec<Value>) -> Value {
    json!({
        "external_id": external_id,
        "segment_id": segment_id,
        "payload": { "pieces": pieces }
    })
}

/// Studio `st1`, rundown `ro1` with segments `s1` and `s2`, and `parts`.
pub fn fixture(parts: Vec<Value>) -> Fixture {
    serde_json::from_value(json!({
        "studio": {
            "id": "st1",
            "name": "Studio 1",
            "mappings": {
                "cam": { "device_id": "atem" },
                "gfx": { "device_id": "caspar" },
                "audio": { "device_id": "lawo" }
            }
        },
        "rundown": { "id": "ro1", "name": "Evening news" },
        "segments": [
            { "id": "s1", "name": "Opening" },
            { "id": "s2", "name": "Headlines" }
        ],
        "parts": parts
    }))
    .expect("valid fixture")
}

/// Three parts on `cam` in segment `s1`.
pub fn three_part_fixture() -> Fixture {
    fixture(vec![
        part("P1", "s1", vec![piece("P1_cam", "cam")]),
        part("P2", "s1", vec![piece("P2_cam", "cam")]),
        part("P3", "s1", vec![piece("P3_cam", "cam")]),
    ])
}
