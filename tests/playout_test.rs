//! Integration tests for the rundown state machine: activation, takes,
//! reset, deactivation and ad-libs, driven through ingested fixtures.

mod common;

use assert_matches::assert_matches;

use common::{fixture, part, piece, three_part_fixture, TestHarness};
use onair_core::config::PlayoutConfig;
use onair_core::events::{EventPayload, StoryStatus};
use onair_core::{Error, Rundown};
use serde_json::json;

fn pointers(rundown: &Rundown) -> (Option<String>, Option<String>) {
    (
        rundown.current_part_id.as_ref().map(|p| p.to_string()),
        rundown.next_part_id.as_ref().map(|p| p.to_string()),
    )
}

// ---------------------------------------------------------------------------
// Full show
// ---------------------------------------------------------------------------

#[test]
fn rehearsal_show_from_activation_to_deactivation() {
    let h = TestHarness::new();
    h.import(&three_part_fixture());
    let ro = h.rundown_id();
    let p1 = Some(h.part("P1").to_string());
    let p2 = Some(h.part("P2").to_string());
    let p3 = Some(h.part("P3").to_string());

    let rundown = h.service.activate(&ro, true).unwrap();
    assert!(rundown.active);
    assert!(rundown.rehearsal);
    assert_eq!(pointers(&rundown), (None, p1.clone()));

    h.clock.advance(2_000);
    let rundown = h.service.take(&ro).unwrap();
    assert_eq!(pointers(&rundown), (p1.clone(), p2.clone()));

    h.clock.advance(2_000);
    let rundown = h.service.take(&ro).unwrap();
    assert_eq!(pointers(&rundown), (p2.clone(), p3));
    assert_eq!(rundown.previous_part_id.map(|p| p.to_string()), p1.clone());

    let rundown = h.service.reset_rundown(&ro).unwrap();
    assert_eq!(pointers(&rundown), (None, p1));
    assert!(rundown.previous_part_id.is_none());

    let rundown = h.service.deactivate(&ro).unwrap();
    assert!(!rundown.active);
    assert_eq!(pointers(&rundown), (None, None));
    assert!(h.service.timeline(&h.studio_id()).unwrap().is_empty());
}

#[test]
fn every_take_moves_next_to_the_following_part() {
    let h = TestHarness::new();
    h.import(&fixture(vec![
        part("P1", "s1", vec![piece("P1_cam", "cam")]),
        part("P2", "s1", vec![piece("P2_cam", "cam")]),
        part("P3", "s2", vec![piece("P3_cam", "cam")]),
        part("P4", "s2", vec![piece("P4_cam", "cam")]),
    ]));
    let ro = h.rundown_id();
    h.service.activate(&ro, false).unwrap();

    let order: Vec<_> = h.service.parts(&ro).unwrap().into_iter().map(|p| p.id).collect();
    for (i, expected) in order.iter().enumerate() {
        h.clock.advance(1_500);
        let rundown = h.service.take(&ro).unwrap();
        assert_eq!(rundown.current_part_id.as_ref(), Some(expected));
        assert_ne!(rundown.current_part_id, rundown.next_part_id);
        assert_eq!(rundown.next_part_id.as_ref(), order.get(i + 1));
    }

    h.clock.advance(1_500);
    assert_matches!(h.service.take(&ro), Err(Error::InvalidState(_)));
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[test]
fn only_one_rundown_per_studio_is_active() {
    let h = TestHarness::new();
    h.import(&three_part_fixture());
    h.service
        .ingest_rundown(&Rundown::new("ro2", "st1"))
        .unwrap();

    h.service.activate(&h.rundown_id(), false).unwrap();
    assert_matches!(
        h.service.activate(&"ro2".into(), false),
        Err(Error::Conflict(_))
    );

    assert!(!h.service.rundown(&"ro2".into()).unwrap().active);
    let active = h.service.active_rundown(&h.studio_id()).unwrap().unwrap();
    assert_eq!(active.id, h.rundown_id());

    // Re-activating the active rundown only flips rehearsal.
    let again = h.service.activate(&h.rundown_id(), true).unwrap();
    assert!(again.active);
    assert!(again.rehearsal);
}

#[test]
fn second_take_inside_min_span_leaves_state_unchanged() {
    let h = TestHarness::with_config(PlayoutConfig {
        min_take_span_ms: 1_000,
        recompute_debounce_ms: 0,
        ..PlayoutConfig::default()
    });
    h.import(&three_part_fixture());
    let ro = h.rundown_id();
    h.service.activate(&ro, false).unwrap();

    let first = h.service.take(&ro).unwrap();
    let timeline = h.service.timeline(&h.studio_id()).unwrap();

    h.clock.advance(200);
    assert_matches!(h.service.take(&ro), Err(Error::TooSoon(_)));

    let after = h.service.rundown(&ro).unwrap();
    assert_eq!(pointers(&after), pointers(&first));
    assert_eq!(h.service.timeline(&h.studio_id()).unwrap(), timeline);

    h.clock.advance(1_000);
    let rundown = h.service.take(&ro).unwrap();
    assert_eq!(rundown.current_part_id, Some(h.part("P2")));
}

#[test]
fn user_actions_report_errors_as_responses() {
    let h = TestHarness::new();
    h.import(&three_part_fixture());

    let response = h.actions.take(&h.rundown_id());
    assert!(!response.is_success());
    assert!(response.error_code().is_some());

    let response = h.actions.activate(&h.rundown_id(), false);
    assert!(response.is_success());
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[test]
fn take_notifies_story_status_after_commit() {
    let h = TestHarness::new();
    h.import(&three_part_fixture());
    let ro = h.rundown_id();
    h.service.activate(&ro, false).unwrap();
    h.notifier.take();

    h.service.take(&ro).unwrap();
    let sent = h.notifier.take();

    let p1 = h.part("P1");
    let p2 = h.part("P2");
    assert!(sent.iter().any(|e| matches!(
        e,
        EventPayload::PartTaken { part_id, previous_part_id: None, .. } if *part_id == p1
    )));
    assert!(sent.iter().any(|e| matches!(
        e,
        EventPayload::StoryStatus { part_id, status: StoryStatus::OnAir, .. } if *part_id == p1
    )));
    assert!(sent.iter().any(|e| matches!(
        e,
        EventPayload::StoryStatus { part_id, status: StoryStatus::Next, .. } if *part_id == p2
    )));
    assert!(sent
        .iter()
        .any(|e| matches!(e, EventPayload::TimelineUpdated { .. })));
}

#[test]
fn failed_take_sends_nothing() {
    let h = TestHarness::new();
    h.import(&three_part_fixture());
    h.notifier.take();

    assert!(h.service.take(&h.rundown_id()).is_err());
    assert!(h.notifier.take().is_empty());
}

// ---------------------------------------------------------------------------
// Ad-libs
// ---------------------------------------------------------------------------

#[test]
fn adlib_lands_in_the_part_on_air() {
    let h = TestHarness::new();
    let mut p1 = part("P1", "s1", vec![piece("P1_cam", "cam")]);
    p1["payload"]["adlibs"] = json!([{
        "external_id": "lower_third",
        "source_layer_id": "gfx",
        "objects": [{ "id": "lower_third_obj", "layer": "gfx" }]
    }]);
    h.import(&fixture(vec![p1, part("P2", "s1", vec![piece("P2_cam", "cam")])]));
    let ro = h.rundown_id();

    let adlibs = h.service.adlibs(&ro).unwrap();
    assert_eq!(adlibs.len(), 1);
    let adlib = adlibs[0].clone();

    // Nothing is on air yet.
    h.service.activate(&ro, false).unwrap();
    assert!(!h.actions.start_adlib(&ro, &adlib.id).is_success());

    h.take_and_play();
    let piece_id = h.service.start_adlib(&ro, &adlib.id).unwrap();

    let inserted = h
        .pieces_of("P1")
        .into_iter()
        .find(|p| p.id == piece_id)
        .expect("ad-lib piece stored on the current part");
    assert!(inserted.dynamically_inserted);
    assert_eq!(inserted.adlib_source_id.as_ref(), Some(&adlib.id));
    assert_eq!(inserted.source_layer_id, "gfx");

    // Played pieces are dropped when the part is prepared as next again.
    h.clock.advance(1_000);
    h.service.reset_rundown(&ro).unwrap();
    assert!(h.pieces_of("P1").iter().all(|p| !p.dynamically_inserted));
}
