//! Integration tests for infinite continuation across parts and for the
//! timeline the studio ends up with.

mod common;

use common::{fixture, infinite_piece, part, piece, TestHarness};
use onair_core::{Duration, Piece};
use onair_playout::infinites::continuation_id;
use onair_resolver::{resolve, ResolveOptions};
use serde_json::json;

fn continuations(pieces: &[Piece]) -> Vec<&Piece> {
    pieces.iter().filter(|p| p.is_continuation()).collect()
}

/// P1 starts graphic A; P3 replaces it with B.
fn supersede_fixture() -> onair::fixture::Fixture {
    fixture(vec![
        part("P1", "s1", vec![piece("P1_cam", "cam"), infinite_piece("A", "gfx")]),
        part("P2", "s1", vec![piece("P2_cam", "cam")]),
        part("P3", "s1", vec![piece("P3_cam", "cam"), piece("B", "gfx")]),
        part("P4", "s1", vec![piece("P4_cam", "cam")]),
    ])
}

#[test]
fn superseded_infinite_stops_at_the_new_piece() {
    let h = TestHarness::new();
    h.import(&supersede_fixture());

    let a = h.piece("P1", "A");
    let b = h.piece("P3", "B");
    assert_eq!(a.infinite_id.as_ref(), Some(&a.id));

    let on_p2 = continuations(&h.pieces_of("P2"))
        .into_iter()
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(on_p2.len(), 1);
    assert_eq!(on_p2[0].id, continuation_id(&a.id, &h.part("P2")));
    assert_eq!(on_p2[0].infinite_id.as_ref(), Some(&a.id));

    assert!(continuations(&h.pieces_of("P3")).is_empty());
    assert!(continuations(&h.pieces_of("P4")).is_empty());

    let cap = Duration::Expression(format!("#piece_group_{}.start - #.start", b.id));
    assert_eq!(a.infinite_cap, Some(cap.clone()));
    assert_eq!(on_p2[0].infinite_cap, Some(cap));
}

#[test]
fn recompute_twice_yields_identical_continuations() {
    let h = TestHarness::new();
    h.import(&supersede_fixture());
    let ro = h.rundown_id();

    h.service.recompute(&ro).unwrap();
    let first = h.service.pieces(&ro).unwrap();
    h.service.recompute(&ro).unwrap();
    let second = h.service.pieces(&ro).unwrap();

    assert_eq!(first, second);
    assert_eq!(continuations(&first), continuations(&second));
}

#[test]
fn removing_the_superseding_piece_extends_the_run() {
    let h = TestHarness::new();
    h.import(&supersede_fixture());
    let ro = h.rundown_id();

    // Re-ingest P3 without B.
    let mut p3 = h
        .service
        .parts(&ro)
        .unwrap()
        .into_iter()
        .find(|p| p.external_id == "P3")
        .unwrap();
    p3.payload = json!({ "pieces": [piece("P3_cam", "cam")] });
    h.service.ingest_part(&p3).unwrap();

    let a = h.piece("P1", "A");
    assert!(a.infinite_cap.is_none());
    for external in ["P2", "P3", "P4"] {
        let copies = h.pieces_of(external);
        let copies = continuations(&copies);
        assert_eq!(copies.len(), 1, "continuation on {external}");
        assert_eq!(copies[0].id, continuation_id(&a.id, &h.part(external)));
    }
}

#[test]
fn continuation_plays_on_its_own_group() {
    let h = TestHarness::new();
    h.import(&supersede_fixture());
    let ro = h.rundown_id();
    h.service.activate(&ro, false).unwrap();

    h.take_and_play();
    h.take_and_play();

    let a = h.piece("P1", "A");
    let timeline = h.service.timeline(&h.studio_id()).unwrap();
    assert!(timeline.iter().any(|o| o.id == format!("infinite_group_{}", a.id)));
    assert_eq!(timeline.iter().filter(|o| o.id == "A_obj").count(), 1);

    let state = h.service.state_at(&h.studio_id(), h.clock_now() + 10).unwrap();
    assert_eq!(state.get("gfx").map(|o| o.id.as_str()), Some("A_obj"));
    assert_eq!(state.get("cam").map(|o| o.id.as_str()), Some("P2_cam_obj"));
}

#[test]
fn previous_part_ends_at_current_start_plus_overlap() {
    let h = TestHarness::new();
    let mut p2 = part("P2", "s1", vec![piece("P2_cam", "cam")]);
    p2["transition_duration"] = json!(400);
    h.import(&fixture(vec![
        part("P1", "s1", vec![piece("P1_cam", "cam")]),
        p2,
        part("P3", "s1", vec![piece("P3_cam", "cam")]),
    ]));
    let ro = h.rundown_id();
    let previous_group = format!("previous_part_group_{}", h.part("P1"));
    h.service.activate(&ro, false).unwrap();

    h.take_and_play();
    h.take_and_play();
    let started = h.clock_now();

    let timeline = h.service.timeline(&h.studio_id()).unwrap();
    let resolution = resolve(&timeline, &ResolveOptions { now: started });
    assert_eq!(resolution.end_of(&previous_group), Some(Some(started + 400)));

    // The gateway reports a later start for the current part.
    let shifted = started + 1_000;
    h.service
        .on_part_playback_started(&ro, &h.part("P2"), shifted)
        .unwrap();
    let timeline = h.service.timeline(&h.studio_id()).unwrap();
    let resolution = resolve(&timeline, &ResolveOptions { now: shifted });
    assert_eq!(resolution.end_of(&previous_group), Some(Some(shifted + 400)));
}
