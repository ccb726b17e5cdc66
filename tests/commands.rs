//! Every command against a seeded sequence: effect on storage, then undo
//! back to identical rows.

mod common;

use common::{assert_same_rows, fixture, t, Fixture};
use timeline_core::db::schema;
use timeline_core::timeline::find_overlap;
use timeline_core::timeline::ripple::EdgeType;
use timeline_core::{CommandRequest, FrameRate, Rational};

/// V1: a [0,30) b [30,60) c [90,120)   A1: d [0,60)
fn seeded() -> Fixture {
    let mut f = fixture();
    let (v1, a1) = (f.v1.clone(), f.a1.clone());
    f.place(&v1, "a", 0, 30);
    f.place(&v1, "b", 30, 30);
    f.place(&v1, "c", 90, 30);
    f.place(&a1, "d", 0, 60);
    f
}

/// Execute, check something changed, undo, check rows are back exactly.
fn round_trip(f: &mut Fixture, request: &CommandRequest) {
    let before_rows = f.clips();
    let before_hash = f.hash();

    let outcome = f.run(request);
    assert!(outcome.success, "{} failed: {:?}", request.command_type, outcome.error_message);
    assert_ne!(f.hash(), before_hash, "{} changed nothing", request.command_type);
    f.assert_no_overlap();

    let undone = f.engine.undo().unwrap();
    assert!(undone.success, "undo of {} failed", request.command_type);
    assert_eq!(f.hash(), before_hash);
    assert_same_rows(&before_rows, &f.clips());
}

#[test]
fn insert_splits_spanning_clip_and_pushes_track() {
    let mut f = seeded();
    let v1 = f.v1.clone();
    let request = f.placement("Insert", &v1, "new", 45, 10);
    f.run(&request);

    assert_eq!(f.span("a"), (0, 30));
    assert_eq!(f.span("b"), (30, 45));
    assert_eq!(f.span("new"), (45, 55));
    assert_eq!(f.span("c"), (100, 130));
    // Tail of b moved past the new clip with a fresh id.
    let tail = f
        .clips()
        .into_iter()
        .find(|c| !["a", "b", "c", "d", "new"].contains(&c.id.as_str()))
        .expect("tail of split clip");
    assert_eq!((tail.timeline_start.frames(), tail.end().frames()), (55, 70));
    assert_eq!(tail.source_in.frames(), 15);
    f.assert_no_overlap();
    // Other tracks are untouched.
    assert_eq!(f.span("d"), (0, 60));

    let mut f = seeded();
    let v1 = f.v1.clone();
    let request = f.placement("Insert", &v1, "new", 45, 10);
    round_trip(&mut f, &request);
}

#[test]
fn overwrite_round_trip() {
    let mut f = seeded();
    let v1 = f.v1.clone();
    let request = f.placement("Overwrite", &v1, "over", 20, 50);
    round_trip(&mut f, &request);

    f.run(&request);
    assert_eq!(f.span("a"), (0, 20));
    assert!(!f.exists("b"));
    assert_eq!(f.span("c"), (90, 120));
}

#[test]
fn cut_round_trip() {
    let mut f = seeded();
    let request = CommandRequest::new("Cut").with("clip_ids", vec!["a", "c"]).unwrap();
    round_trip(&mut f, &request);

    f.run(&request);
    assert!(!f.exists("a"));
    assert!(!f.exists("c"));
    assert_eq!(f.span("b"), (30, 60));
}

#[test]
fn move_clip_to_track_round_trip() {
    let mut f = seeded();
    let v2 = f.v2.clone();
    let request = CommandRequest::new("MoveClipToTrack")
        .with("clip_id", "b")
        .unwrap()
        .with("target_track_id", &v2)
        .unwrap()
        .with("start", t(10))
        .unwrap();
    round_trip(&mut f, &request);

    f.run(&request);
    let b = f.clip("b");
    assert_eq!(b.track_id.as_deref(), Some(v2.as_str()));
    assert_eq!(f.span("b"), (10, 40));
}

#[test]
fn move_onto_occupied_track_clears_the_destination() {
    let mut f = seeded();
    let a1 = f.a1.clone();
    let request = CommandRequest::new("MoveClipToTrack")
        .with("clip_id", "c")
        .unwrap()
        .with("target_track_id", &a1)
        .unwrap()
        .with("start", t(50))
        .unwrap();
    f.run(&request);

    assert_eq!(f.span("d"), (0, 50));
    assert_eq!(f.span("c"), (50, 80));
    f.assert_no_overlap();
}

#[test]
fn duplicate_clips_round_trip() {
    let mut f = seeded();
    let request = CommandRequest::new("DuplicateClips")
        .with("clip_ids", vec!["a", "b"])
        .unwrap()
        .with("offset", t(200))
        .unwrap();
    round_trip(&mut f, &request);

    f.run(&request);
    assert_eq!(f.clips().len(), 6);
    let copies: Vec<(i64, i64)> = f
        .clips()
        .iter()
        .filter(|c| c.timeline_start >= t(200))
        .map(|c| (c.timeline_start.frames(), c.end().frames()))
        .collect();
    assert_eq!(copies, vec![(200, 230), (230, 260)]);
}

#[test]
fn duplicates_landing_on_each_other_do_not_overlap() {
    let mut f = seeded();
    let request = CommandRequest::new("DuplicateClips")
        .with("clip_ids", vec!["a", "b"])
        .unwrap()
        .with("offset", t(15))
        .unwrap();
    let outcome = f.run(&request);
    assert!(outcome.success);
    f.assert_no_overlap();
}

#[test]
fn duplicating_onto_a_slower_sequence_clears_partial_frames() {
    let mut f = fixture();
    let v1 = f.v1.clone();
    let w1 = f.add_sequence(FrameRate::FPS_24);
    let dest = f
        .placement("Overwrite", &w1, "dest", 0, 0)
        .with("duration", Rational::from_frames(10, FrameRate::FPS_24))
        .unwrap();
    assert!(f.run(&dest).success);
    // 2@30 is 1.6 frames at 24fps, inside dest.
    f.place(&v1, "src", 2, 10);

    let request = CommandRequest::new("DuplicateClips")
        .with("clip_ids", vec!["src"])
        .unwrap()
        .with("offset", t(0))
        .unwrap()
        .with("target_track_id", &w1)
        .unwrap();
    let outcome = f.run(&request);
    assert!(outcome.success, "{:?}", outcome.error_message);

    let dest = f.clip("dest");
    assert_eq!((dest.timeline_start.frames(), dest.end().frames()), (0, 1));
    let clips = schema::get_clips_for_track(f.engine.conn(), &w1).unwrap();
    assert_eq!(clips.len(), 2);
    assert!(find_overlap(&clips).is_none());
}

#[test]
fn ripple_delete_round_trip() {
    let mut f = seeded();
    let v1 = f.v1.clone();
    let request = CommandRequest::new("RippleDelete")
        .with("track_id", &v1)
        .unwrap()
        .with("gap_start", t(60))
        .unwrap()
        .with("gap_duration", t(30))
        .unwrap();
    round_trip(&mut f, &request);

    f.run(&request);
    assert_eq!(f.span("c"), (60, 90));
    assert_eq!(f.span("b"), (30, 60));
}

#[test]
fn ripple_delete_selection_round_trip() {
    let mut f = seeded();
    let request = CommandRequest::new("RippleDeleteSelection")
        .with("clip_ids", vec!["b"])
        .unwrap();
    round_trip(&mut f, &request);

    f.run(&request);
    assert!(!f.exists("b"));
    assert_eq!(f.span("a"), (0, 30));
    assert_eq!(f.span("c"), (60, 90));
}

#[test]
fn ripple_edit_round_trip() {
    let mut f = seeded();
    let request = CommandRequest::new("RippleEdit")
        .with("clip_id", "a")
        .unwrap()
        .with("edge", EdgeType::Out)
        .unwrap()
        .with("delta", t(10))
        .unwrap();
    round_trip(&mut f, &request);

    f.run(&request);
    assert_eq!(f.span("a"), (0, 40));
    assert_eq!(f.span("b"), (40, 70));
    assert_eq!(f.span("c"), (100, 130));
}

#[test]
fn link_and_unlink_round_trip() {
    let mut f = seeded();
    let link = CommandRequest::new("LinkClips").with("clip_ids", vec!["a", "d"]).unwrap();
    round_trip(&mut f, &link);

    f.run(&link);
    let group = schema::get_link_group_for_clip(f.engine.conn(), "a")
        .unwrap()
        .expect("group");
    assert_eq!(group.members.len(), 2);
    assert!(group.contains("d"));

    let unlink = CommandRequest::new("UnlinkClip").with("clip_id", "d").unwrap();
    round_trip(&mut f, &unlink);

    f.run(&unlink);
    assert!(schema::get_link_group_for_clip(f.engine.conn(), "a").unwrap().is_none());
}

#[test]
fn cutting_a_linked_clip_dissolves_a_pair_and_undo_restores_it() {
    let mut f = seeded();
    f.run(&CommandRequest::new("LinkClips").with("clip_ids", vec!["a", "d"]).unwrap());
    let group = schema::get_link_group_for_clip(f.engine.conn(), "d").unwrap();

    f.run(&CommandRequest::new("Cut").with("clip_ids", vec!["a"]).unwrap());
    assert!(schema::get_link_group_for_clip(f.engine.conn(), "d").unwrap().is_none());

    f.engine.undo().unwrap();
    assert_eq!(schema::get_link_group_for_clip(f.engine.conn(), "d").unwrap(), group);
}

#[test]
fn redo_reapplies_the_same_state() {
    let mut f = seeded();
    let request = CommandRequest::new("RippleDeleteSelection")
        .with("clip_ids", vec!["a"])
        .unwrap();
    let before = f.hash();
    f.run(&request);
    let after = f.hash();
    let after_rows = f.clips();

    f.engine.undo().unwrap();
    assert_eq!(f.hash(), before);
    assert!(f.engine.can_redo());

    let redone = f.engine.redo().unwrap();
    assert!(redone.success);
    assert_eq!(f.hash(), after);
    assert_same_rows(&after_rows, &f.clips());

    // A new command drops the redo stack.
    f.engine.undo().unwrap();
    f.run(&CommandRequest::new("Cut").with("clip_ids", vec!["c"]).unwrap());
    assert!(!f.engine.can_redo());
}
