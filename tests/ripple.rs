mod common;

use common::{assert_same_rows, fixture, t, Fixture};
use timeline_core::media::StaticMediaProvider;
use timeline_core::timeline::ripple::EdgeType;
use timeline_core::CommandRequest;

/// V1: a [0,30) b [30,60) c [90,120)   A1: d [0,60) e [100,110)
fn seeded() -> Fixture {
    let mut f = fixture();
    let (v1, a1) = (f.v1.clone(), f.a1.clone());
    f.place(&v1, "a", 0, 30);
    f.place(&v1, "b", 30, 30);
    f.place(&v1, "c", 90, 30);
    f.place(&a1, "d", 0, 60);
    f.place(&a1, "e", 100, 10);
    f
}

fn edge(clip_id: &str, edge: EdgeType, delta: i64) -> CommandRequest {
    CommandRequest::new("RippleEdit")
        .with("clip_id", clip_id)
        .unwrap()
        .with("edge", edge)
        .unwrap()
        .with("delta", t(delta))
        .unwrap()
}

#[test]
fn gap_that_is_not_clear_is_refused() {
    let mut f = seeded();
    let v1 = f.v1.clone();
    let before = f.hash();
    let request = CommandRequest::new("RippleDelete")
        .with("track_id", &v1)
        .unwrap()
        .with("gap_start", t(20))
        .unwrap()
        .with("gap_duration", t(30))
        .unwrap();

    let outcome = f.run(&request);
    assert!(!outcome.success);
    assert_eq!(outcome.error_code, Some("RIPPLE_GAP_NOT_CLEAR"));
    assert_eq!(f.hash(), before);
}

#[test]
fn gap_blocked_on_another_track_is_refused() {
    let mut f = seeded();
    let (v1, v2) = (f.v1.clone(), f.v2.clone());
    f.place(&v2, "g", 70, 10);
    // [60,90) is empty on V1 but not on V2.
    let request = CommandRequest::new("RippleDelete")
        .with("track_id", &v1)
        .unwrap()
        .with("gap_start", t(60))
        .unwrap()
        .with("gap_duration", t(30))
        .unwrap();
    let outcome = f.run(&request);
    assert_eq!(outcome.error_code, Some("RIPPLE_GAP_NOT_CLEAR"));
}

#[test]
fn gap_ripple_without_track_shifts_every_track() {
    let mut f = seeded();
    let sequence_id = f.sequence_id.clone();
    let request = CommandRequest::new("RippleDelete")
        .with("sequence_id", &sequence_id)
        .unwrap()
        .with("gap_start", t(60))
        .unwrap()
        .with("gap_duration", t(30))
        .unwrap();
    assert!(f.run(&request).success);

    assert_eq!(f.span("c"), (60, 90));
    assert_eq!(f.span("e"), (70, 80));
    assert_eq!(f.span("d"), (0, 60));
}

#[test]
fn gap_ripple_falls_back_to_the_active_sequence() {
    let mut f = seeded();
    let request = CommandRequest::new("RippleDelete")
        .with("gap_start", t(60))
        .unwrap()
        .with("gap_duration", t(30))
        .unwrap();
    assert_eq!(f.run(&request).error_code, Some("SESSION_NO_ACTIVE_SEQUENCE"));

    let sequence_id = f.sequence_id.clone();
    f.engine.activate_sequence(&sequence_id).unwrap();
    assert!(f.run(&request).success);
    assert_eq!(f.span("c"), (60, 90));
}

#[test]
fn selection_ripple_closes_merged_segments_across_tracks() {
    let mut f = seeded();
    let request = CommandRequest::new("RippleDeleteSelection")
        .with("clip_ids", vec!["a", "b"])
        .unwrap();
    assert!(f.run(&request).success);

    assert_eq!(f.span("c"), (30, 60));
    // d starts before the removed range and stays; e moves with the timeline.
    assert_eq!(f.span("d"), (0, 60));
    assert_eq!(f.span("e"), (60, 70));
    f.assert_no_overlap();
}

#[test]
fn selection_ripple_never_pulls_a_clip_into_its_neighbour() {
    let mut f = seeded();
    let a1 = f.a1.clone();
    f.place(&a1, "f", 40, 20);
    let request = CommandRequest::new("RippleDeleteSelection")
        .with("clip_ids", vec!["b"])
        .unwrap();
    // d was trimmed to [0,40) by f. e (start 100) would move to 70; f stays.
    assert!(f.run(&request).success);
    assert_eq!(f.span("f"), (40, 60));
    assert_eq!(f.span("e"), (70, 80));
    f.assert_no_overlap();
}

#[test]
fn selection_ripple_uses_the_session_selection() {
    let mut f = seeded();
    let sequence_id = f.sequence_id.clone();
    f.engine.activate_sequence(&sequence_id).unwrap();

    let request = CommandRequest::new("RippleDeleteSelection");
    assert_eq!(f.run(&request).error_code, Some("COMMAND_REJECTED"));

    f.engine.session_mut().unwrap().select(vec!["b".to_string()]);
    assert!(f.run(&request).success);
    assert!(!f.exists("b"));
    assert_eq!(f.span("c"), (60, 90));
    assert!(f.engine.session().unwrap().selection().is_empty());
}

#[test]
fn cached_and_stored_selection_ripple_agree() {
    let mut f = seeded();
    let sequence_id = f.sequence_id.clone();
    let request = CommandRequest::new("RippleDeleteSelection")
        .with("clip_ids", vec!["a", "c"])
        .unwrap();

    f.engine.activate_sequence(&sequence_id).unwrap();
    assert!(f.engine.cache().is_valid_for(&sequence_id));
    assert!(f.run(&request).success);
    let from_cache = f.clips();
    f.engine.undo().unwrap();

    f.engine.deactivate_sequence().unwrap();
    assert!(!f.engine.cache().is_valid_for(&sequence_id));
    assert!(f.run(&request).success);
    assert_same_rows(&from_cache, &f.clips());
}

#[test]
fn out_edge_is_clamped_to_the_end_of_media() {
    let mut f = fixture();
    let v1 = f.v1.clone();
    let request = f
        .placement("Overwrite", &v1, "tail", 0, 50)
        .with("source_in", t(common::MEDIA_FRAMES - 100))
        .unwrap();
    assert!(f.run(&request).success);

    let outcome = f.run(&edge("tail", EdgeType::Out, 100));
    assert!(outcome.success);
    assert!(outcome.note.is_some());
    let clip = f.clip("tail");
    assert_eq!(f.span("tail"), (0, 100));
    assert_eq!(clip.source_out.frames(), common::MEDIA_FRAMES);
}

#[test]
fn out_edge_needs_known_media() {
    let mut f = seeded();
    let before = f.hash();
    f.engine.set_media_provider(Box::new(StaticMediaProvider::new()));

    let outcome = f.run(&edge("a", EdgeType::Out, 10));
    assert!(!outcome.success);
    assert_eq!(outcome.error_code, Some("MEDIA_NOT_FOUND"));
    assert_eq!(f.hash(), before);
}

#[test]
fn in_edge_trims_the_head_and_pulls_the_timeline() {
    let mut f = seeded();
    assert!(f.run(&edge("a", EdgeType::In, 10)).success);

    let a = f.clip("a");
    assert_eq!(f.span("a"), (0, 20));
    assert_eq!(a.source_in.frames(), 10);
    assert_eq!(f.span("b"), (20, 50));
    assert_eq!(f.span("c"), (80, 110));
    assert_eq!(f.span("e"), (90, 100));
    f.assert_no_overlap();
}

#[test]
fn gap_before_pull_stops_at_the_previous_clip() {
    let mut f = seeded();
    let outcome = f.run(&edge("c", EdgeType::GapBefore, -50));
    assert!(outcome.success);
    assert!(outcome.note.is_some());
    assert_eq!(f.span("c"), (60, 90));
    assert_eq!(f.span("e"), (70, 80));
}

#[test]
fn edit_clamped_to_nothing_succeeds_without_history() {
    let mut f = seeded();
    let depth = f.engine.history().undo_depth();
    let before = f.hash();

    let outcome = f.run(&edge("b", EdgeType::GapBefore, -10));
    assert!(outcome.success);
    assert_eq!(f.hash(), before);
    assert_eq!(f.engine.history().undo_depth(), depth);
}
