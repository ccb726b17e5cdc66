//! Shared fixture: an in-memory engine holding one 30 fps sequence with two
//! video tracks, one audio track and a 600-frame media file.

#![allow(dead_code)]

use timeline_core::db::schema::{self, Project};
use timeline_core::timeline::{find_overlap, Media};
use timeline_core::{Clip, CommandOutcome, CommandRequest, Engine, EngineConfig, FrameRate, Rational, Sequence, Track, TrackKind};

pub const MEDIA_FRAMES: i64 = 600;

pub fn t(frames: i64) -> Rational {
    Rational::from_frames(frames, FrameRate::FPS_30)
}

pub struct Fixture {
    pub engine: Engine,
    pub sequence_id: String,
    pub v1: String,
    pub v2: String,
    pub a1: String,
    pub media_id: String,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

pub fn fixture_with(config: EngineConfig) -> Fixture {
    let engine = Engine::open(config).expect("open engine");
    let conn = engine.conn();
    schema::insert_project(
        conn,
        &Project {
            id: "project".into(),
            name: "Project".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        },
    )
    .unwrap();
    let sequence = Sequence::new("project", "Main", FrameRate::FPS_30, 1920, 1080);
    schema::insert_sequence(conn, &sequence).unwrap();

    let v1 = Track::new(&sequence.id, TrackKind::Video, 1);
    let v2 = Track::new(&sequence.id, TrackKind::Video, 2);
    let a1 = Track::new(&sequence.id, TrackKind::Audio, 1);
    for track in [&v1, &v2, &a1] {
        schema::insert_track(conn, track).unwrap();
    }

    let media = Media {
        id: "media-1".into(),
        project_id: "project".into(),
        name: "interview.mov".into(),
        file_path: "/footage/interview.mov".into(),
        duration: t(MEDIA_FRAMES),
    };
    schema::insert_media(conn, &media).unwrap();

    Fixture {
        engine,
        sequence_id: sequence.id,
        v1: v1.id,
        v2: v2.id,
        a1: a1.id,
        media_id: media.id,
    }
}

impl Fixture {
    /// A second sequence in the same project at `rate`, with one video track.
    /// Returns the track id.
    pub fn add_sequence(&mut self, rate: FrameRate) -> String {
        let conn = self.engine.conn();
        let sequence = Sequence::new("project", "Alt", rate, 1920, 1080);
        schema::insert_sequence(conn, &sequence).unwrap();
        let track = Track::new(&sequence.id, TrackKind::Video, 1);
        schema::insert_track(conn, &track).unwrap();
        track.id
    }

    pub fn placement(&self, command: &str, track_id: &str, id: &str, start: i64, duration: i64) -> CommandRequest {
        CommandRequest::new(command)
            .with("track_id", track_id)
            .unwrap()
            .with("clip_id", id)
            .unwrap()
            .with("start", t(start))
            .unwrap()
            .with("duration", t(duration))
            .unwrap()
            .with("media_id", &self.media_id)
            .unwrap()
    }

    /// Overwrite a clip with a chosen id onto `track_id`.
    pub fn place(&mut self, track_id: &str, id: &str, start: i64, duration: i64) {
        let request = self.placement("Overwrite", track_id, id, start, duration);
        let outcome = self.engine.execute(&request).expect("place clip");
        assert!(outcome.success, "placing {id} failed: {:?}", outcome.error_message);
    }

    pub fn run(&mut self, request: &CommandRequest) -> CommandOutcome {
        self.engine.execute(request).expect("command should pass validation")
    }

    pub fn clip(&self, id: &str) -> Clip {
        schema::get_clip(self.engine.conn(), id)
            .unwrap()
            .unwrap_or_else(|| panic!("clip {id} missing"))
    }

    pub fn exists(&self, id: &str) -> bool {
        schema::get_clip(self.engine.conn(), id).unwrap().is_some()
    }

    /// (start, end) in frames.
    pub fn span(&self, id: &str) -> (i64, i64) {
        let clip = self.clip(id);
        (clip.timeline_start.frames(), clip.end().frames())
    }

    pub fn clips(&self) -> Vec<Clip> {
        schema::get_clips_for_sequence(self.engine.conn(), &self.sequence_id).unwrap()
    }

    pub fn hash(&self) -> String {
        self.engine.state_hash(&self.sequence_id).unwrap()
    }

    pub fn assert_no_overlap(&self) {
        let clips = self.clips();
        if let Some((a, b)) = find_overlap(&clips) {
            panic!("clips {} and {} overlap", a.id, b.id);
        }
    }
}

/// Rows of `before` and `after` match field for field, ignoring order.
pub fn assert_same_rows(before: &[Clip], after: &[Clip]) {
    assert_eq!(before.len(), after.len(), "clip count differs");
    for clip in before {
        let other = after
            .iter()
            .find(|c| c.id == clip.id)
            .unwrap_or_else(|| panic!("clip {} missing after undo", clip.id));
        assert!(clip.same_row(other), "clip {} differs after undo", clip.id);
    }
}
