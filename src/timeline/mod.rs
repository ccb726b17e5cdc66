pub mod cache;
pub mod link;
pub mod mutation;
pub mod notify;
pub mod occlusion;
pub mod rational;
pub mod ripple;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use rational::{FrameRate, Rational, TimeError};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(TrackKind::Video),
            "audio" => Some(TrackKind::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub rate: FrameRate,
    pub width: i64,
    pub height: i64,
    pub playhead: Rational,
    pub viewport_start: Rational,
    pub viewport_duration: Rational,
}

impl Sequence {
    pub fn new(project_id: &str, name: &str, rate: FrameRate, width: i64, height: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            rate,
            width,
            height,
            playhead: Rational::zero(rate),
            viewport_start: Rational::zero(rate),
            viewport_duration: Rational::from_frames(rate.num() * 10 / rate.den().max(1), rate),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub sequence_id: String,
    pub name: String,
    pub kind: TrackKind,
    pub track_index: i64,
}

impl Track {
    pub fn new(sequence_id: &str, kind: TrackKind, track_index: i64) -> Self {
        let prefix = match kind {
            TrackKind::Video => "V",
            TrackKind::Audio => "A",
        };
        Self {
            id: Uuid::new_v4().to_string(),
            sequence_id: sequence_id.to_string(),
            name: format!("{prefix}{track_index}"),
            kind,
            track_index,
        }
    }
}

/// Source media as far as this engine cares: identity, length and native rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub file_path: String,
    pub duration: Rational,
}

impl Media {
    pub fn rate(&self) -> FrameRate {
        self.duration.rate()
    }
}

/// A placed (or master) clip. All of its time values are expressed at `rate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub project_id: String,
    pub name: String,
    /// `None` for master clips that live in the bin rather than on a track.
    pub track_id: Option<String>,
    pub owner_sequence_id: Option<String>,
    pub master_clip_id: Option<String>,
    pub media_id: Option<String>,
    pub timeline_start: Rational,
    pub duration: Rational,
    pub source_in: Rational,
    pub source_out: Rational,
    pub rate: FrameRate,
    pub enabled: bool,
    pub offline: bool,
}

impl Clip {
    /// A new enabled clip on `track` whose source range starts at `source_in`
    /// and runs for `duration`.
    pub fn new(
        project_id: &str,
        track: &Track,
        media_id: Option<&str>,
        timeline_start: Rational,
        duration: Rational,
        source_in: Rational,
    ) -> Self {
        let rate = timeline_start.rate();
        let duration = duration.rescale(rate);
        let source_in = source_in.rescale(rate);
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: String::new(),
            track_id: Some(track.id.clone()),
            owner_sequence_id: Some(track.sequence_id.clone()),
            master_clip_id: None,
            media_id: media_id.map(str::to_string),
            timeline_start,
            duration,
            source_in,
            source_out: source_in + duration,
            rate,
            enabled: true,
            offline: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn end(&self) -> Rational {
        self.timeline_start + self.duration
    }

    /// Half-open interval intersection with `[start, end)`.
    pub fn overlaps(&self, start: Rational, end: Rational) -> bool {
        self.timeline_start < end && start < self.end()
    }

    pub fn is_on_track(&self, track_id: &str) -> bool {
        self.track_id.as_deref() == Some(track_id)
    }

    /// Field-for-field equality including the stored representation of every
    /// time value. Used to verify undo restores rows exactly.
    pub fn same_row(&self, other: &Clip) -> bool {
        self.id == other.id
            && self.project_id == other.project_id
            && self.name == other.name
            && self.track_id == other.track_id
            && self.owner_sequence_id == other.owner_sequence_id
            && self.master_clip_id == other.master_clip_id
            && self.media_id == other.media_id
            && self.timeline_start.identical(&other.timeline_start)
            && self.duration.identical(&other.duration)
            && self.source_in.identical(&other.source_in)
            && self.source_out.identical(&other.source_out)
            && self.rate == other.rate
            && self.enabled == other.enabled
            && self.offline == other.offline
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.duration.is_positive() {
            return Err(EngineError::InvalidArgument(format!(
                "clip {} must have a positive duration, got {}",
                self.id, self.duration
            )));
        }
        if self.timeline_start.is_negative() {
            return Err(EngineError::InvalidArgument(format!(
                "clip {} cannot start before zero ({})",
                self.id, self.timeline_start
            )));
        }
        if self.source_in.is_negative() || self.source_out <= self.source_in {
            return Err(EngineError::InvalidArgument(format!(
                "clip {} has an empty or negative source range [{}, {})",
                self.id, self.source_in, self.source_out
            )));
        }
        Ok(())
    }
}

/// Sort clips by start time, breaking ties by id so results are deterministic.
pub fn sort_by_start(clips: &mut [Clip]) {
    clips.sort_by(|a, b| {
        a.timeline_start
            .cmp(&b.timeline_start)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// First pair of enabled clips sharing a track whose intervals intersect.
pub fn find_overlap(clips: &[Clip]) -> Option<(&Clip, &Clip)> {
    let mut enabled: Vec<&Clip> = clips
        .iter()
        .filter(|c| c.enabled && c.track_id.is_some())
        .collect();
    enabled.sort_by(|a, b| {
        a.track_id
            .cmp(&b.track_id)
            .then_with(|| a.timeline_start.cmp(&b.timeline_start))
    });
    enabled
        .windows(2)
        .find(|w| w[0].track_id == w[1].track_id && w[1].timeline_start < w[0].end())
        .map(|w| (w[0], w[1]))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkMember {
    pub clip_id: String,
    pub role: TrackKind,
    /// Member start minus the anchor's start at link time.
    pub time_offset: Rational,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkGroup {
    pub id: String,
    pub members: Vec<LinkMember>,
}

impl LinkGroup {
    pub fn contains(&self, clip_id: &str) -> bool {
        self.members.iter().any(|m| m.clip_id == clip_id)
    }
}
