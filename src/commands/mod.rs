//! The command surface: callers build a [`CommandRequest`], the engine
//! validates it into a typed [`CommandSpec`] and dispatches it through the
//! static [`registry::Registry`].

pub mod edit;
pub mod engine;
pub mod link;
pub mod registry;
pub mod ripple;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::schema;
use crate::error::EngineError;
use crate::timeline::mutation::{count_mutations, Mutation, MutationCounts};
use crate::timeline::ripple::EdgeType;
use crate::timeline::{Clip, Rational, Sequence, Track};

pub use engine::Engine;

/// Loosely typed request as callers (UI, importers, scripts) build it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandRequest {
    pub command_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl CommandRequest {
    pub fn new(command_type: &str) -> Self {
        Self {
            command_type: command_type.to_string(),
            parameters: Map::new(),
        }
    }

    pub fn get_parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn set_parameter<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), EngineError> {
        let value = serde_json::to_value(value).map_err(|e| EngineError::InvalidParameters {
            command: self.command_type.clone(),
            reason: format!("{key}: {e}"),
        })?;
        self.parameters.insert(key.to_string(), value);
        Ok(())
    }

    /// Builder form of [`set_parameter`](Self::set_parameter).
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Result<Self, EngineError> {
        self.set_parameter(key, value)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    Insert,
    Overwrite,
    Cut,
    MoveClipToTrack,
    DuplicateClips,
    RippleDelete,
    RippleDeleteSelection,
    RippleEdit,
    LinkClips,
    UnlinkClip,
    Batch,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        CommandKind::Insert,
        CommandKind::Overwrite,
        CommandKind::Cut,
        CommandKind::MoveClipToTrack,
        CommandKind::DuplicateClips,
        CommandKind::RippleDelete,
        CommandKind::RippleDeleteSelection,
        CommandKind::RippleEdit,
        CommandKind::LinkClips,
        CommandKind::UnlinkClip,
        CommandKind::Batch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Insert => "Insert",
            CommandKind::Overwrite => "Overwrite",
            CommandKind::Cut => "Cut",
            CommandKind::MoveClipToTrack => "MoveClipToTrack",
            CommandKind::DuplicateClips => "DuplicateClips",
            CommandKind::RippleDelete => "RippleDelete",
            CommandKind::RippleDeleteSelection => "RippleDeleteSelection",
            CommandKind::RippleEdit => "RippleEdit",
            CommandKind::LinkClips => "LinkClips",
            CommandKind::UnlinkClip => "UnlinkClip",
            CommandKind::Batch => "Batch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// A new clip to place on a track. Shared by `Insert` and `Overwrite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceClipParams {
    pub track_id: String,
    pub start: Rational,
    pub duration: Rational,
    #[serde(default)]
    pub source_in: Option<Rational>,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub master_clip_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Caller-chosen id for the new clip; a fresh one is generated otherwise.
    #[serde(default)]
    pub clip_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClipIdsParams {
    pub clip_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveClipToTrackParams {
    pub clip_id: String,
    pub target_track_id: String,
    /// New start on the target track; the clip keeps its start when absent.
    #[serde(default)]
    pub start: Option<Rational>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuplicateClipsParams {
    pub clip_ids: Vec<String>,
    pub offset: Rational,
    #[serde(default)]
    pub target_track_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RippleDeleteParams {
    /// Defaults to the track's sequence, then to the active sequence.
    #[serde(default)]
    pub sequence_id: Option<String>,
    /// Only clips on this track shift; all tracks when absent.
    #[serde(default)]
    pub track_id: Option<String>,
    pub gap_start: Rational,
    pub gap_duration: Rational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RippleDeleteSelectionParams {
    /// The session selection is used when absent.
    #[serde(default)]
    pub clip_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RippleEditParams {
    pub clip_id: String,
    pub edge: EdgeType,
    pub delta: Rational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnlinkClipParams {
    pub clip_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchParams {
    pub commands: Vec<CommandSpec>,
}

/// A validated command. Deserializes from the same `{command_type, parameters}`
/// shape as [`CommandRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command_type", content = "parameters")]
pub enum CommandSpec {
    Insert(PlaceClipParams),
    Overwrite(PlaceClipParams),
    Cut(ClipIdsParams),
    MoveClipToTrack(MoveClipToTrackParams),
    DuplicateClips(DuplicateClipsParams),
    RippleDelete(RippleDeleteParams),
    RippleDeleteSelection(RippleDeleteSelectionParams),
    RippleEdit(RippleEditParams),
    LinkClips(ClipIdsParams),
    UnlinkClip(UnlinkClipParams),
    Batch(BatchParams),
}

impl CommandSpec {
    pub fn from_request(request: &CommandRequest) -> Result<Self, EngineError> {
        let invalid = |reason: String| EngineError::InvalidParameters {
            command: request.command_type.clone(),
            reason,
        };
        if CommandKind::parse(&request.command_type).is_none() {
            return Err(invalid("unknown command type".to_string()));
        }
        let value = serde_json::json!({
            "command_type": request.command_type,
            "parameters": Value::Object(request.parameters.clone()),
        });
        serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
    }

    pub fn to_request(&self) -> Result<CommandRequest, EngineError> {
        serde_json::to_value(self)
            .and_then(serde_json::from_value)
            .map_err(|e| EngineError::InvalidParameters {
                command: self.kind().as_str().to_string(),
                reason: e.to_string(),
            })
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            CommandSpec::Insert(_) => CommandKind::Insert,
            CommandSpec::Overwrite(_) => CommandKind::Overwrite,
            CommandSpec::Cut(_) => CommandKind::Cut,
            CommandSpec::MoveClipToTrack(_) => CommandKind::MoveClipToTrack,
            CommandSpec::DuplicateClips(_) => CommandKind::DuplicateClips,
            CommandSpec::RippleDelete(_) => CommandKind::RippleDelete,
            CommandSpec::RippleDeleteSelection(_) => CommandKind::RippleDeleteSelection,
            CommandSpec::RippleEdit(_) => CommandKind::RippleEdit,
            CommandSpec::LinkClips(_) => CommandKind::LinkClips,
            CommandSpec::UnlinkClip(_) => CommandKind::UnlinkClip,
            CommandSpec::Batch(_) => CommandKind::Batch,
        }
    }
}

/// What a dry run would do.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Preview {
    pub counts: MutationCounts,
    /// Final planned state of every inserted or updated clip.
    pub projected: Vec<Clip>,
    pub removed: Vec<String>,
}

impl Preview {
    pub fn from_mutations(mutations: &[Mutation]) -> Self {
        let mut preview = Preview {
            counts: count_mutations(mutations),
            ..Preview::default()
        };
        for m in mutations {
            match m {
                Mutation::Insert { clip } | Mutation::Update { after: clip, .. } => {
                    preview.projected.retain(|c| c.id != clip.id);
                    preview.projected.push(clip.clone());
                }
                Mutation::Delete { clip_id, .. } => {
                    preview.projected.retain(|c| &c.id != clip_id);
                    preview.removed.push(clip_id.clone());
                }
                Mutation::LinkCreate { .. } | Mutation::LinkDelete { .. } => {}
            }
        }
        preview
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub error_message: Option<String>,
    pub error_code: Option<&'static str>,
    /// Set for dry runs.
    pub preview: Option<Preview>,
    /// Set when the engine adjusted the request, e.g. a clamped trim.
    pub note: Option<String>,
}

impl CommandOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
            error_code: None,
            preview: None,
            note: None,
        }
    }

    pub fn failed(err: &EngineError) -> Self {
        Self {
            success: false,
            error_message: Some(err.to_string()),
            error_code: Some(err.code()),
            preview: None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn with_preview(mut self, preview: Preview) -> Self {
        self.preview = Some(preview);
        self
    }
}

pub(crate) fn require_clip(conn: &Connection, clip_id: &str) -> Result<Clip, EngineError> {
    schema::get_clip(conn, clip_id)?.ok_or_else(|| EngineError::ClipNotFound(clip_id.to_string()))
}

pub(crate) fn require_track(conn: &Connection, track_id: &str) -> Result<Track, EngineError> {
    schema::get_track(conn, track_id)?.ok_or_else(|| EngineError::TrackNotFound(track_id.to_string()))
}

pub(crate) fn require_sequence(conn: &Connection, sequence_id: &str) -> Result<Sequence, EngineError> {
    schema::get_sequence(conn, sequence_id)?.ok_or_else(|| EngineError::SequenceNotFound(sequence_id.to_string()))
}

/// The sequence a placed clip belongs to.
pub(crate) fn owning_sequence(clip: &Clip) -> Result<&str, EngineError> {
    clip.owner_sequence_id
        .as_deref()
        .ok_or_else(|| EngineError::InvalidArgument(format!("clip {} is not placed in a sequence", clip.id)))
}
