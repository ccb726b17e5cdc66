use serde::ser::{SerializeStruct, Serializer};
use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DbError;
use crate::timeline::TimeError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Db(#[from] DbError),

    #[error("{0}")]
    Time(#[from] TimeError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Invalid parameters for {command}: {reason}")]
    InvalidParameters { command: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sequence not found: {0}")]
    SequenceNotFound(String),

    #[error("Track not found: {0}")]
    TrackNotFound(String),

    #[error("Clip not found: {0}")]
    ClipNotFound(String),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Gap is not clear: clip {0} occupies part of it")]
    GapNotClear(String),

    #[error("Clips {first} and {second} would overlap on track {track_id}")]
    Overlap {
        track_id: String,
        first: String,
        second: String,
    },

    #[error("Clip {0} is already in a link group")]
    AlreadyLinked(String),

    #[error("A link group needs at least 2 clips, got {0}")]
    LinkTooSmall(usize),

    #[error("Clip {0} is not linked")]
    NotLinked(String),

    #[error("Cannot undo: {0}")]
    UndoDiverged(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Command {0} has no recorded inverse")]
    NoInverse(String),

    #[error("No active sequence")]
    NoActiveSequence,

    #[error("{0}")]
    Rejected(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Db(DbError::Sqlite(e))
    }
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Db(e) => match e {
                DbError::Sqlite(_) => "DB_SQLITE",
                DbError::Migration(_) => "DB_MIGRATION",
                DbError::Corrupt(_) => "DB_CORRUPT",
            },
            Self::Time(e) => match e {
                TimeError::InvalidRate { .. } => "TIME_INVALID_RATE",
                TimeError::DivideByZero => "TIME_DIVIDE_BY_ZERO",
            },
            Self::Config(e) => match e {
                ConfigError::Io(_) => "CONFIG_IO",
                ConfigError::Json(_) => "CONFIG_JSON",
            },
            Self::InvalidParameters { .. } => "COMMAND_INVALID_PARAMETERS",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::SequenceNotFound(_) => "SEQUENCE_NOT_FOUND",
            Self::TrackNotFound(_) => "TRACK_NOT_FOUND",
            Self::ClipNotFound(_) => "CLIP_NOT_FOUND",
            Self::MediaNotFound(_) => "MEDIA_NOT_FOUND",
            Self::GapNotClear(_) => "RIPPLE_GAP_NOT_CLEAR",
            Self::Overlap { .. } => "TIMELINE_OVERLAP",
            Self::AlreadyLinked(_) => "LINK_ALREADY_LINKED",
            Self::LinkTooSmall(_) => "LINK_TOO_SMALL",
            Self::NotLinked(_) => "LINK_NOT_LINKED",
            Self::UndoDiverged(_) => "UNDO_DIVERGED",
            Self::NothingToUndo => "UNDO_EMPTY",
            Self::NothingToRedo => "REDO_EMPTY",
            Self::NoInverse(_) => "UNDO_NO_INVERSE",
            Self::NoActiveSequence => "SESSION_NO_ACTIVE_SEQUENCE",
            Self::Rejected(_) => "COMMAND_REJECTED",
        }
    }

    /// Programmer/contract errors: the caller built a bad request. These are
    /// returned as `Err` from the engine instead of a failed outcome.
    pub fn is_contract(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameters { .. } | Self::InvalidArgument(_) | Self::Time(_)
        )
    }
}

impl serde::Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("EngineError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
