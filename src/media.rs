//! Source media bounds used to clamp edge trims. The engine never probes
//! files itself; it asks a provider for `(duration, native_rate)`.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::db::schema;
use crate::error::EngineError;
use crate::timeline::{FrameRate, Rational};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBounds {
    pub duration: Rational,
    pub native_rate: FrameRate,
}

pub trait MediaProvider: Send {
    /// `Ok(None)` means the media is unknown. Placements and Out-edge edits
    /// that need its bounds fail with `MediaNotFound`.
    fn bounds(&self, conn: &Connection, media_id: &str) -> Result<Option<MediaBounds>, EngineError>;
}

/// Reads bounds from the project's `media` table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteMediaProvider;

impl MediaProvider for SqliteMediaProvider {
    fn bounds(&self, conn: &Connection, media_id: &str) -> Result<Option<MediaBounds>, EngineError> {
        Ok(schema::get_media(conn, media_id)?.map(|media| MediaBounds {
            duration: media.duration,
            native_rate: media.rate(),
        }))
    }
}

/// Fixed bounds supplied by the host, for media the database does not know about.
#[derive(Debug, Default, Clone)]
pub struct StaticMediaProvider {
    bounds: HashMap<String, MediaBounds>,
}

impl StaticMediaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(mut self, media_id: &str, duration: Rational) -> Self {
        self.bounds.insert(
            media_id.to_string(),
            MediaBounds {
                duration,
                native_rate: duration.rate(),
            },
        );
        self
    }
}

impl MediaProvider for StaticMediaProvider {
    fn bounds(&self, _conn: &Connection, media_id: &str) -> Result<Option<MediaBounds>, EngineError> {
        Ok(self.bounds.get(media_id).copied())
    }
}
