use std::collections::HashMap;

use rusqlite::Connection;

use super::notify::SequenceChanges;
use super::ripple::placed_clips;
use super::{sort_by_start, Clip};
use crate::error::EngineError;

/// In-memory copy of the active sequence's placed clips, kept coherent by
/// applying change notifications instead of reloading.
#[derive(Debug, Default)]
pub struct ClipCache {
    sequence_id: Option<String>,
    clips: HashMap<String, Clip>,
}

impl ClipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, conn: &Connection, sequence_id: &str) -> Result<(), EngineError> {
        let clips = placed_clips(conn, sequence_id)?;
        self.clips = clips.into_iter().map(|c| (c.id.clone(), c)).collect();
        self.sequence_id = Some(sequence_id.to_string());
        log::debug!("Loaded {} clips for sequence {sequence_id} into cache", self.clips.len());
        Ok(())
    }

    pub fn invalidate(&mut self) {
        if let Some(sequence_id) = self.sequence_id.take() {
            log::debug!("Invalidated clip cache for sequence {sequence_id}");
        }
        self.clips.clear();
    }

    pub fn sequence_id(&self) -> Option<&str> {
        self.sequence_id.as_deref()
    }

    pub fn is_valid_for(&self, sequence_id: &str) -> bool {
        self.sequence_id.as_deref() == Some(sequence_id)
    }

    /// Fold a notification in. Returns `false` (and changes nothing) when it
    /// belongs to a sequence this cache is not tracking.
    pub fn apply(&mut self, changes: &SequenceChanges) -> bool {
        if !self.is_valid_for(&changes.sequence_id) {
            return false;
        }
        for id in &changes.deletes {
            self.clips.remove(id);
        }
        for clip in changes.inserts.iter().chain(&changes.updates) {
            if clip.track_id.is_some() {
                self.clips.insert(clip.id.clone(), clip.clone());
            } else {
                self.clips.remove(&clip.id);
            }
        }
        true
    }

    pub fn get(&self, clip_id: &str) -> Option<&Clip> {
        self.clips.get(clip_id)
    }

    /// Cached clips in start order.
    pub fn clips(&self) -> Vec<Clip> {
        let mut clips: Vec<Clip> = self.clips.values().cloned().collect();
        sort_by_start(&mut clips);
        clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
