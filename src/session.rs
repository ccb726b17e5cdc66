//! Editor state for the active sequence: selection, playhead, viewport and
//! the zoom-to-fit toggle. Replaced whenever another sequence is activated.

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::db::schema;
use crate::error::EngineError;
use crate::timeline::{Rational, Sequence};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Viewport {
    start: Rational,
    duration: Rational,
}

#[derive(Debug, Clone)]
pub struct Session {
    sequence_id: String,
    selection: BTreeSet<String>,
    playhead: Rational,
    viewport: Viewport,
    /// Viewport to restore when zoom-fit is toggled off. `Some` while fitted.
    saved_viewport: Option<Viewport>,
}

impl Session {
    pub fn open(sequence: &Sequence) -> Self {
        Self {
            sequence_id: sequence.id.clone(),
            selection: BTreeSet::new(),
            playhead: sequence.playhead,
            viewport: Viewport {
                start: sequence.viewport_start,
                duration: sequence.viewport_duration,
            },
            saved_viewport: None,
        }
    }

    pub fn sequence_id(&self) -> &str {
        &self.sequence_id
    }

    // ── Selection ──

    pub fn select(&mut self, clip_ids: impl IntoIterator<Item = String>) {
        self.selection = clip_ids.into_iter().collect();
    }

    pub fn add_to_selection(&mut self, clip_id: &str) {
        self.selection.insert(clip_id.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> Vec<String> {
        self.selection.iter().cloned().collect()
    }

    /// Drop ids that no longer exist after a command deleted them.
    pub fn forget_clips<'a>(&mut self, clip_ids: impl IntoIterator<Item = &'a String>) {
        for id in clip_ids {
            self.selection.remove(id);
        }
    }

    // ── Playhead and viewport ──

    pub fn playhead(&self) -> Rational {
        self.playhead
    }

    pub fn set_playhead(&mut self, position: Rational) -> Result<(), EngineError> {
        if position.is_negative() {
            return Err(EngineError::InvalidArgument(format!("playhead cannot be negative: {position}")));
        }
        self.playhead = position;
        Ok(())
    }

    pub fn viewport(&self) -> (Rational, Rational) {
        (self.viewport.start, self.viewport.duration)
    }

    pub fn set_viewport(&mut self, start: Rational, duration: Rational) -> Result<(), EngineError> {
        if start.is_negative() || !duration.is_positive() {
            return Err(EngineError::InvalidArgument(format!(
                "invalid viewport start {start} duration {duration}"
            )));
        }
        self.viewport = Viewport { start, duration };
        self.saved_viewport = None;
        Ok(())
    }

    pub fn is_zoom_fitted(&self) -> bool {
        self.saved_viewport.is_some()
    }

    /// First call fits the viewport to the whole timeline plus a tenth of
    /// its length; the second restores the viewport from before the fit.
    pub fn toggle_zoom_fit(&mut self, timeline_end: Rational) -> Result<(), EngineError> {
        if let Some(saved) = self.saved_viewport.take() {
            self.viewport = saved;
            log::debug!("Zoom fit off for sequence {}", self.sequence_id);
            return Ok(());
        }

        let rate = timeline_end.rate();
        let mut duration = timeline_end + timeline_end.div_int(10)?;
        if !duration.is_positive() {
            duration = Rational::from_frames(1, rate);
        }
        self.saved_viewport = Some(self.viewport);
        self.viewport = Viewport {
            start: Rational::zero(rate),
            duration,
        };
        log::debug!("Zoom fit on for sequence {}: {}", self.sequence_id, duration);
        Ok(())
    }

    /// Write playhead and viewport back to the sequence row.
    pub fn persist(&self, conn: &Connection) -> Result<(), EngineError> {
        let rows = schema::update_sequence_view(
            conn,
            &self.sequence_id,
            self.playhead,
            self.viewport.start,
            self.viewport.duration,
        )?;
        if rows == 0 {
            return Err(EngineError::SequenceNotFound(self.sequence_id.clone()));
        }
        Ok(())
    }
}
