//! Clearing space on a track for a new or moved interval.
//!
//! The resolver only plans. It reads the track's clips (optionally overlaid
//! with positions a command has planned but not yet written) and returns the
//! trims, splits and deletes that leave `[start, start + duration)` free of
//! every other enabled clip.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use uuid::Uuid;

use super::mutation::MutationPlan;
use super::{sort_by_start, Clip, Rational};
use crate::config::PunchThroughPolicy;
use crate::db::schema;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct OcclusionRequest<'a> {
    pub track_id: &'a str,
    pub start: Rational,
    pub duration: Rational,
    /// The clip being placed or moved, which must not occlude itself.
    pub exclude_clip_id: Option<&'a str>,
    /// Planned clip states that override storage. `None` means planned for deletion.
    pub pending: Option<&'a HashMap<String, Option<Clip>>>,
}

impl<'a> OcclusionRequest<'a> {
    pub fn new(track_id: &'a str, start: Rational, duration: Rational) -> Self {
        Self {
            track_id,
            start,
            duration,
            exclude_clip_id: None,
            pending: None,
        }
    }

    pub fn excluding(mut self, clip_id: &'a str) -> Self {
        self.exclude_clip_id = Some(clip_id);
        self
    }

    pub fn with_pending(mut self, pending: &'a HashMap<String, Option<Clip>>) -> Self {
        self.pending = Some(pending);
        self
    }
}

#[derive(Debug, Clone)]
pub enum OcclusionAction {
    Delete { before: Clip },
    Trim { before: Clip, after: Clip },
    /// Punch-through that keeps both fragments: `head` replaces the original
    /// row, `tail` is a new clip.
    Split { before: Clip, head: Clip, tail: Clip },
}

impl OcclusionAction {
    pub fn clip_id(&self) -> &str {
        match self {
            OcclusionAction::Delete { before }
            | OcclusionAction::Trim { before, .. }
            | OcclusionAction::Split { before, .. } => &before.id,
        }
    }
}

/// Plan the actions that clear the requested interval on its track.
pub fn resolve(
    conn: &Connection,
    request: &OcclusionRequest<'_>,
    policy: PunchThroughPolicy,
) -> Result<Vec<OcclusionAction>, EngineError> {
    if schema::get_track(conn, request.track_id)?.is_none() {
        return Err(EngineError::TrackNotFound(request.track_id.to_string()));
    }
    let stored = schema::get_clips_for_track(conn, request.track_id)?;
    let clips = overlay_pending(stored, request.track_id, request.pending);
    resolve_against(&clips, request, policy)
}

/// The track as the plan sees it: stored rows replaced or removed by pending
/// entries, plus pending clips that have moved onto the track.
pub fn overlay_pending(
    stored: Vec<Clip>,
    track_id: &str,
    pending: Option<&HashMap<String, Option<Clip>>>,
) -> Vec<Clip> {
    let Some(pending) = pending else {
        return stored;
    };
    let mut seen = HashSet::new();
    let mut clips = Vec::with_capacity(stored.len());
    for clip in stored {
        seen.insert(clip.id.clone());
        match pending.get(&clip.id) {
            Some(Some(planned)) if planned.is_on_track(track_id) => clips.push(planned.clone()),
            Some(_) => {}
            None => clips.push(clip),
        }
    }
    for planned in pending.values().flatten() {
        if planned.is_on_track(track_id) && !seen.contains(&planned.id) {
            clips.push(planned.clone());
        }
    }
    sort_by_start(&mut clips);
    clips
}

/// Pure core of [`resolve`]: plan against an explicit list of the track's clips.
pub fn resolve_against(
    clips: &[Clip],
    request: &OcclusionRequest<'_>,
    policy: PunchThroughPolicy,
) -> Result<Vec<OcclusionAction>, EngineError> {
    if !request.duration.is_positive() {
        return Err(EngineError::InvalidArgument(format!(
            "occlusion interval must have a positive duration, got {}",
            request.duration
        )));
    }
    let target_end = request.start + request.duration;

    let mut actions = Vec::new();
    for clip in clips {
        if !clip.enabled || !clip.is_on_track(request.track_id) {
            continue;
        }
        if request.exclude_clip_id == Some(clip.id.as_str()) {
            continue;
        }

        if !clip.overlaps(request.start, target_end) {
            continue;
        }
        // Cut points widen to whole frames of the clip's rate.
        let start = request.start.rescale_floor(clip.rate);
        let end = target_end.rescale_ceil(clip.rate);

        let clip_start = clip.timeline_start;
        let clip_end = clip.end();
        let action = if clip_start >= start && clip_end <= end {
            OcclusionAction::Delete { before: clip.clone() }
        } else if clip_start < start && clip_end > end {
            punch_through(clip, start, end, policy)
        } else if clip_start < start {
            trim_or_delete(clip, keep_head(clip, start))
        } else {
            trim_or_delete(clip, keep_tail(clip, end))
        };
        actions.push(action);
    }

    Ok(actions)
}

fn punch_through(clip: &Clip, start: Rational, end: Rational, policy: PunchThroughPolicy) -> OcclusionAction {
    let head_len = start - clip.timeline_start;
    let tail_len = clip.end() - end;
    match policy {
        PunchThroughPolicy::KeepLarger if head_len >= tail_len => {
            trim_or_delete(clip, keep_head(clip, start))
        }
        PunchThroughPolicy::KeepLarger => trim_or_delete(clip, keep_tail(clip, end)),
        PunchThroughPolicy::SplitPreserveTail => {
            let head = keep_head(clip, start);
            let mut tail = keep_tail(clip, end);
            tail.id = Uuid::new_v4().to_string();
            if !tail.duration.is_positive() {
                return trim_or_delete(clip, head);
            }
            if !head.duration.is_positive() {
                return trim_or_delete(clip, keep_tail(clip, end));
            }
            OcclusionAction::Split {
                before: clip.clone(),
                head,
                tail,
            }
        }
    }
}

fn trim_or_delete(before: &Clip, after: Clip) -> OcclusionAction {
    if after.duration.is_positive() {
        OcclusionAction::Trim {
            before: before.clone(),
            after,
        }
    } else {
        OcclusionAction::Delete { before: before.clone() }
    }
}

/// The part of `clip` before `cut`.
pub(crate) fn keep_head(clip: &Clip, cut: Rational) -> Clip {
    let removed = clip.end() - cut;
    let mut head = clip.clone();
    head.duration = cut - clip.timeline_start;
    head.source_out = clip.source_out - removed;
    head
}

/// The part of `clip` from `cut` on; the source in-point advances by the same amount.
pub(crate) fn keep_tail(clip: &Clip, cut: Rational) -> Clip {
    let removed = cut - clip.timeline_start;
    let mut tail = clip.clone();
    tail.timeline_start = cut;
    tail.duration = clip.duration - removed;
    tail.source_in = clip.source_in + removed;
    tail
}

/// Fold resolver output into a plan.
pub fn record_actions(actions: Vec<OcclusionAction>, plan: &mut MutationPlan) {
    for action in actions {
        match action {
            OcclusionAction::Delete { before } => plan.delete(&before),
            OcclusionAction::Trim { before, after } => plan.update(&before, after),
            OcclusionAction::Split { before, head, tail } => {
                plan.update(&before, head);
                plan.insert(tail);
            }
        }
    }
}
