//! Ripple planning: collapsing gaps, deleting a selection and closing the
//! space it leaves, and trimming one edge while shifting everything
//! downstream by the net change.
//!
//! Every planner reads storage (or a cached clip list) and returns a
//! [`MutationPlan`]; nothing here writes.

use std::cmp::max;
use std::collections::{BTreeMap, HashSet};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::mutation::MutationPlan;
use super::{sort_by_start, Clip, Rational};
use crate::db::schema;
use crate::error::EngineError;
use crate::media::MediaProvider;

/// Clips of `sequence_id` that are placed on a track, in start order.
pub fn placed_clips(conn: &Connection, sequence_id: &str) -> Result<Vec<Clip>, EngineError> {
    let mut clips: Vec<Clip> = schema::get_clips_for_sequence(conn, sequence_id)?
        .into_iter()
        .filter(|c| c.track_id.is_some())
        .collect();
    sort_by_start(&mut clips);
    Ok(clips)
}

fn floor_at_zero(t: Rational) -> Rational {
    if t.is_negative() {
        Rational::zero(t.rate())
    } else {
        t
    }
}

fn shifted(clip: &Clip, start: Rational) -> Clip {
    let mut after = clip.clone();
    after.timeline_start = start.rescale(clip.rate);
    after
}

// ── Gap ripple ──

/// Close the empty interval `[gap_start, gap_start + gap_duration)`.
///
/// The interval must be free of enabled clips on every track of the sequence,
/// even when `track_id` limits which clips are shifted.
pub fn plan_gap_ripple(
    conn: &Connection,
    sequence_id: &str,
    track_id: Option<&str>,
    gap_start: Rational,
    gap_duration: Rational,
) -> Result<MutationPlan, EngineError> {
    if !gap_duration.is_positive() {
        return Err(EngineError::InvalidArgument(format!(
            "gap duration must be positive, got {gap_duration}"
        )));
    }
    if gap_start.is_negative() {
        return Err(EngineError::InvalidArgument(format!(
            "gap cannot start before zero, got {gap_start}"
        )));
    }
    if schema::get_sequence(conn, sequence_id)?.is_none() {
        return Err(EngineError::SequenceNotFound(sequence_id.to_string()));
    }
    if let Some(track_id) = track_id {
        match schema::get_track(conn, track_id)? {
            Some(track) if track.sequence_id == sequence_id => {}
            _ => return Err(EngineError::TrackNotFound(track_id.to_string())),
        }
    }

    let clips = placed_clips(conn, sequence_id)?;
    let gap_end = gap_start + gap_duration;
    if let Some(blocker) = clips.iter().find(|c| c.enabled && c.overlaps(gap_start, gap_end)) {
        return Err(EngineError::GapNotClear(blocker.id.clone()));
    }

    let mut plan = MutationPlan::new();
    for clip in clips.iter().filter(|c| c.timeline_start >= gap_end) {
        if let Some(track_id) = track_id {
            if !clip.is_on_track(track_id) {
                continue;
            }
        }
        let start = floor_at_zero(clip.timeline_start - gap_duration);
        plan.update(clip, shifted(clip, start));
    }

    log::debug!(
        "Gap ripple at {gap_start} for {gap_duration} shifts {} clips",
        plan.len()
    );
    Ok(plan)
}

// ── Selection ripple ──

/// Sort by start then length and fuse touching or overlapping segments.
pub fn merge_segments(mut segments: Vec<(Rational, Rational)>) -> Vec<(Rational, Rational)> {
    segments.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| (a.1 - a.0).cmp(&(b.1 - b.0))));
    let mut merged: Vec<(Rational, Rational)> = Vec::with_capacity(segments.len());
    for (start, end) in segments {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = max(last.1, end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Delete `selected` and pull every remaining clip of the sequence left by
/// the total length of the merged deleted segments that end at or before it.
///
/// `clips` is the full placed clip list of one sequence, from storage or from
/// a warm cache; the result does not depend on its order. A clip is never
/// pulled past the new end of the previous enabled clip on its track.
pub fn plan_selection_ripple(clips: &[Clip], selected: &[String]) -> Result<MutationPlan, EngineError> {
    let selected_set: HashSet<&str> = selected.iter().map(String::as_str).collect();
    let mut deleted = Vec::with_capacity(selected_set.len());
    let mut queued = HashSet::new();
    for id in selected {
        let clip = clips
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| EngineError::ClipNotFound(id.clone()))?;
        if queued.insert(id.as_str()) {
            deleted.push(clip);
        }
    }
    if deleted.is_empty() {
        return Ok(MutationPlan::new());
    }

    let segments = merge_segments(deleted.iter().map(|c| (c.timeline_start, c.end())).collect());
    if let (Some(first), Some(last)) = (segments.first(), segments.last()) {
        log::debug!(
            "Selection ripple over [{}, {}) in {} merged segments",
            first.0,
            last.1,
            segments.len()
        );
    }

    let mut by_track: BTreeMap<&str, Vec<&Clip>> = BTreeMap::new();
    for clip in clips {
        if selected_set.contains(clip.id.as_str()) {
            continue;
        }
        if let Some(track_id) = clip.track_id.as_deref() {
            by_track.entry(track_id).or_default().push(clip);
        }
    }

    let mut updates: Vec<(&Clip, Clip)> = Vec::new();
    for track_clips in by_track.values_mut() {
        track_clips.sort_by(|a, b| a.timeline_start.cmp(&b.timeline_start).then_with(|| a.id.cmp(&b.id)));
        let mut floor: Option<Rational> = None;
        for &clip in track_clips.iter() {
            let shift = segments
                .iter()
                .filter(|(_, end)| *end <= clip.timeline_start)
                .fold(Rational::zero(clip.rate), |acc, (start, end)| acc + (*end - *start));

            let mut start = clip.timeline_start - shift;
            if let Some(floor) = floor {
                start = max(start, floor.rescale(clip.rate));
            }
            let start = floor_at_zero(start);
            if clip.enabled {
                floor = Some(start + clip.duration);
            }
            if !start.identical(&clip.timeline_start) {
                updates.push((clip, shifted(clip, start)));
            }
        }
    }
    updates.sort_by(|a, b| a.0.timeline_start.cmp(&b.0.timeline_start).then_with(|| a.0.id.cmp(&b.0.id)));

    let mut plan = MutationPlan::new();
    for clip in deleted {
        plan.delete(clip);
    }
    for (before, after) in updates {
        plan.update(before, after);
    }
    Ok(plan)
}

/// [`plan_selection_ripple`] against the sequence as stored.
pub fn plan_selection_ripple_from_db(
    conn: &Connection,
    sequence_id: &str,
    selected: &[String],
) -> Result<MutationPlan, EngineError> {
    let clips = placed_clips(conn, sequence_id)?;
    plan_selection_ripple(&clips, selected)
}

// ── Edge ripple ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// The clip's in-point: start stays put, source in and duration change.
    In,
    /// The clip's out-point.
    Out,
    /// Blank space before the clip; the clip itself moves.
    GapBefore,
    /// Blank space after the clip.
    GapAfter,
}

#[derive(Debug, Clone)]
pub struct EdgeRipplePlan {
    pub plan: MutationPlan,
    pub requested: Rational,
    /// Edge movement after clamping, in the clip's rate.
    pub applied: Rational,
    /// Shift applied to every downstream clip.
    pub shift: Rational,
}

impl EdgeRipplePlan {
    pub fn is_noop(&self) -> bool {
        self.plan.is_empty()
    }

    pub fn was_clamped(&self) -> bool {
        !self.applied.identical(&self.requested)
    }
}

/// Move one edge of `clip_id` by `delta` (positive moves right) and ripple the
/// net change through the rest of the sequence.
pub fn plan_edge_ripple(
    conn: &Connection,
    media: &dyn MediaProvider,
    clip_id: &str,
    edge: EdgeType,
    delta: Rational,
) -> Result<EdgeRipplePlan, EngineError> {
    let clip = schema::get_clip(conn, clip_id)?.ok_or_else(|| EngineError::ClipNotFound(clip_id.to_string()))?;
    let track_id = clip
        .track_id
        .clone()
        .ok_or_else(|| EngineError::InvalidArgument(format!("clip {clip_id} is not placed on a track")))?;
    let sequence_id = clip
        .owner_sequence_id
        .clone()
        .ok_or_else(|| EngineError::InvalidArgument(format!("clip {clip_id} has no owning sequence")))?;

    let rate = clip.rate;
    let requested = delta.rescale(rate);
    let clips = placed_clips(conn, &sequence_id)?;

    let (lo, hi) = edge_bounds(conn, media, &clip, &track_id, edge, &clips)?;
    let mut applied = requested;
    if let Some(lo) = lo {
        applied = max(applied, lo);
    }
    if let Some(hi) = hi {
        applied = applied.min(hi);
    }

    let boundary = match edge {
        EdgeType::GapBefore => clip.timeline_start,
        EdgeType::In | EdgeType::Out | EdgeType::GapAfter => clip.end(),
    };
    let downstream: Vec<&Clip> = clips
        .iter()
        .filter(|c| c.id != clip.id || edge == EdgeType::GapBefore)
        .filter(|c| c.timeline_start >= boundary)
        .collect();

    let mut shift = match edge {
        EdgeType::In => -applied,
        EdgeType::Out | EdgeType::GapBefore | EdgeType::GapAfter => applied,
    };
    if shift.is_negative() {
        let limit = pull_limit(&clips, &clip, edge, boundary, &downstream).map(|l| l.rescale(rate));
        if let Some(limit) = limit.filter(|limit| shift < *limit) {
            shift = limit;
            applied = match edge {
                EdgeType::In => -shift,
                _ => shift,
            };
        }
    }

    if !applied.identical(&requested) {
        log::info!(
            "Clamped {edge:?} edge of clip {clip_id} from {requested} to {applied}"
        );
    }

    let mut plan = MutationPlan::new();
    if applied.is_zero() {
        return Ok(EdgeRipplePlan {
            plan,
            requested,
            applied,
            shift: Rational::zero(rate),
        });
    }

    match edge {
        EdgeType::Out => {
            let mut after = clip.clone();
            after.duration = clip.duration + applied;
            after.source_out = clip.source_out + applied;
            plan.update(&clip, after);
        }
        EdgeType::In => {
            let mut after = clip.clone();
            after.duration = clip.duration - applied;
            after.source_in = clip.source_in + applied;
            plan.update(&clip, after);
        }
        EdgeType::GapBefore | EdgeType::GapAfter => {}
    }
    for &c in &downstream {
        plan.update(c, shifted(c, c.timeline_start + shift));
    }

    Ok(EdgeRipplePlan {
        plan,
        requested,
        applied,
        shift,
    })
}

/// Lower and upper bounds on the edge movement from the clip's own source
/// range and its neighbours on the same track. `None` is unbounded.
fn edge_bounds(
    conn: &Connection,
    media: &dyn MediaProvider,
    clip: &Clip,
    track_id: &str,
    edge: EdgeType,
    clips: &[Clip],
) -> Result<(Option<Rational>, Option<Rational>), EngineError> {
    let rate = clip.rate;
    let one = Rational::from_frames(1, rate);
    let neighbours = || {
        clips
            .iter()
            .filter(move |c| c.enabled && c.id != clip.id && c.is_on_track(track_id))
    };

    let bounds = match edge {
        EdgeType::Out => {
            let media_end = match clip.media_id.as_deref() {
                Some(media_id) => {
                    let bounds = media
                        .bounds(conn, media_id)?
                        .ok_or_else(|| EngineError::MediaNotFound(media_id.to_string()))?;
                    Some(bounds.duration.rescale_floor(rate))
                }
                None => None,
            };
            (Some(one - clip.duration), media_end.map(|end| end - clip.source_out))
        }
        EdgeType::In => (Some(-clip.source_in), Some(clip.duration - one)),
        EdgeType::GapBefore => {
            let prev_end = neighbours()
                .filter(|c| c.timeline_start < clip.timeline_start)
                .map(Clip::end)
                .max()
                .unwrap_or_else(|| Rational::zero(rate));
            (Some(prev_end.rescale(rate) - clip.timeline_start), None)
        }
        EdgeType::GapAfter => {
            let next_start = neighbours()
                .filter(|c| c.timeline_start >= clip.end())
                .map(|c| c.timeline_start)
                .min();
            (next_start.map(|next| clip.end() - next.rescale(rate)), None)
        }
    };
    Ok(bounds)
}

/// The most negative shift the downstream clips can take: none may start
/// before zero, and on each track the first shifting clip may not cross the
/// end of the last clip that stays put.
fn pull_limit(
    clips: &[Clip],
    edited: &Clip,
    edge: EdgeType,
    boundary: Rational,
    downstream: &[&Clip],
) -> Option<Rational> {
    let shifting: HashSet<&str> = downstream.iter().map(|c| c.id.as_str()).collect();
    let mut limit: Option<Rational> = None;
    let mut first_on_track: BTreeMap<&str, Rational> = BTreeMap::new();

    for c in downstream {
        limit = max(limit, Some(-c.timeline_start));
        if let Some(track_id) = c.track_id.as_deref() {
            let entry = first_on_track.entry(track_id).or_insert(c.timeline_start);
            *entry = (*entry).min(c.timeline_start);
        }
    }

    // The edited clip's own end moves with the edge, so it never blocks.
    let edge_moves_clip_end = matches!(edge, EdgeType::In | EdgeType::Out);
    for (track_id, first) in &first_on_track {
        let stay_end = clips
            .iter()
            .filter(|c| c.enabled && c.is_on_track(track_id) && !shifting.contains(c.id.as_str()))
            .filter(|c| !(edge_moves_clip_end && c.id == edited.id))
            .filter(|c| c.timeline_start < boundary)
            .map(Clip::end)
            .max();
        if let Some(stay_end) = stay_end {
            limit = max(limit, Some(stay_end - *first));
        }
    }
    limit
}
