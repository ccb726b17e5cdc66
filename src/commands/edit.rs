//! Planners for commands that place, remove and copy clips.

use uuid::Uuid;

use super::registry::{wrong_spec, PlanContext, Planned};
use super::{owning_sequence, require_clip, require_sequence, require_track, CommandKind, CommandSpec, PlaceClipParams};
use crate::db::schema;
use crate::error::EngineError;
use crate::timeline::mutation::MutationPlan;
use crate::timeline::occlusion::{self, keep_head, keep_tail, record_actions, OcclusionRequest};
use crate::timeline::{sort_by_start, Clip, Rational, Track};

/// Build the clip a placement request describes, at the sequence's rate.
fn new_clip(ctx: &PlanContext<'_>, params: &PlaceClipParams) -> Result<(Clip, Track), EngineError> {
    if !params.duration.is_positive() {
        return Err(EngineError::InvalidArgument(format!(
            "clip duration must be positive, got {}",
            params.duration
        )));
    }
    if params.start.is_negative() {
        return Err(EngineError::InvalidArgument(format!(
            "clip cannot start before zero, got {}",
            params.start
        )));
    }

    let track = require_track(ctx.conn, &params.track_id)?;
    let sequence = require_sequence(ctx.conn, &track.sequence_id)?;
    let start = params.start.rescale(sequence.rate);
    let source_in = params.source_in.unwrap_or_else(|| Rational::zero(sequence.rate));

    let mut clip = Clip::new(
        &sequence.project_id,
        &track,
        params.media_id.as_deref(),
        start,
        params.duration,
        source_in,
    );
    if let Some(id) = &params.clip_id {
        clip.id = id.clone();
    }
    if let Some(name) = &params.name {
        clip.name = name.clone();
    }
    clip.master_clip_id = params.master_clip_id.clone();
    clip.validate()?;

    if let Some(media_id) = &clip.media_id {
        let bounds = ctx
            .media
            .bounds(ctx.conn, media_id)?
            .ok_or_else(|| EngineError::MediaNotFound(media_id.clone()))?;
        if clip.source_out > bounds.duration {
            return Err(EngineError::Rejected(format!(
                "source range [{}, {}) runs past the end of media {media_id} ({})",
                clip.source_in, clip.source_out, bounds.duration
            )));
        }
    }
    if schema::get_clip(ctx.conn, &clip.id)?.is_some() {
        return Err(EngineError::Rejected(format!("clip {} already exists", clip.id)));
    }

    Ok((clip, track))
}

/// Insert: split whatever spans the position and push the rest of the track
/// right by the new clip's duration.
pub fn plan_insert(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::Insert(params) = spec else {
        return Err(wrong_spec(CommandKind::Insert, spec));
    };
    let (clip, track) = new_clip(ctx, params)?;
    let position = clip.timeline_start;
    let length = clip.duration;

    let mut plan = MutationPlan::new();
    for existing in schema::get_clips_for_track(ctx.conn, &track.id)? {
        if existing.timeline_start >= position {
            let mut after = existing.clone();
            after.timeline_start = existing.timeline_start + length;
            plan.update(&existing, after);
            continue;
        }
        if existing.end() <= position {
            continue;
        }
        let cut = position.rescale(existing.rate);
        let head = keep_head(&existing, cut);
        let mut tail = keep_tail(&existing, cut);
        if !head.duration.is_positive() || !tail.duration.is_positive() {
            let mut after = existing.clone();
            after.timeline_start = existing.timeline_start + length;
            plan.update(&existing, after);
            continue;
        }
        tail.id = Uuid::new_v4().to_string();
        tail.timeline_start = tail.timeline_start + length;
        log::debug!("Insert splits clip {} at {position}", existing.id);
        plan.update(&existing, head);
        plan.insert(tail);
    }
    plan.insert(clip);

    Ok(Planned::new(plan, Some(track.sequence_id)))
}

/// Overwrite: clear the destination with the occlusion resolver and place the clip.
pub fn plan_overwrite(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::Overwrite(params) = spec else {
        return Err(wrong_spec(CommandKind::Overwrite, spec));
    };
    let (clip, track) = new_clip(ctx, params)?;

    let request = OcclusionRequest::new(&track.id, clip.timeline_start, clip.duration);
    let actions = occlusion::resolve(ctx.conn, &request, ctx.config.punch_through)?;
    let mut plan = MutationPlan::new();
    record_actions(actions, &mut plan);
    plan.insert(clip);

    Ok(Planned::new(plan, Some(track.sequence_id)))
}

pub fn plan_cut(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::Cut(params) = spec else {
        return Err(wrong_spec(CommandKind::Cut, spec));
    };
    if params.clip_ids.is_empty() {
        return Err(EngineError::InvalidArgument("Cut needs at least one clip".into()));
    }

    let mut plan = MutationPlan::new();
    let mut sequence_id = None;
    for id in &params.clip_ids {
        let clip = require_clip(ctx.conn, id)?;
        if sequence_id.is_none() {
            sequence_id = clip.owner_sequence_id.clone();
        }
        plan.delete(&clip);
    }
    Ok(Planned::new(plan, sequence_id))
}

pub fn plan_move_clip_to_track(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::MoveClipToTrack(params) = spec else {
        return Err(wrong_spec(CommandKind::MoveClipToTrack, spec));
    };
    let clip = require_clip(ctx.conn, &params.clip_id)?;
    let sequence_id = owning_sequence(&clip)?.to_string();
    let target = require_track(ctx.conn, &params.target_track_id)?;
    if target.sequence_id != sequence_id {
        return Err(EngineError::Rejected(format!(
            "track {} belongs to another sequence than clip {}",
            target.id, clip.id
        )));
    }

    let start = params
        .start
        .map(|s| s.rescale(clip.rate))
        .unwrap_or(clip.timeline_start);
    if start.is_negative() {
        return Err(EngineError::InvalidArgument(format!("clip cannot start before zero, got {start}")));
    }

    let mut after = clip.clone();
    after.track_id = Some(target.id.clone());
    after.timeline_start = start;

    let mut plan = MutationPlan::new();
    if after.same_row(&clip) {
        return Ok(Planned::new(plan, Some(sequence_id)));
    }
    let request = OcclusionRequest::new(&target.id, start, clip.duration).excluding(&clip.id);
    let actions = occlusion::resolve(ctx.conn, &request, ctx.config.punch_through)?;
    record_actions(actions, &mut plan);
    plan.update(&clip, after);

    Ok(Planned::new(plan, Some(sequence_id)))
}

/// Copy clips by `offset` with fresh ids. Each copy clears its destination
/// against the state already planned for earlier copies.
pub fn plan_duplicate_clips(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::DuplicateClips(params) = spec else {
        return Err(wrong_spec(CommandKind::DuplicateClips, spec));
    };
    if params.clip_ids.is_empty() {
        return Err(EngineError::InvalidArgument("DuplicateClips needs at least one clip".into()));
    }

    let mut sources = params
        .clip_ids
        .iter()
        .map(|id| require_clip(ctx.conn, id))
        .collect::<Result<Vec<_>, _>>()?;
    sort_by_start(&mut sources);
    let target = params
        .target_track_id
        .as_deref()
        .map(|id| require_track(ctx.conn, id))
        .transpose()?;

    let mut plan = MutationPlan::new();
    let mut sequence_id = None;
    for source in &sources {
        let track = match &target {
            Some(track) => track.clone(),
            None => {
                let track_id = source.track_id.as_deref().ok_or_else(|| {
                    EngineError::InvalidArgument(format!("clip {} is not placed on a track", source.id))
                })?;
                require_track(ctx.conn, track_id)?
            }
        };

        let start = source.timeline_start + params.offset;
        if start.is_negative() {
            return Err(EngineError::InvalidArgument(format!(
                "copy of clip {} would start before zero ({start})",
                source.id
            )));
        }
        let mut copy = source.clone();
        copy.id = Uuid::new_v4().to_string();
        copy.track_id = Some(track.id.clone());
        copy.owner_sequence_id = Some(track.sequence_id.clone());
        copy.timeline_start = start;

        let pending = plan.pending();
        let request = OcclusionRequest::new(&track.id, copy.timeline_start, copy.duration).with_pending(&pending);
        let actions = occlusion::resolve(ctx.conn, &request, ctx.config.punch_through)?;
        record_actions(actions, &mut plan);
        plan.insert(copy);
        sequence_id.get_or_insert(track.sequence_id);
    }

    Ok(Planned::new(plan, sequence_id))
}
