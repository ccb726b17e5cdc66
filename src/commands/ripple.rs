use super::registry::{wrong_spec, PlanContext, Planned};
use super::{owning_sequence, require_clip, require_track, CommandKind, CommandSpec};
use crate::error::EngineError;
use crate::timeline::ripple::{self, plan_edge_ripple, plan_gap_ripple};

pub fn plan_ripple_delete(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::RippleDelete(params) = spec else {
        return Err(wrong_spec(CommandKind::RippleDelete, spec));
    };
    let sequence_id = match (&params.sequence_id, &params.track_id) {
        (Some(id), _) => id.clone(),
        (None, Some(track_id)) => require_track(ctx.conn, track_id)?.sequence_id,
        (None, None) => ctx
            .active_sequence
            .map(str::to_string)
            .ok_or(EngineError::NoActiveSequence)?,
    };

    let plan = plan_gap_ripple(
        ctx.conn,
        &sequence_id,
        params.track_id.as_deref(),
        params.gap_start,
        params.gap_duration,
    )?;
    Ok(Planned::new(plan, Some(sequence_id)))
}

/// Plans from the clip cache when it holds the sequence, from storage otherwise.
pub fn plan_ripple_delete_selection(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::RippleDeleteSelection(params) = spec else {
        return Err(wrong_spec(CommandKind::RippleDeleteSelection, spec));
    };
    let ids: Vec<String> = match &params.clip_ids {
        Some(ids) => ids.clone(),
        None => ctx.selection.to_vec(),
    };
    let Some(first) = ids.first() else {
        return Err(EngineError::Rejected("nothing selected".into()));
    };

    let first = require_clip(ctx.conn, first)?;
    let sequence_id = owning_sequence(&first)?.to_string();

    let plan = if ctx.cache.is_valid_for(&sequence_id) {
        log::debug!("Selection ripple planned from cache for sequence {sequence_id}");
        ripple::plan_selection_ripple(&ctx.cache.clips(), &ids)?
    } else {
        log::debug!("Selection ripple planned from storage for sequence {sequence_id}");
        ripple::plan_selection_ripple_from_db(ctx.conn, &sequence_id, &ids)?
    };
    Ok(Planned::new(plan, Some(sequence_id)))
}

pub fn plan_ripple_edit(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::RippleEdit(params) = spec else {
        return Err(wrong_spec(CommandKind::RippleEdit, spec));
    };
    let edge = plan_edge_ripple(ctx.conn, ctx.media, &params.clip_id, params.edge, params.delta)?;
    let sequence_id = require_clip(ctx.conn, &params.clip_id)?.owner_sequence_id;

    let note = edge.was_clamped().then(|| {
        format!(
            "{:?} edge delta clamped from {} to {}",
            params.edge, edge.requested, edge.applied
        )
    });
    Ok(Planned {
        plan: edge.plan,
        sequence_id,
        note,
    })
}
