use super::registry::{wrong_spec, PlanContext, Planned};
use super::{require_clip, CommandKind, CommandSpec};
use crate::error::EngineError;
use crate::timeline::link::{plan_link_group, plan_unlink};
use crate::timeline::mutation::{Mutation, MutationPlan};

pub fn plan_link_clips(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::LinkClips(params) = spec else {
        return Err(wrong_spec(CommandKind::LinkClips, spec));
    };
    let group = plan_link_group(ctx.conn, &params.clip_ids)?;
    let sequence_id = require_clip(ctx.conn, &group.members[0].clip_id)?.owner_sequence_id;

    let mut plan = MutationPlan::new();
    plan.push_link(Mutation::LinkCreate { group });
    Ok(Planned::new(plan, sequence_id))
}

pub fn plan_unlink_clip(ctx: &PlanContext<'_>, spec: &CommandSpec) -> Result<Planned, EngineError> {
    let CommandSpec::UnlinkClip(params) = spec else {
        return Err(wrong_spec(CommandKind::UnlinkClip, spec));
    };
    let sequence_id = require_clip(ctx.conn, &params.clip_id)?.owner_sequence_id;

    let mut plan = MutationPlan::new();
    for m in plan_unlink(ctx.conn, &params.clip_id)? {
        plan.push_link(m);
    }
    Ok(Planned::new(plan, sequence_id))
}
