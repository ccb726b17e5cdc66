//! Link groups: clips (usually the video and audio of one source) that move
//! and select together. Membership is exclusive and a group never survives
//! with fewer than two members.

use std::collections::HashSet;

use rusqlite::Connection;
use uuid::Uuid;

use super::mutation::{apply_mutations, Mutation, MutationPlan};
use super::{LinkGroup, LinkMember};
use crate::db::schema;
use crate::error::EngineError;

pub const MIN_GROUP_SIZE: usize = 2;

/// Build (but do not store) a group over `clip_ids`. The first id is the
/// anchor; every member's offset is its start minus the anchor's start.
pub fn plan_link_group(conn: &Connection, clip_ids: &[String]) -> Result<LinkGroup, EngineError> {
    let mut seen = HashSet::new();
    if let Some(dup) = clip_ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(EngineError::InvalidArgument(format!("clip {dup} listed twice in link request")));
    }
    if clip_ids.len() < MIN_GROUP_SIZE {
        return Err(EngineError::LinkTooSmall(clip_ids.len()));
    }

    let mut clips = Vec::with_capacity(clip_ids.len());
    for id in clip_ids {
        let clip = schema::get_clip(conn, id)?.ok_or_else(|| EngineError::ClipNotFound(id.clone()))?;
        if schema::get_link_group_for_clip(conn, id)?.is_some() {
            return Err(EngineError::AlreadyLinked(id.clone()));
        }
        clips.push(clip);
    }

    let anchor_start = clips[0].timeline_start;
    let mut members = Vec::with_capacity(clips.len());
    for clip in &clips {
        let track_id = clip
            .track_id
            .as_deref()
            .ok_or_else(|| EngineError::InvalidArgument(format!("clip {} is not placed on a track", clip.id)))?;
        let track = schema::get_track(conn, track_id)?
            .ok_or_else(|| EngineError::TrackNotFound(track_id.to_string()))?;
        members.push(LinkMember {
            clip_id: clip.id.clone(),
            role: track.kind,
            time_offset: clip.timeline_start - anchor_start,
        });
    }

    Ok(LinkGroup {
        id: Uuid::new_v4().to_string(),
        members,
    })
}

pub fn create_link_group(conn: &Connection, clip_ids: &[String]) -> Result<LinkGroup, EngineError> {
    let group = plan_link_group(conn, clip_ids)?;
    apply_mutations(conn, &[Mutation::LinkCreate { group: group.clone() }])?;
    log::info!("Linked {} clips as group {}", group.members.len(), group.id);
    Ok(group)
}

/// Mutations that replace `group` with the group minus `removed`: a plain
/// delete when fewer than two members would remain.
pub fn shrink_group(group: &LinkGroup, removed: &HashSet<&str>) -> Vec<Mutation> {
    let remaining: Vec<LinkMember> = group
        .members
        .iter()
        .filter(|m| !removed.contains(m.clip_id.as_str()))
        .cloned()
        .collect();
    if remaining.len() == group.members.len() {
        return Vec::new();
    }

    let mut mutations = vec![Mutation::LinkDelete { group: group.clone() }];
    if remaining.len() >= MIN_GROUP_SIZE {
        mutations.push(Mutation::LinkCreate {
            group: LinkGroup {
                id: group.id.clone(),
                members: remaining,
            },
        });
    }
    mutations
}

pub fn plan_unlink(conn: &Connection, clip_id: &str) -> Result<Vec<Mutation>, EngineError> {
    let group = schema::get_link_group_for_clip(conn, clip_id)?
        .ok_or_else(|| EngineError::NotLinked(clip_id.to_string()))?;
    let removed = HashSet::from([clip_id]);
    Ok(shrink_group(&group, &removed))
}

/// Remove `clip_id` from its group. Returns the surviving group, or `None`
/// when the group was dissolved.
pub fn unlink(conn: &Connection, clip_id: &str) -> Result<Option<LinkGroup>, EngineError> {
    let mutations = plan_unlink(conn, clip_id)?;
    apply_mutations(conn, &mutations)?;
    let survivor = mutations.into_iter().find_map(|m| match m {
        Mutation::LinkCreate { group } => Some(group),
        _ => None,
    });
    match &survivor {
        Some(group) => log::info!("Unlinked clip {clip_id}; group {} keeps {} members", group.id, group.members.len()),
        None => log::info!("Unlinked clip {clip_id}; group dissolved"),
    }
    Ok(survivor)
}

pub fn get_link_group(conn: &Connection, clip_id: &str) -> Result<Option<LinkGroup>, EngineError> {
    Ok(schema::get_link_group_for_clip(conn, clip_id)?)
}

/// Append the link-shrink mutations for every grouped clip the plan deletes.
/// Groups the plan already rewrites are left alone.
pub fn append_link_cleanup(conn: &Connection, plan: &mut MutationPlan) -> Result<(), EngineError> {
    let mut deleted = HashSet::new();
    let mut handled = HashSet::new();
    for m in plan.mutations() {
        match m {
            Mutation::Delete { clip_id, .. } => {
                deleted.insert(clip_id.clone());
            }
            Mutation::LinkCreate { group } | Mutation::LinkDelete { group } => {
                handled.insert(group.id.clone());
            }
            _ => {}
        }
    }

    let mut cleanup = Vec::new();
    for clip_id in &deleted {
        let Some(group) = schema::get_link_group_for_clip(conn, clip_id)? else {
            continue;
        };
        if !handled.insert(group.id.clone()) {
            continue;
        }
        let removed: HashSet<&str> = deleted.iter().map(String::as_str).collect();
        cleanup.extend(shrink_group(&group, &removed));
    }

    for m in cleanup {
        plan.push_link(m);
    }
    Ok(())
}
