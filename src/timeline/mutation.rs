//! Planned, reversible row changes and the transactional executor that
//! applies or reverts them.
//!
//! Every mutating command reduces to an ordered `Vec<Mutation>`:
//!
//! - [`apply_mutations`] runs the list inside one savepoint and checks the
//!   no-overlap invariant on every touched track before committing.
//! - [`revert_mutations`] replays the inverse of each entry in reverse order,
//!   verifying that storage still holds the state the forward pass produced.
//!
//! Both return per-sequence [`SequenceChanges`] for cache coherence.

use std::collections::{BTreeSet, HashMap};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::notify::{group_by_sequence, ClipChange, SequenceChanges};
use super::{find_overlap, Clip, LinkGroup};
use crate::db::{self, schema};
use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Insert { clip: Clip },
    Update { clip_id: String, before: Clip, after: Clip },
    Delete { clip_id: String, before: Clip },
    LinkCreate { group: LinkGroup },
    LinkDelete { group: LinkGroup },
}

pub fn plan_insert(clip: &Clip) -> Mutation {
    Mutation::Insert { clip: clip.clone() }
}

pub fn plan_update(clip: &Clip, before: &Clip) -> Mutation {
    Mutation::Update {
        clip_id: clip.id.clone(),
        before: before.clone(),
        after: clip.clone(),
    }
}

pub fn plan_delete(clip_id: &str, before: &Clip) -> Mutation {
    Mutation::Delete {
        clip_id: clip_id.to_string(),
        before: before.clone(),
    }
}

impl Mutation {
    pub fn clip_id(&self) -> Option<&str> {
        match self {
            Mutation::Insert { clip } => Some(&clip.id),
            Mutation::Update { clip_id, .. } | Mutation::Delete { clip_id, .. } => Some(clip_id),
            Mutation::LinkCreate { .. } | Mutation::LinkDelete { .. } => None,
        }
    }

    pub fn inverse(&self) -> Mutation {
        match self {
            Mutation::Insert { clip } => Mutation::Delete {
                clip_id: clip.id.clone(),
                before: clip.clone(),
            },
            Mutation::Update { clip_id, before, after } => Mutation::Update {
                clip_id: clip_id.clone(),
                before: after.clone(),
                after: before.clone(),
            },
            Mutation::Delete { before, .. } => Mutation::Insert { clip: before.clone() },
            Mutation::LinkCreate { group } => Mutation::LinkDelete { group: group.clone() },
            Mutation::LinkDelete { group } => Mutation::LinkCreate { group: group.clone() },
        }
    }

    fn touched_tracks(&self, out: &mut BTreeSet<String>) {
        let clips: [Option<&Clip>; 2] = match self {
            Mutation::Insert { clip } => [Some(clip), None],
            Mutation::Update { before, after, .. } => [Some(before), Some(after)],
            Mutation::Delete { before, .. } => [Some(before), None],
            Mutation::LinkCreate { .. } | Mutation::LinkDelete { .. } => [None, None],
        };
        for clip in clips.into_iter().flatten() {
            if let Some(track_id) = &clip.track_id {
                out.insert(track_id.clone());
            }
        }
    }
}

/// Count of each mutation kind in a list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationCounts {
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    pub link_changes: usize,
}

pub fn count_mutations(mutations: &[Mutation]) -> MutationCounts {
    let mut counts = MutationCounts::default();
    for m in mutations {
        match m {
            Mutation::Insert { .. } => counts.inserts += 1,
            Mutation::Update { .. } => counts.updates += 1,
            Mutation::Delete { .. } => counts.deletes += 1,
            Mutation::LinkCreate { .. } | Mutation::LinkDelete { .. } => counts.link_changes += 1,
        }
    }
    counts
}

/// Accumulates mutations while a command plans, folding repeated changes to
/// the same clip into one entry that goes from the original pre-image to the
/// latest planned state.
#[derive(Debug, Default, Clone)]
pub struct MutationPlan {
    mutations: Vec<Mutation>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    fn position(&self, clip_id: &str) -> Option<usize> {
        self.mutations.iter().position(|m| m.clip_id() == Some(clip_id))
    }

    pub fn insert(&mut self, clip: Clip) {
        self.mutations.push(Mutation::Insert { clip });
    }

    pub fn update(&mut self, before: &Clip, after: Clip) {
        let Some(i) = self.position(&before.id) else {
            if !before.same_row(&after) {
                self.mutations.push(plan_update(&after, before));
            }
            return;
        };
        let back_to_original = match &self.mutations[i] {
            Mutation::Update { before: original, .. } => original.same_row(&after),
            _ => false,
        };
        if back_to_original {
            self.mutations.remove(i);
            return;
        }
        match &mut self.mutations[i] {
            Mutation::Insert { clip } => *clip = after,
            Mutation::Update { after: latest, .. } => *latest = after,
            _ => log::warn!("Ignoring update of clip {} planned after its deletion", before.id),
        }
    }

    pub fn delete(&mut self, before: &Clip) {
        let Some(i) = self.position(&before.id) else {
            self.mutations.push(plan_delete(&before.id, before));
            return;
        };
        let replacement = match &self.mutations[i] {
            Mutation::Insert { .. } => None,
            Mutation::Update { before: original, .. } => Some(plan_delete(&before.id, original)),
            _ => return,
        };
        match replacement {
            Some(m) => self.mutations[i] = m,
            None => {
                self.mutations.remove(i);
            }
        }
    }

    pub fn push_link(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Planned state of every clip this plan touches: `Some(clip)` for its
    /// latest position, `None` when the plan deletes it.
    pub fn pending(&self) -> HashMap<String, Option<Clip>> {
        let mut pending = HashMap::new();
        for m in &self.mutations {
            match m {
                Mutation::Insert { clip } => {
                    pending.insert(clip.id.clone(), Some(clip.clone()));
                }
                Mutation::Update { clip_id, after, .. } => {
                    pending.insert(clip_id.clone(), Some(after.clone()));
                }
                Mutation::Delete { clip_id, .. } => {
                    pending.insert(clip_id.clone(), None);
                }
                Mutation::LinkCreate { .. } | Mutation::LinkDelete { .. } => {}
            }
        }
        pending
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Revert,
}

impl Direction {
    fn mismatch(self, message: String) -> EngineError {
        match self {
            Direction::Forward => EngineError::Rejected(format!("stale plan: {message}")),
            Direction::Revert => EngineError::UndoDiverged(message),
        }
    }
}

/// Apply `mutations` in order, all-or-nothing.
pub fn apply_mutations(conn: &Connection, mutations: &[Mutation]) -> Result<Vec<SequenceChanges>, EngineError> {
    let changes = db::in_transaction(conn, |conn| run(conn, mutations.iter().cloned(), Direction::Forward))?;
    log::debug!("Applied {} mutations", mutations.len());
    Ok(group_by_sequence(changes))
}

/// Undo `mutations` (a list previously passed to [`apply_mutations`]) by
/// applying each inverse in reverse order, all-or-nothing.
pub fn revert_mutations(conn: &Connection, mutations: &[Mutation]) -> Result<Vec<SequenceChanges>, EngineError> {
    let inverses = mutations.iter().rev().map(Mutation::inverse);
    let changes = db::in_transaction(conn, |conn| run(conn, inverses, Direction::Revert))?;
    log::debug!("Reverted {} mutations", mutations.len());
    Ok(group_by_sequence(changes))
}

fn run(
    conn: &Connection,
    mutations: impl Iterator<Item = Mutation>,
    direction: Direction,
) -> Result<Vec<ClipChange>, EngineError> {
    let mut changes = Vec::new();
    let mut tracks = BTreeSet::new();

    for mutation in mutations {
        mutation.touched_tracks(&mut tracks);
        if let Some(change) = apply_one(conn, mutation, direction)? {
            changes.push(change);
        }
    }

    for track_id in &tracks {
        let clips = schema::get_clips_for_track(conn, track_id)?;
        if let Some((first, second)) = find_overlap(&clips) {
            let err = EngineError::Overlap {
                track_id: track_id.clone(),
                first: first.id.clone(),
                second: second.id.clone(),
            };
            return Err(match direction {
                Direction::Forward => err,
                Direction::Revert => EngineError::UndoDiverged(err.to_string()),
            });
        }
    }

    Ok(changes)
}

fn expect_row(conn: &Connection, expected: &Clip, direction: Direction) -> Result<(), EngineError> {
    match schema::get_clip(conn, &expected.id)? {
        Some(current) if current.same_row(expected) => Ok(()),
        Some(_) => Err(direction.mismatch(format!("clip {} changed since it was planned", expected.id))),
        None => Err(direction.mismatch(format!("clip {} no longer exists", expected.id))),
    }
}

fn apply_one(conn: &Connection, mutation: Mutation, direction: Direction) -> Result<Option<ClipChange>, EngineError> {
    match mutation {
        Mutation::Insert { clip } => {
            clip.validate()?;
            if schema::get_clip(conn, &clip.id)?.is_some() {
                return Err(direction.mismatch(format!("clip {} already exists", clip.id)));
            }
            schema::insert_clip(conn, &clip)?;
            Ok(Some(ClipChange::Inserted(clip)))
        }
        Mutation::Update { before, after, .. } => {
            after.validate()?;
            expect_row(conn, &before, direction)?;
            schema::update_clip(conn, &after)?;
            Ok(Some(ClipChange::Updated(after)))
        }
        Mutation::Delete { clip_id, before } => {
            expect_row(conn, &before, direction)?;
            schema::delete_clip(conn, &clip_id)?;
            Ok(Some(ClipChange::Deleted {
                clip_id,
                sequence_id: before.owner_sequence_id,
            }))
        }
        Mutation::LinkCreate { group } => {
            for member in &group.members {
                if schema::get_link_group_for_clip(conn, &member.clip_id)?.is_some() {
                    return Err(match direction {
                        Direction::Forward => EngineError::AlreadyLinked(member.clip_id.clone()),
                        Direction::Revert => EngineError::UndoDiverged(format!(
                            "clip {} joined another link group",
                            member.clip_id
                        )),
                    });
                }
            }
            schema::insert_link_group(conn, &group)?;
            Ok(None)
        }
        Mutation::LinkDelete { group } => {
            if schema::get_link_group(conn, &group.id)?.as_ref() != Some(&group) {
                return Err(direction.mismatch(format!("link group {} changed since it was planned", group.id)));
            }
            schema::delete_link_group(conn, &group.id)?;
            Ok(None)
        }
    }
}
