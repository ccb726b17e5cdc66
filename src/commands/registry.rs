use std::collections::HashMap;

use rusqlite::Connection;

use super::{edit, link, ripple, CommandKind, CommandSpec};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::media::MediaProvider;
use crate::timeline::cache::ClipCache;
use crate::timeline::mutation::MutationPlan;

/// Everything a planner may read. Planners never write.
pub struct PlanContext<'a> {
    pub conn: &'a Connection,
    pub config: &'a EngineConfig,
    pub media: &'a dyn MediaProvider,
    pub cache: &'a ClipCache,
    pub selection: &'a [String],
    pub active_sequence: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct Planned {
    pub plan: MutationPlan,
    /// The sequence the command edits, for state hashes.
    pub sequence_id: Option<String>,
    pub note: Option<String>,
}

impl Planned {
    pub fn new(plan: MutationPlan, sequence_id: Option<String>) -> Self {
        Self {
            plan,
            sequence_id,
            note: None,
        }
    }
}

pub type Planner = fn(&PlanContext<'_>, &CommandSpec) -> Result<Planned, EngineError>;

/// Command kind to planner, fixed when the engine is built. `Batch` has no
/// planner; the engine runs its children itself.
pub struct Registry {
    planners: HashMap<CommandKind, Planner>,
}

const PLANNERS: &[(CommandKind, Planner)] = &[
    (CommandKind::Insert, edit::plan_insert),
    (CommandKind::Overwrite, edit::plan_overwrite),
    (CommandKind::Cut, edit::plan_cut),
    (CommandKind::MoveClipToTrack, edit::plan_move_clip_to_track),
    (CommandKind::DuplicateClips, edit::plan_duplicate_clips),
    (CommandKind::RippleDelete, ripple::plan_ripple_delete),
    (CommandKind::RippleDeleteSelection, ripple::plan_ripple_delete_selection),
    (CommandKind::RippleEdit, ripple::plan_ripple_edit),
    (CommandKind::LinkClips, link::plan_link_clips),
    (CommandKind::UnlinkClip, link::plan_unlink_clip),
];

impl Registry {
    pub fn new() -> Self {
        let planners: HashMap<CommandKind, Planner> = PLANNERS.iter().copied().collect();
        for kind in CommandKind::ALL {
            if kind != CommandKind::Batch && !planners.contains_key(&kind) {
                log::error!("No planner registered for {}", kind.as_str());
            }
        }
        Self { planners }
    }

    pub fn planner(&self, kind: CommandKind) -> Option<Planner> {
        self.planners.get(&kind).copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters of a spec whose kind the planner was registered for. A
/// mismatch is a registry wiring bug, reported as a contract error.
pub(crate) fn wrong_spec(expected: CommandKind, spec: &CommandSpec) -> EngineError {
    EngineError::InvalidParameters {
        command: expected.as_str().to_string(),
        reason: format!("planner received a {} command", spec.kind().as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_non_batch_kind_has_a_planner() {
        let registry = Registry::new();
        for kind in CommandKind::ALL {
            assert_eq!(registry.planner(kind).is_some(), kind != CommandKind::Batch, "{}", kind.as_str());
        }
    }
}
