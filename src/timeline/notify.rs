use serde::{Deserialize, Serialize};
use super::Clip;

/// Net effect of an applied mutation on one clip row.
#[derive(Debug, Clone)]
pub enum ClipChange {
    Inserted(Clip),
    Updated(Clip),
    Deleted { clip_id: String, sequence_id: Option<String> },
}

impl ClipChange {
    fn sequence_id(&self) -> Option<&str> {
        match self {
            ClipChange::Inserted(c) | ClipChange::Updated(c) => c.owner_sequence_id.as_deref(),
            ClipChange::Deleted { sequence_id, .. } => sequence_id.as_deref(),
        }
    }
}

/// Per-sequence notification consumed by in-memory timeline caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceChanges {
    pub sequence_id: String,
    pub inserts: Vec<Clip>,
    pub updates: Vec<Clip>,
    pub deletes: Vec<String>,
}

impl SequenceChanges {
    fn new(sequence_id: &str) -> Self {
        Self {
            sequence_id: sequence_id.to_string(),
            inserts: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            inserted: self.inserts.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Receives notifications after every successful apply or revert.
pub trait ChangeListener: Send {
    fn on_changes(&mut self, changes: &SequenceChanges);
}

impl<F> ChangeListener for F
where
    F: FnMut(&SequenceChanges) + Send,
{
    fn on_changes(&mut self, changes: &SequenceChanges) {
        self(changes)
    }
}

/// Group row changes by owning sequence, preserving first-seen sequence order.
/// Master clips (no owning sequence) are not reported.
pub fn group_by_sequence(changes: Vec<ClipChange>) -> Vec<SequenceChanges> {
    let mut grouped: Vec<SequenceChanges> = Vec::new();

    for change in changes {
        let Some(sequence_id) = change.sequence_id().map(str::to_string) else {
            continue;
        };
        let index = match grouped.iter().position(|g| g.sequence_id == sequence_id) {
            Some(i) => i,
            None => {
                grouped.push(SequenceChanges::new(&sequence_id));
                grouped.len() - 1
            }
        };
        let entry = &mut grouped[index];
        match change {
            ClipChange::Inserted(clip) => entry.inserts.push(clip),
            ClipChange::Updated(clip) => entry.updates.push(clip),
            ClipChange::Deleted { clip_id, .. } => entry.deletes.push(clip_id),
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{FrameRate, Rational, Track, TrackKind};

    fn clip_in(sequence_id: &str) -> Clip {
        let track = Track::new(sequence_id, TrackKind::Video, 1);
        let t = |f| Rational::from_frames(f, FrameRate::FPS_24);
        Clip::new("p", &track, None, t(0), t(24), t(0))
    }

    #[test]
    fn test_groups_changes_per_sequence() {
        let a = clip_in("seq-a");
        let b = clip_in("seq-b");
        let mut master = clip_in("seq-a");
        master.owner_sequence_id = None;

        let grouped = group_by_sequence(vec![
            ClipChange::Inserted(a.clone()),
            ClipChange::Updated(b.clone()),
            ClipChange::Deleted { clip_id: "gone".into(), sequence_id: Some("seq-a".into()) },
            ClipChange::Inserted(master),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].sequence_id, "seq-a");
        assert_eq!(
            grouped[0].summary(),
            ChangeSummary { inserted: 1, updated: 0, deleted: 1 }
        );
        assert_eq!(grouped[1].updates[0].id, b.id);
    }
}
