//! Undo/redo history and the persisted command log.
//!
//! - Two stacks: undo (executed commands) and redo (commands undone since the
//!   last new execution).
//! - Executing a new command clears redo.
//! - The undo stack is capped at a configurable depth; the oldest entries
//!   fall off the bottom.
//!
//! Entries carry the exact mutation lists the executors produced, so undo
//! and redo both go through the generic apply/revert path.

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::schema::{self, CommandRecord};
use crate::error::EngineError;
use crate::timeline::mutation::{apply_mutations, revert_mutations, Mutation};
use crate::timeline::notify::SequenceChanges;

/// How to undo (and redo) one executed command.
#[derive(Debug, Clone)]
pub enum UndoRecord {
    Mutations(Vec<Mutation>),
    /// Children in execution order.
    Batch(Vec<HistoryEntry>),
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Id of the command's row in the command log, when logged.
    pub command_id: Option<String>,
    pub label: String,
    pub record: UndoRecord,
}

impl HistoryEntry {
    pub fn new(label: &str, record: UndoRecord) -> Self {
        Self {
            command_id: None,
            label: label.to_string(),
            record,
        }
    }
}

pub struct HistoryManager {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
}

impl HistoryManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Record a freshly executed command. Clears the redo stack.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.redo_stack.clear();
        log::debug!("History entry pushed: {}", entry.label);
        self.undo_stack.push(entry);
        while self.undo_stack.len() > self.max_entries {
            let dropped = self.undo_stack.remove(0);
            log::debug!("History depth exceeded; dropped {}", dropped.label);
        }
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo_stack.pop()
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo_stack.pop()
    }

    /// Put an entry back on the undo stack without touching redo, after a
    /// redo succeeded or an undo failed.
    pub fn restore_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
    }

    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo_stack.push(entry);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Labels from most recent to oldest.
    pub fn undo_labels(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|e| e.label.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Undo one entry. Batches revert children last to first; if a child fails,
/// the children already reverted are re-applied before the error is returned.
pub fn revert_entry(conn: &Connection, entry: &HistoryEntry) -> Result<Vec<SequenceChanges>, EngineError> {
    match &entry.record {
        UndoRecord::Mutations(mutations) if mutations.is_empty() => Err(EngineError::NoInverse(entry.label.clone())),
        UndoRecord::Batch(children) if children.is_empty() => Err(EngineError::NoInverse(entry.label.clone())),
        UndoRecord::Mutations(mutations) => revert_mutations(conn, mutations),
        UndoRecord::Batch(children) => {
            let mut changes = Vec::new();
            for (i, child) in children.iter().enumerate().rev() {
                match revert_entry(conn, child) {
                    Ok(c) => changes.extend(c),
                    Err(e) => {
                        log::error!("Undo of batch child {} ({}) failed: {e}", i, child.label);
                        for reverted in &children[i + 1..] {
                            if let Err(again) = reapply_entry(conn, reverted) {
                                log::error!("Could not restore batch child {}: {again}", reverted.label);
                            }
                        }
                        return Err(e);
                    }
                }
            }
            Ok(changes)
        }
    }
}

/// Redo one entry by re-applying its recorded mutations exactly.
pub fn reapply_entry(conn: &Connection, entry: &HistoryEntry) -> Result<Vec<SequenceChanges>, EngineError> {
    match &entry.record {
        UndoRecord::Mutations(mutations) => apply_mutations(conn, mutations),
        UndoRecord::Batch(children) => {
            let mut changes = Vec::new();
            for (i, child) in children.iter().enumerate() {
                match reapply_entry(conn, child) {
                    Ok(c) => changes.extend(c),
                    Err(e) => {
                        log::error!("Redo of batch child {} ({}) failed: {e}", i, child.label);
                        for applied in children[..i].iter().rev() {
                            if let Err(again) = revert_entry(conn, applied) {
                                log::error!("Could not roll back batch child {}: {again}", applied.label);
                            }
                        }
                        return Err(e);
                    }
                }
            }
            Ok(changes)
        }
    }
}

// ── Command log ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Executed,
    Undone,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Executed => "executed",
            CommandStatus::Undone => "undone",
            CommandStatus::Failed => "failed",
        }
    }
}

/// Append a row to the command log with the next sequence number.
pub fn log_command(
    conn: &Connection,
    command_type: &str,
    parameters: &serde_json::Value,
    status: CommandStatus,
    pre_hash: Option<String>,
    post_hash: Option<String>,
) -> Result<CommandRecord, EngineError> {
    let now = Utc::now().to_rfc3339();
    let record = CommandRecord {
        id: Uuid::new_v4().to_string(),
        sequence_number: schema::next_command_sequence_number(conn)?,
        command_type: command_type.to_string(),
        parameters: parameters.to_string(),
        status: status.as_str().to_string(),
        pre_hash,
        post_hash,
        created_at: now.clone(),
        executed_at: (status == CommandStatus::Executed).then_some(now),
    };
    schema::insert_command_record(conn, &record)?;
    Ok(record)
}

pub fn mark_command(conn: &Connection, command_id: &str, status: CommandStatus) -> Result<(), EngineError> {
    schema::update_command_status(conn, command_id, status.as_str())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn entry(label: &str) -> HistoryEntry {
        HistoryEntry::new(label, UndoRecord::Mutations(Vec::new()))
    }

    #[test]
    fn test_push_clears_redo_and_caps_depth() {
        let mut history = HistoryManager::new(2);
        history.push(entry("a"));
        history.push(entry("b"));
        history.push(entry("c"));
        assert_eq!(history.undo_labels(), vec!["c", "b"]);

        let undone = history.pop_undo().unwrap();
        history.push_redo(undone);
        assert!(history.can_redo());

        history.push(entry("d"));
        assert!(!history.can_redo());
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_entry_without_mutations_has_no_inverse() {
        let db = Database::new_in_memory().unwrap();
        let err = revert_entry(&db.conn, &entry("empty")).unwrap_err();
        assert!(matches!(err, EngineError::NoInverse(label) if label == "empty"));

        let batch = HistoryEntry::new("Batch", UndoRecord::Batch(vec![entry("child")]));
        assert!(matches!(revert_entry(&db.conn, &batch), Err(EngineError::NoInverse(_))));
    }

    #[test]
    fn test_command_log_numbers_rows() {
        let db = Database::new_in_memory().unwrap();
        let params = serde_json::json!({ "clip_ids": ["a"] });
        let first = log_command(&db.conn, "Cut", &params, CommandStatus::Executed, Some("h0".into()), Some("h1".into())).unwrap();
        let second = log_command(&db.conn, "Cut", &params, CommandStatus::Failed, None, None).unwrap();
        assert_eq!(second.sequence_number, first.sequence_number + 1);
        assert!(second.executed_at.is_none());

        mark_command(&db.conn, &first.id, CommandStatus::Undone).unwrap();
        let log = schema::get_command_log(&db.conn, 10).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].status, "undone");
        assert_eq!(log[1].parameters, params.to_string());
    }
}
