//! The engine: owns storage, history, the active session and the clip cache,
//! and runs one command at a time to completion.

use rusqlite::Connection;
use serde_json::Value;

use super::registry::{PlanContext, Planned, Registry};
use super::{require_sequence, BatchParams, CommandOutcome, CommandRequest, CommandSpec, Preview};
use crate::config::EngineConfig;
use crate::db::schema::{self, CommandRecord};
use crate::db::{self, Database};
use crate::error::EngineError;
use crate::hasher;
use crate::history::{self, CommandStatus, HistoryEntry, HistoryManager, UndoRecord};
use crate::media::{MediaProvider, SqliteMediaProvider};
use crate::session::Session;
use crate::timeline::cache::ClipCache;
use crate::timeline::link;
use crate::timeline::mutation::{apply_mutations, Mutation};
use crate::timeline::notify::{ChangeListener, SequenceChanges};
use crate::timeline::{Clip, Rational};

/// Result of running one command (or one batch) against storage.
#[derive(Default)]
struct Run {
    /// `None` when the command planned no changes.
    entry: Option<HistoryEntry>,
    pre_hash: Option<String>,
    post_hash: Option<String>,
    note: Option<String>,
}

pub struct Engine {
    db: Database,
    config: EngineConfig,
    registry: Registry,
    history: HistoryManager,
    media: Box<dyn MediaProvider>,
    cache: ClipCache,
    session: Option<Session>,
    listeners: Vec<Box<dyn ChangeListener>>,
}

impl Engine {
    /// Open the database named by `config` (in memory when it names none).
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let db = match &config.database_path {
            Some(path) => Database::new(path, config.wal)?,
            None => Database::new_in_memory()?,
        };
        Ok(Self::with_database(db, config))
    }

    pub fn with_database(db: Database, config: EngineConfig) -> Self {
        log::info!(
            "Engine ready (undo depth {}, punch-through {:?})",
            config.max_undo_depth,
            config.punch_through
        );
        Self {
            db,
            registry: Registry::new(),
            history: HistoryManager::new(config.max_undo_depth),
            media: Box::new(SqliteMediaProvider),
            cache: ClipCache::new(),
            session: None,
            listeners: Vec::new(),
            config,
        }
    }

    pub fn set_media_provider(&mut self, provider: Box<dyn MediaProvider>) {
        self.media = provider;
    }

    pub fn add_listener(&mut self, listener: impl ChangeListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn conn(&self) -> &Connection {
        &self.db.conn
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn cache(&self) -> &ClipCache {
        &self.cache
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    // ── Session ──

    /// Make `sequence_id` the active sequence: a fresh session and a warm cache.
    pub fn activate_sequence(&mut self, sequence_id: &str) -> Result<(), EngineError> {
        let sequence = require_sequence(&self.db.conn, sequence_id)?;
        if let Some(previous) = self.session.take() {
            previous.persist(&self.db.conn)?;
        }
        self.session = Some(Session::open(&sequence));
        self.cache.load(&self.db.conn, sequence_id)?;
        log::info!("Activated sequence {} ({})", sequence.name, sequence.id);
        Ok(())
    }

    pub fn deactivate_sequence(&mut self) -> Result<(), EngineError> {
        if let Some(session) = self.session.take() {
            session.persist(&self.db.conn)?;
        }
        self.cache.invalidate();
        Ok(())
    }

    /// Zoom-fit the active sequence's viewport, or restore it if already fitted.
    pub fn toggle_zoom_fit(&mut self) -> Result<(), EngineError> {
        let sequence_id = self
            .session
            .as_ref()
            .map(|s| s.sequence_id().to_string())
            .ok_or(EngineError::NoActiveSequence)?;
        let sequence = require_sequence(&self.db.conn, &sequence_id)?;
        self.ensure_cache();

        let end = self
            .cache
            .clips()
            .iter()
            .filter(|c| c.enabled)
            .map(Clip::end)
            .max()
            .map(|end| end.rescale(sequence.rate))
            .unwrap_or_else(|| Rational::zero(sequence.rate));
        match self.session.as_mut() {
            Some(session) => session.toggle_zoom_fit(end),
            None => Err(EngineError::NoActiveSequence),
        }
    }

    /// Reload the cache if an untracked change invalidated it.
    fn ensure_cache(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if self.cache.is_valid_for(session.sequence_id()) {
            return;
        }
        if let Err(e) = self.cache.load(&self.db.conn, session.sequence_id()) {
            log::warn!("Could not reload clip cache: {e}");
            self.cache.invalidate();
        }
    }

    // ── Execution ──

    /// Validate and run a request. Contract errors come back as `Err`; domain
    /// failures as an outcome with `success == false`, storage untouched.
    pub fn execute(&mut self, request: &CommandRequest) -> Result<CommandOutcome, EngineError> {
        let spec = CommandSpec::from_request(request)?;
        self.execute_spec(&spec)
    }

    pub fn execute_spec(&mut self, spec: &CommandSpec) -> Result<CommandOutcome, EngineError> {
        let kind = spec.kind();
        log::info!("Executing {}", kind.as_str());
        self.ensure_cache();

        let (run, error) = match spec {
            CommandSpec::Batch(batch) => self.run_batch(batch),
            _ => match self.run_single(spec) {
                Ok(run) => (run, None),
                Err(e) => (Run::default(), Some(e)),
            },
        };

        let status = if error.is_some() {
            CommandStatus::Failed
        } else {
            CommandStatus::Executed
        };
        let logged = if run.entry.is_some() || error.is_some() {
            self.log_command(spec, status, run.pre_hash, run.post_hash)
        } else {
            None
        };
        if let Some(mut entry) = run.entry {
            entry.command_id = logged.map(|r| r.id);
            self.history.push(entry);
        }

        match error {
            None => {
                log::info!("{} done", kind.as_str());
                Ok(CommandOutcome::ok().with_note(run.note))
            }
            Some(e) => {
                log::warn!("{} failed: {e}", kind.as_str());
                outcome_for(e)
            }
        }
    }

    /// Dry run: report what `request` would change without writing anything.
    pub fn preview(&self, request: &CommandRequest) -> Result<CommandOutcome, EngineError> {
        let spec = CommandSpec::from_request(request)?;
        self.preview_spec(&spec)
    }

    pub fn preview_spec(&self, spec: &CommandSpec) -> Result<CommandOutcome, EngineError> {
        let result = db::in_discarded_transaction(&self.db.conn, |_| self.dry_run(spec, &self.cache, false));
        match result {
            Ok(mutations) => Ok(CommandOutcome::ok().with_preview(Preview::from_mutations(&mutations))),
            Err(e) => outcome_for(e),
        }
    }

    fn plan(&self, spec: &CommandSpec, cache: &ClipCache) -> Result<Planned, EngineError> {
        let kind = spec.kind();
        let planner = self
            .registry
            .planner(kind)
            .ok_or_else(|| EngineError::InvalidParameters {
                command: kind.as_str().to_string(),
                reason: "no planner registered".into(),
            })?;
        let selection = self.session.as_ref().map(Session::selection).unwrap_or_default();
        let ctx = PlanContext {
            conn: &self.db.conn,
            config: &self.config,
            media: self.media.as_ref(),
            cache,
            selection: &selection,
            active_sequence: self.session.as_ref().map(Session::sequence_id),
        };
        let mut planned = planner(&ctx, spec)?;
        link::append_link_cleanup(&self.db.conn, &mut planned.plan)?;
        Ok(planned)
    }

    fn run_single(&mut self, spec: &CommandSpec) -> Result<Run, EngineError> {
        let planned = self.plan(spec, &self.cache)?;
        if planned.plan.is_empty() {
            log::info!("{} planned no changes", spec.kind().as_str());
            return Ok(Run {
                note: planned.note,
                ..Run::default()
            });
        }

        let pre_hash = self.logged_hash(planned.sequence_id.as_deref());
        let mutations = planned.plan.into_mutations();
        let changes = apply_mutations(&self.db.conn, &mutations)?;
        let post_hash = self.logged_hash(planned.sequence_id.as_deref());
        self.publish(&changes);

        Ok(Run {
            entry: Some(HistoryEntry::new(spec.kind().as_str(), UndoRecord::Mutations(mutations))),
            pre_hash,
            post_hash,
            note: planned.note,
        })
    }

    /// Children run in order, each in its own transaction. The first failure
    /// stops the batch; children that already ran stay applied and are
    /// recorded so the partial batch can still be undone as one step.
    fn run_batch(&mut self, batch: &BatchParams) -> (Run, Option<EngineError>) {
        let mut children = Vec::new();
        let mut run = Run::default();
        let mut notes = Vec::new();
        let mut error = None;

        for (i, child) in batch.commands.iter().enumerate() {
            let result = match child {
                CommandSpec::Batch(inner) => match self.run_batch(inner) {
                    (inner_run, None) => Ok(inner_run),
                    (inner_run, Some(e)) => {
                        children.extend(inner_run.entry);
                        Err(e)
                    }
                },
                _ => self.run_single(child),
            };
            match result {
                Ok(child_run) => {
                    if run.pre_hash.is_none() {
                        run.pre_hash = child_run.pre_hash;
                    }
                    if child_run.post_hash.is_some() {
                        run.post_hash = child_run.post_hash;
                    }
                    notes.extend(child_run.note);
                    children.extend(child_run.entry);
                }
                Err(e) => {
                    log::warn!("Batch stopped at child {i} ({}): {e}", child.kind().as_str());
                    error = Some(e);
                    break;
                }
            }
        }

        if !children.is_empty() {
            run.entry = Some(HistoryEntry::new("Batch", UndoRecord::Batch(children)));
        }
        if !notes.is_empty() {
            run.note = Some(notes.join("; "));
        }
        (run, error)
    }

    /// Planned mutations for `spec`. Batch children are applied as they go so
    /// later children plan against earlier ones; callers run this inside a
    /// discarded savepoint.
    fn dry_run(&self, spec: &CommandSpec, cache: &ClipCache, apply: bool) -> Result<Vec<Mutation>, EngineError> {
        match spec {
            CommandSpec::Batch(batch) => {
                let cold = ClipCache::new();
                let mut all = Vec::new();
                for child in &batch.commands {
                    all.extend(self.dry_run(child, &cold, true)?);
                }
                Ok(all)
            }
            _ => {
                let mutations = self.plan(spec, cache)?.plan.into_mutations();
                if apply {
                    apply_mutations(&self.db.conn, &mutations)?;
                }
                Ok(mutations)
            }
        }
    }

    fn publish(&mut self, changes: &[SequenceChanges]) {
        for change in changes {
            if !self.cache.apply(change) && self.cache.sequence_id().is_some() {
                log::debug!(
                    "Change to untracked sequence {}; invalidating clip cache",
                    change.sequence_id
                );
                self.cache.invalidate();
            }
            if let Some(session) = self.session.as_mut() {
                if session.sequence_id() == change.sequence_id {
                    session.forget_clips(&change.deletes);
                }
            }
            for listener in &mut self.listeners {
                listener.on_changes(change);
            }
        }
    }

    // ── Undo / redo ──

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> Result<CommandOutcome, EngineError> {
        let Some(entry) = self.history.pop_undo() else {
            return outcome_for(EngineError::NothingToUndo);
        };
        log::info!("Undo {}", entry.label);
        match history::revert_entry(&self.db.conn, &entry) {
            Ok(changes) => {
                self.publish(&changes);
                self.mark(&entry, CommandStatus::Undone);
                self.history.push_redo(entry);
                Ok(CommandOutcome::ok())
            }
            Err(e) => {
                log::error!("Undo of {} failed: {e}", entry.label);
                self.history.restore_undo(entry);
                outcome_for(e)
            }
        }
    }

    pub fn redo(&mut self) -> Result<CommandOutcome, EngineError> {
        let Some(entry) = self.history.pop_redo() else {
            return outcome_for(EngineError::NothingToRedo);
        };
        log::info!("Redo {}", entry.label);
        match history::reapply_entry(&self.db.conn, &entry) {
            Ok(changes) => {
                self.publish(&changes);
                self.mark(&entry, CommandStatus::Executed);
                self.history.restore_undo(entry);
                Ok(CommandOutcome::ok())
            }
            Err(e) => {
                log::error!("Redo of {} failed: {e}", entry.label);
                self.history.push_redo(entry);
                outcome_for(e)
            }
        }
    }

    // ── Command log and state hashes ──

    pub fn state_hash(&self, sequence_id: &str) -> Result<String, EngineError> {
        hasher::sequence_state_hash(&self.db.conn, sequence_id)
    }

    pub fn command_log(&self, limit: u32) -> Result<Vec<CommandRecord>, EngineError> {
        Ok(schema::get_command_log(&self.db.conn, limit)?)
    }

    fn logged_hash(&self, sequence_id: Option<&str>) -> Option<String> {
        if !self.config.persist_command_log {
            return None;
        }
        let sequence_id = sequence_id?;
        match hasher::sequence_state_hash(&self.db.conn, sequence_id) {
            Ok(hash) => Some(hash),
            Err(e) => {
                log::warn!("Could not hash sequence {sequence_id}: {e}");
                None
            }
        }
    }

    fn log_command(
        &self,
        spec: &CommandSpec,
        status: CommandStatus,
        pre_hash: Option<String>,
        post_hash: Option<String>,
    ) -> Option<CommandRecord> {
        if !self.config.persist_command_log {
            return None;
        }
        let parameters = spec
            .to_request()
            .map(|r| Value::Object(r.parameters))
            .unwrap_or(Value::Null);
        match history::log_command(&self.db.conn, spec.kind().as_str(), &parameters, status, pre_hash, post_hash) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Could not write command log: {e}");
                None
            }
        }
    }

    fn mark(&self, entry: &HistoryEntry, status: CommandStatus) {
        let Some(command_id) = &entry.command_id else {
            return;
        };
        if let Err(e) = history::mark_command(&self.db.conn, command_id, status) {
            log::warn!("Could not update command {command_id}: {e}");
        }
    }
}

fn outcome_for(err: EngineError) -> Result<CommandOutcome, EngineError> {
    if err.is_contract() {
        Err(err)
    } else {
        Ok(CommandOutcome::failed(&err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{insert_project, insert_sequence, insert_track, Project};
    use crate::timeline::{FrameRate, Sequence, Track, TrackKind};
    use std::sync::{Arc, Mutex};

    fn t(frames: i64) -> Rational {
        Rational::from_frames(frames, FrameRate::FPS_30)
    }

    fn setup() -> (Engine, Sequence, Track) {
        let engine = Engine::open(EngineConfig::default()).unwrap();
        insert_project(engine.conn(), &Project { id: "p".into(), name: "P".into(), created_at: "now".into() }).unwrap();
        let seq = Sequence::new("p", "S", FrameRate::FPS_30, 1920, 1080);
        insert_sequence(engine.conn(), &seq).unwrap();
        let track = Track::new(&seq.id, TrackKind::Video, 1);
        insert_track(engine.conn(), &track).unwrap();
        (engine, seq, track)
    }

    fn overwrite(track: &Track, start: i64, duration: i64) -> CommandRequest {
        CommandRequest::new("Overwrite")
            .with("track_id", &track.id)
            .unwrap()
            .with("start", t(start))
            .unwrap()
            .with("duration", t(duration))
            .unwrap()
    }

    #[test]
    fn test_execute_undo_redo_with_command_log() {
        let (mut engine, seq, track) = setup();
        let empty = engine.state_hash(&seq.id).unwrap();

        let outcome = engine.execute(&overwrite(&track, 0, 30)).unwrap();
        assert!(outcome.success);
        let after = engine.state_hash(&seq.id).unwrap();
        assert_ne!(after, empty);

        let log = engine.command_log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].pre_hash.as_deref(), Some(empty.as_str()));
        assert_eq!(log[0].post_hash.as_deref(), Some(after.as_str()));

        assert!(engine.undo().unwrap().success);
        assert_eq!(engine.state_hash(&seq.id).unwrap(), empty);
        assert_eq!(engine.command_log(10).unwrap()[0].status, "undone");

        assert!(engine.redo().unwrap().success);
        assert_eq!(engine.state_hash(&seq.id).unwrap(), after);
        assert!(!engine.can_redo());
    }

    #[test]
    fn test_domain_failure_is_an_outcome_and_contract_failure_is_err() {
        let (mut engine, _, _) = setup();
        let request = CommandRequest::new("Cut").with("clip_ids", vec!["missing"]).unwrap();
        let outcome = engine.execute(&request).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_code, Some("CLIP_NOT_FOUND"));

        let request = CommandRequest::new("Cut");
        assert!(engine.execute(&request).is_err());

        let outcome = engine.undo().unwrap();
        assert_eq!(outcome.error_code, Some("UNDO_EMPTY"));
    }

    #[test]
    fn test_listeners_and_cache_follow_changes() {
        let (mut engine, seq, track) = setup();
        engine.activate_sequence(&seq.id).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.add_listener(move |changes: &SequenceChanges| {
            sink.lock().unwrap().push(changes.summary());
        });

        engine.execute(&overwrite(&track, 0, 30)).unwrap();
        assert_eq!(engine.cache().len(), 1);
        engine.undo().unwrap();
        assert!(engine.cache().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_preview_leaves_storage_untouched() {
        let (engine, seq, track) = setup();
        let before = engine.state_hash(&seq.id).unwrap();
        let outcome = engine.preview(&overwrite(&track, 0, 30)).unwrap();
        let preview = outcome.preview.unwrap();
        assert_eq!(preview.counts.inserts, 1);
        assert_eq!(preview.projected[0].timeline_start, t(0));
        assert_eq!(engine.state_hash(&seq.id).unwrap(), before);
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_zoom_fit_uses_timeline_end() {
        let (mut engine, seq, track) = setup();
        assert!(matches!(engine.toggle_zoom_fit(), Err(EngineError::NoActiveSequence)));
        engine.execute(&overwrite(&track, 0, 300)).unwrap();
        engine.activate_sequence(&seq.id).unwrap();
        engine.toggle_zoom_fit().unwrap();
        assert_eq!(engine.session().unwrap().viewport(), (t(0), t(330)));
    }
}
