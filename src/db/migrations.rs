use rusqlite::Connection;
use super::DbError;

const MIGRATIONS: &[&str] = &[
    // V1: Timeline schema
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sequences (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL,
        fps_numerator INTEGER NOT NULL CHECK (fps_numerator > 0),
        fps_denominator INTEGER NOT NULL CHECK (fps_denominator > 0),
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        playhead_frame INTEGER NOT NULL DEFAULT 0,
        viewport_start_frame INTEGER NOT NULL DEFAULT 0,
        viewport_duration_frames INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS tracks (
        id TEXT PRIMARY KEY,
        sequence_id TEXT NOT NULL REFERENCES sequences(id),
        name TEXT NOT NULL,
        track_type TEXT NOT NULL CHECK (track_type IN ('video', 'audio')),
        track_index INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS media (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        duration_frames INTEGER NOT NULL,
        fps_numerator INTEGER NOT NULL CHECK (fps_numerator > 0),
        fps_denominator INTEGER NOT NULL CHECK (fps_denominator > 0)
    );

    CREATE TABLE IF NOT EXISTS clips (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id),
        name TEXT NOT NULL DEFAULT '',
        track_id TEXT REFERENCES tracks(id),
        owner_sequence_id TEXT REFERENCES sequences(id),
        parent_clip_id TEXT,
        media_id TEXT,
        timeline_start_frame INTEGER NOT NULL,
        duration_frames INTEGER NOT NULL CHECK (duration_frames > 0),
        source_in_frame INTEGER NOT NULL,
        source_out_frame INTEGER NOT NULL,
        fps_numerator INTEGER NOT NULL CHECK (fps_numerator > 0),
        fps_denominator INTEGER NOT NULL CHECK (fps_denominator > 0),
        enabled INTEGER NOT NULL DEFAULT 1,
        offline INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_clips_track_start ON clips(track_id, timeline_start_frame);
    CREATE INDEX IF NOT EXISTS idx_clips_sequence ON clips(owner_sequence_id);

    CREATE TABLE IF NOT EXISTS link_groups (
        id TEXT PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS link_group_members (
        clip_id TEXT PRIMARY KEY,
        group_id TEXT NOT NULL REFERENCES link_groups(id) ON DELETE CASCADE,
        member_index INTEGER NOT NULL,
        role TEXT NOT NULL,
        time_offset_frames INTEGER NOT NULL,
        fps_numerator INTEGER NOT NULL,
        fps_denominator INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS commands (
        id TEXT PRIMARY KEY,
        sequence_number INTEGER NOT NULL UNIQUE,
        command_type TEXT NOT NULL,
        parameters TEXT NOT NULL,
        status TEXT NOT NULL,
        pre_hash TEXT,
        post_hash TEXT,
        created_at TEXT NOT NULL,
        executed_at TEXT
    );

    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    );
    INSERT OR IGNORE INTO schema_version (version) VALUES (1);
    "#,
];

pub fn run_all(conn: &Connection) -> Result<(), DbError> {
    let current_version = get_version(conn);

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i64;
        if version > current_version {
            conn.execute_batch(migration)
                .map_err(|e| DbError::Migration(format!("Migration v{version} failed: {e}")))?;
            log::info!("Applied schema migration v{version}");
        }
    }

    Ok(())
}

fn get_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}
