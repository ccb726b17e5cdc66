use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use super::DbError;
use crate::timeline::{Clip, FrameRate, LinkGroup, LinkMember, Media, Rational, Sequence, Track, TrackKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// One row of the persisted command log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub sequence_number: i64,
    pub command_type: String,
    pub parameters: String,
    pub status: String,
    pub pre_hash: Option<String>,
    pub post_hash: Option<String>,
    pub created_at: String,
    pub executed_at: Option<String>,
}

fn rate_at(row: &Row, num_idx: usize, den_idx: usize) -> rusqlite::Result<FrameRate> {
    FrameRate::new(row.get(num_idx)?, row.get(den_idx)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(num_idx, Type::Integer, Box::new(e)))
}

fn kind_at(row: &Row, idx: usize) -> rusqlite::Result<TrackKind> {
    let raw: String = row.get(idx)?;
    TrackKind::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(DbError::Corrupt(format!("unknown track type '{raw}'"))),
        )
    })
}

// ── Projects ──

pub fn insert_project(conn: &Connection, project: &Project) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO projects (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![project.id, project.name, project.created_at],
    )?;
    Ok(())
}

pub fn get_project(conn: &Connection, project_id: &str) -> Result<Option<Project>, DbError> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM projects WHERE id = ?1")?;
    let mut rows = stmt.query(params![project_id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        }))
    } else {
        Ok(None)
    }
}

// ── Sequences ──

const SEQUENCE_COLUMNS: &str = "id, project_id, name, fps_numerator, fps_denominator, width, height, \
     playhead_frame, viewport_start_frame, viewport_duration_frames";

fn sequence_from_row(row: &Row) -> rusqlite::Result<Sequence> {
    let rate = rate_at(row, 3, 4)?;
    Ok(Sequence {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        rate,
        width: row.get(5)?,
        height: row.get(6)?,
        playhead: Rational::from_frames(row.get(7)?, rate),
        viewport_start: Rational::from_frames(row.get(8)?, rate),
        viewport_duration: Rational::from_frames(row.get(9)?, rate),
    })
}

pub fn insert_sequence(conn: &Connection, sequence: &Sequence) -> Result<(), DbError> {
    let rate = sequence.rate;
    conn.execute(
        &format!("INSERT INTO sequences ({SEQUENCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
        params![
            sequence.id, sequence.project_id, sequence.name,
            rate.num(), rate.den(), sequence.width, sequence.height,
            sequence.playhead.rescale(rate).frames(),
            sequence.viewport_start.rescale(rate).frames(),
            sequence.viewport_duration.rescale(rate).frames(),
        ],
    )?;
    Ok(())
}

pub fn get_sequence(conn: &Connection, sequence_id: &str) -> Result<Option<Sequence>, DbError> {
    let mut stmt = conn.prepare(&format!("SELECT {SEQUENCE_COLUMNS} FROM sequences WHERE id = ?1"))?;
    Ok(stmt.query_row(params![sequence_id], sequence_from_row).optional()?)
}

pub fn update_sequence_view(
    conn: &Connection,
    sequence_id: &str,
    playhead: Rational,
    viewport_start: Rational,
    viewport_duration: Rational,
) -> Result<usize, DbError> {
    let rate: Option<(i64, i64)> = conn
        .query_row(
            "SELECT fps_numerator, fps_denominator FROM sequences WHERE id = ?1",
            params![sequence_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((num, den)) = rate else {
        return Ok(0);
    };
    let rate = FrameRate::new(num, den)
        .map_err(|e| DbError::Corrupt(format!("sequence {sequence_id}: {e}")))?;
    let rows = conn.execute(
        "UPDATE sequences SET playhead_frame = ?1, viewport_start_frame = ?2, viewport_duration_frames = ?3 WHERE id = ?4",
        params![
            playhead.rescale(rate).frames(),
            viewport_start.rescale(rate).frames(),
            viewport_duration.rescale(rate).frames(),
            sequence_id,
        ],
    )?;
    Ok(rows)
}

// ── Tracks ──

pub fn insert_track(conn: &Connection, track: &Track) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO tracks (id, sequence_id, name, track_type, track_index) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![track.id, track.sequence_id, track.name, track.kind.as_str(), track.track_index],
    )?;
    Ok(())
}

fn track_from_row(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        sequence_id: row.get(1)?,
        name: row.get(2)?,
        kind: kind_at(row, 3)?,
        track_index: row.get(4)?,
    })
}

pub fn get_track(conn: &Connection, track_id: &str) -> Result<Option<Track>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, sequence_id, name, track_type, track_index FROM tracks WHERE id = ?1",
    )?;
    Ok(stmt.query_row(params![track_id], track_from_row).optional()?)
}

pub fn get_tracks_for_sequence(conn: &Connection, sequence_id: &str) -> Result<Vec<Track>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, sequence_id, name, track_type, track_index FROM tracks WHERE sequence_id = ?1 ORDER BY track_type DESC, track_index",
    )?;
    let rows = stmt.query_map(params![sequence_id], track_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ── Media ──

pub fn insert_media(conn: &Connection, media: &Media) -> Result<(), DbError> {
    let rate = media.rate();
    conn.execute(
        "INSERT INTO media (id, project_id, name, file_path, duration_frames, fps_numerator, fps_denominator) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            media.id, media.project_id, media.name, media.file_path,
            media.duration.frames(), rate.num(), rate.den(),
        ],
    )?;
    Ok(())
}

pub fn get_media(conn: &Connection, media_id: &str) -> Result<Option<Media>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, file_path, duration_frames, fps_numerator, fps_denominator FROM media WHERE id = ?1",
    )?;
    Ok(stmt
        .query_row(params![media_id], |row| {
            let rate = rate_at(row, 5, 6)?;
            Ok(Media {
                id: row.get(0)?,
                project_id: row.get(1)?,
                name: row.get(2)?,
                file_path: row.get(3)?,
                duration: Rational::from_frames(row.get(4)?, rate),
            })
        })
        .optional()?)
}

// ── Clips ──

const CLIP_COLUMNS: &str = "id, project_id, name, track_id, owner_sequence_id, parent_clip_id, media_id, \
     timeline_start_frame, duration_frames, source_in_frame, source_out_frame, \
     fps_numerator, fps_denominator, enabled, offline";

fn clip_from_row(row: &Row) -> rusqlite::Result<Clip> {
    let rate = rate_at(row, 11, 12)?;
    Ok(Clip {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        track_id: row.get(3)?,
        owner_sequence_id: row.get(4)?,
        master_clip_id: row.get(5)?,
        media_id: row.get(6)?,
        timeline_start: Rational::from_frames(row.get(7)?, rate),
        duration: Rational::from_frames(row.get(8)?, rate),
        source_in: Rational::from_frames(row.get(9)?, rate),
        source_out: Rational::from_frames(row.get(10)?, rate),
        rate,
        enabled: row.get::<_, i32>(13)? != 0,
        offline: row.get::<_, i32>(14)? != 0,
    })
}

pub fn insert_clip(conn: &Connection, clip: &Clip) -> Result<(), DbError> {
    let rate = clip.rate;
    conn.execute(
        &format!(
            "INSERT INTO clips ({CLIP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            clip.id, clip.project_id, clip.name, clip.track_id, clip.owner_sequence_id,
            clip.master_clip_id, clip.media_id,
            clip.timeline_start.rescale(rate).frames(),
            clip.duration.rescale(rate).frames(),
            clip.source_in.rescale(rate).frames(),
            clip.source_out.rescale(rate).frames(),
            rate.num(), rate.den(), clip.enabled as i32, clip.offline as i32,
        ],
    )?;
    Ok(())
}

/// Overwrite every column of an existing clip row. Returns the number of rows touched.
pub fn update_clip(conn: &Connection, clip: &Clip) -> Result<usize, DbError> {
    let rate = clip.rate;
    let rows = conn.execute(
        r#"UPDATE clips SET
             project_id = ?2, name = ?3, track_id = ?4, owner_sequence_id = ?5,
             parent_clip_id = ?6, media_id = ?7,
             timeline_start_frame = ?8, duration_frames = ?9,
             source_in_frame = ?10, source_out_frame = ?11,
             fps_numerator = ?12, fps_denominator = ?13,
             enabled = ?14, offline = ?15
           WHERE id = ?1"#,
        params![
            clip.id, clip.project_id, clip.name, clip.track_id, clip.owner_sequence_id,
            clip.master_clip_id, clip.media_id,
            clip.timeline_start.rescale(rate).frames(),
            clip.duration.rescale(rate).frames(),
            clip.source_in.rescale(rate).frames(),
            clip.source_out.rescale(rate).frames(),
            rate.num(), rate.den(), clip.enabled as i32, clip.offline as i32,
        ],
    )?;
    Ok(rows)
}

pub fn delete_clip(conn: &Connection, clip_id: &str) -> Result<usize, DbError> {
    let rows = conn.execute("DELETE FROM clips WHERE id = ?1", params![clip_id])?;
    Ok(rows)
}

pub fn get_clip(conn: &Connection, clip_id: &str) -> Result<Option<Clip>, DbError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {CLIP_COLUMNS} FROM clips WHERE id = ?1"))?;
    Ok(stmt.query_row(params![clip_id], clip_from_row).optional()?)
}

pub fn get_clips_for_track(conn: &Connection, track_id: &str) -> Result<Vec<Clip>, DbError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CLIP_COLUMNS} FROM clips WHERE track_id = ?1 ORDER BY timeline_start_frame, id"
    ))?;
    let rows = stmt.query_map(params![track_id], clip_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Every clip placed on a track of `sequence_id`, ordered by track then start.
pub fn get_clips_for_sequence(conn: &Connection, sequence_id: &str) -> Result<Vec<Clip>, DbError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CLIP_COLUMNS} FROM clips
         WHERE track_id IN (SELECT id FROM tracks WHERE sequence_id = ?1)
         ORDER BY track_id, timeline_start_frame, id"
    ))?;
    let rows = stmt.query_map(params![sequence_id], clip_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ── Link groups ──

pub fn insert_link_group(conn: &Connection, group: &LinkGroup) -> Result<(), DbError> {
    conn.execute("INSERT INTO link_groups (id) VALUES (?1)", params![group.id])?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO link_group_members (clip_id, group_id, member_index, role, time_offset_frames, fps_numerator, fps_denominator)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (index, member) in group.members.iter().enumerate() {
        let rate = member.time_offset.rate();
        stmt.execute(params![
            member.clip_id, group.id, index as i64, member.role.as_str(),
            member.time_offset.frames(), rate.num(), rate.den(),
        ])?;
    }
    Ok(())
}

/// Removes the group and, through the cascade, all of its member rows.
pub fn delete_link_group(conn: &Connection, group_id: &str) -> Result<usize, DbError> {
    let rows = conn.execute("DELETE FROM link_groups WHERE id = ?1", params![group_id])?;
    Ok(rows)
}

pub fn get_link_group(conn: &Connection, group_id: &str) -> Result<Option<LinkGroup>, DbError> {
    let mut stmt = conn.prepare_cached(
        "SELECT clip_id, role, time_offset_frames, fps_numerator, fps_denominator
         FROM link_group_members WHERE group_id = ?1 ORDER BY member_index",
    )?;
    let rows = stmt.query_map(params![group_id], |row| {
        let rate = rate_at(row, 3, 4)?;
        Ok(LinkMember {
            clip_id: row.get(0)?,
            role: kind_at(row, 1)?,
            time_offset: Rational::from_frames(row.get(2)?, rate),
        })
    })?;
    let members = rows.collect::<Result<Vec<_>, _>>()?;
    if members.is_empty() {
        return Ok(None);
    }
    Ok(Some(LinkGroup {
        id: group_id.to_string(),
        members,
    }))
}

pub fn get_link_group_for_clip(conn: &Connection, clip_id: &str) -> Result<Option<LinkGroup>, DbError> {
    let group_id: Option<String> = conn
        .query_row(
            "SELECT group_id FROM link_group_members WHERE clip_id = ?1",
            params![clip_id],
            |row| row.get(0),
        )
        .optional()?;
    match group_id {
        Some(id) => get_link_group(conn, &id),
        None => Ok(None),
    }
}

// ── Command log ──

pub fn next_command_sequence_number(conn: &Connection) -> Result<i64, DbError> {
    let n: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM commands",
        [],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub fn insert_command_record(conn: &Connection, record: &CommandRecord) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO commands (id, sequence_number, command_type, parameters, status, pre_hash, post_hash, created_at, executed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id, record.sequence_number, record.command_type, record.parameters,
            record.status, record.pre_hash, record.post_hash, record.created_at, record.executed_at,
        ],
    )?;
    Ok(())
}

pub fn update_command_status(conn: &Connection, command_id: &str, status: &str) -> Result<(), DbError> {
    conn.execute(
        "UPDATE commands SET status = ?1 WHERE id = ?2",
        params![status, command_id],
    )?;
    Ok(())
}

pub fn get_command_log(conn: &Connection, limit: u32) -> Result<Vec<CommandRecord>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, sequence_number, command_type, parameters, status, pre_hash, post_hash, created_at, executed_at
         FROM commands ORDER BY sequence_number DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(CommandRecord {
            id: row.get(0)?,
            sequence_number: row.get(1)?,
            command_type: row.get(2)?,
            parameters: row.get(3)?,
            status: row.get(4)?,
            pre_hash: row.get(5)?,
            post_hash: row.get(6)?,
            created_at: row.get(7)?,
            executed_at: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn seed(conn: &Connection) -> (Sequence, Track) {
        insert_project(conn, &Project { id: "p".into(), name: "Demo".into(), created_at: "now".into() }).unwrap();
        let sequence = Sequence::new("p", "Main", FrameRate::FPS_30, 1920, 1080);
        insert_sequence(conn, &sequence).unwrap();
        let track = Track::new(&sequence.id, TrackKind::Video, 1);
        insert_track(conn, &track).unwrap();
        (sequence, track)
    }

    #[test]
    fn test_clip_row_round_trips_exactly() {
        let db = Database::new_in_memory().unwrap();
        let (_, track) = seed(&db.conn);
        let at = |f| Rational::from_frames(f, FrameRate::FPS_29_97);
        let mut clip = Clip::new("p", &track, Some("m1"), at(80), at(70), at(12)).with_name("A");
        clip.master_clip_id = Some("master".into());
        insert_clip(&db.conn, &clip).unwrap();

        let loaded = get_clip(&db.conn, &clip.id).unwrap().unwrap();
        assert!(loaded.same_row(&clip));
    }

    #[test]
    fn test_update_and_delete_report_rows_touched() {
        let db = Database::new_in_memory().unwrap();
        let (_, track) = seed(&db.conn);
        let at = |f| Rational::from_frames(f, FrameRate::FPS_30);
        let mut clip = Clip::new("p", &track, None, at(0), at(10), at(0));
        assert_eq!(update_clip(&db.conn, &clip).unwrap(), 0);

        insert_clip(&db.conn, &clip).unwrap();
        clip.timeline_start = at(5);
        assert_eq!(update_clip(&db.conn, &clip).unwrap(), 1);
        assert_eq!(get_clips_for_track(&db.conn, &track.id).unwrap()[0].timeline_start.frames(), 5);
        assert_eq!(delete_clip(&db.conn, &clip.id).unwrap(), 1);
        assert!(get_clip(&db.conn, &clip.id).unwrap().is_none());
    }

    #[test]
    fn test_link_membership_is_exclusive() {
        let db = Database::new_in_memory().unwrap();
        seed(&db.conn);
        let offset = Rational::zero(FrameRate::FPS_30);
        let member = |id: &str| LinkMember { clip_id: id.into(), role: TrackKind::Video, time_offset: offset };
        let first = LinkGroup { id: "g1".into(), members: vec![member("a"), member("b")] };
        insert_link_group(&db.conn, &first).unwrap();

        let second = LinkGroup { id: "g2".into(), members: vec![member("b"), member("c")] };
        assert!(insert_link_group(&db.conn, &second).is_err());

        assert_eq!(get_link_group_for_clip(&db.conn, "b").unwrap(), Some(first));
        delete_link_group(&db.conn, "g1").unwrap();
        assert!(get_link_group_for_clip(&db.conn, "a").unwrap().is_none());
    }
}
