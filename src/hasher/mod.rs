use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::db::schema;
use crate::error::EngineError;

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 over every clip row of the sequence (in id order) and the link
/// group each clip belongs to. Two states hash equal exactly when the stored
/// rows are identical, including the rate each time value is stored at.
pub fn sequence_state_hash(conn: &Connection, sequence_id: &str) -> Result<String, EngineError> {
    let mut clips = schema::get_clips_for_sequence(conn, sequence_id)?;
    clips.sort_by(|a, b| a.id.cmp(&b.id));

    let mut state = sequence_id.as_bytes().to_vec();
    for clip in &clips {
        let row = serde_json::to_vec(clip).map_err(|e| EngineError::Rejected(format!("cannot encode clip {}: {e}", clip.id)))?;
        state.extend_from_slice(&row);
        if let Some(group) = schema::get_link_group_for_clip(conn, &clip.id)? {
            state.extend_from_slice(group.id.as_bytes());
            for member in &group.members {
                state.extend_from_slice(member.clip_id.as_bytes());
            }
        }
        state.push(b'\n');
    }
    Ok(hash_bytes(&state))
}
