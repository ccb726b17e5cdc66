pub mod migrations;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(path: &Path, wal: bool) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        if wal {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn new_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> Result<(), DbError> {
        migrations::run_all(&self.conn)
    }
}

/// Run `f` inside a savepoint. `Ok` releases it, `Err` rolls every write made
/// by `f` back before returning the error. Savepoints nest, so callers may
/// freely wrap code that opens its own transaction.
pub fn in_transaction<T, E, F>(conn: &Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<DbError>,
{
    let name = format!("sp_{}", Uuid::new_v4().simple());
    conn.execute_batch(&format!("SAVEPOINT {name}"))
        .map_err(DbError::from)?;

    match f(conn) {
        Ok(value) => {
            if let Err(e) = conn.execute_batch(&format!("RELEASE {name}")) {
                rollback(conn, &name);
                return Err(DbError::from(e).into());
            }
            Ok(value)
        }
        Err(e) => {
            rollback(conn, &name);
            Err(e)
        }
    }
}

/// Run `f` inside a savepoint that is always rolled back, whatever `f` returns.
pub fn in_discarded_transaction<T, E, F>(conn: &Connection, f: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<DbError>,
{
    let name = format!("sp_{}", Uuid::new_v4().simple());
    conn.execute_batch(&format!("SAVEPOINT {name}"))
        .map_err(DbError::from)?;
    let result = f(conn);
    rollback(conn, &name);
    result
}

fn rollback(conn: &Connection, name: &str) {
    if let Err(e) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")) {
        log::error!("Failed to roll back savepoint {name}: {e}");
    } else {
        log::debug!("Rolled back savepoint {name}");
    }
}
