// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info};

use super::SoundStore;
use crate::error::{Error, Result};
use crate::keys::KeyLabel;
use crate::sound::{Blob, NewSound, Sound, SoundId};

/// Database name that keeps everything in memory.
pub const IN_MEMORY: &str = ":memory:";

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V1 = 1,
}

impl Version {
    const LATEST: Version = Version::V1;
}

/// A sound store backed by a single SQLite file.
pub struct SqliteStore {
    path: PathBuf,
    db: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Creates a store for the given file. Nothing is opened until `init`.
    pub fn new(path: &Path) -> SqliteStore {
        SqliteStore {
            path: path.to_path_buf(),
            db: Mutex::new(None),
        }
    }

    /// Creates a store that lives only as long as this value.
    pub fn in_memory() -> SqliteStore {
        SqliteStore::new(Path::new(IN_MEMORY))
    }

    fn with_db<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let db = self.db.lock();
        match db.as_ref() {
            Some(db) => f(db),
            None => Err(Error::NotReady),
        }
    }

    fn create_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sounds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                key TEXT,
                blob_type TEXT NOT NULL,
                blob BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                duration REAL
            );

            CREATE INDEX IF NOT EXISTS sounds_key ON sounds (key);
            CREATE INDEX IF NOT EXISTS sounds_name ON sounds (name);
            CREATE INDEX IF NOT EXISTS sounds_created_at ON sounds (created_at);
        ",
        )?;
        Ok(())
    }

    fn read_version(db: &Connection) -> Result<Option<Version>> {
        let version: u32 = db.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        match version {
            0 => Ok(None),
            1 => Ok(Some(Version::V1)),
            other => Err(Error::Storage(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISMATCH),
                Some(format!("unsupported schema version {}", other)),
            ))),
        }
    }

    fn write_version(db: &Connection, version: Version) -> Result<()> {
        db.execute_batch(&format!("PRAGMA user_version = {}", version as u32))?;
        Ok(())
    }

    fn row_to_sound(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sound> {
        let key: Option<String> = row.get(2)?;
        let blob_type: String = row.get(3)?;
        let bytes: Vec<u8> = row.get(4)?;
        Ok(Sound {
            id: SoundId(row.get(0)?),
            name: row.get(1)?,
            key: key.as_deref().map(KeyLabel::from_stored),
            blob: Blob::new(&blob_type, bytes),
            created_at: row.get(5)?,
            duration: row.get(6)?,
        })
    }
}

impl SoundStore for SqliteStore {
    fn init(&self) -> Result<()> {
        let mut db = self.db.lock();
        if db.is_some() {
            return Ok(());
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        if SqliteStore::read_version(&conn)?.is_none() {
            SqliteStore::create_schema(&conn)?;
            SqliteStore::write_version(&conn, Version::LATEST)?;
            info!(path = ?self.path, "Created sound database");
        }

        *db = Some(conn);
        debug!(path = ?self.path, "Sound store ready");
        Ok(())
    }

    fn create(&self, sound: &NewSound) -> Result<SoundId> {
        self.with_db(|db| {
            let mut stmt = db.prepare_cached(
                "INSERT INTO sounds (name, key, blob_type, blob, created_at, duration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            stmt.execute(params![
                sound.name,
                sound.key.as_ref().map(|k| k.as_str()),
                sound.blob.mime(),
                sound.blob.bytes(),
                sound.created_at,
                sound.duration,
            ])?;
            Ok(SoundId(db.last_insert_rowid()))
        })
    }

    fn update(&self, sound: &Sound) -> Result<()> {
        self.with_db(|db| {
            let mut stmt = db.prepare_cached(
                "INSERT OR REPLACE INTO sounds (id, name, key, blob_type, blob, created_at, duration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            stmt.execute(params![
                sound.id.0,
                sound.name,
                sound.key.as_ref().map(|k| k.as_str()),
                sound.blob.mime(),
                sound.blob.bytes(),
                sound.created_at,
                sound.duration,
            ])?;
            Ok(())
        })
    }

    fn delete(&self, id: SoundId) -> Result<()> {
        self.with_db(|db| {
            db.prepare_cached("DELETE FROM sounds WHERE id = ?1")?
                .execute([id.0])?;
            Ok(())
        })
    }

    fn list_all(&self) -> Result<Vec<Sound>> {
        self.with_db(|db| {
            let mut stmt = db.prepare_cached(
                "SELECT id, name, key, blob_type, blob, created_at, duration
                 FROM sounds ORDER BY id ASC",
            )?;
            let sounds = stmt
                .query_map([], SqliteStore::row_to_sound)?
                .collect::<rusqlite::Result<Vec<Sound>>>()?;
            Ok(sounds)
        })
    }
}

#[cfg(test)]
impl SqliteStore {
    /// Looks up a single record.
    pub fn get(&self, id: SoundId) -> Result<Option<Sound>> {
        use rusqlite::OptionalExtension;

        self.with_db(|db| {
            Ok(db
                .prepare_cached(
                    "SELECT id, name, key, blob_type, blob, created_at, duration
                     FROM sounds WHERE id = ?1",
                )?
                .query_row([id.0], SqliteStore::row_to_sound)
                .optional()?)
        })
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("ready", &self.db.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_sound(name: &str, key: Option<&str>) -> NewSound {
        NewSound {
            name: name.to_string(),
            key: key.map(KeyLabel::from_stored),
            blob: Blob::new("audio/wav", vec![1, 2, 3, 0, 255]),
            created_at: 1_700_000_000_000,
            duration: Some(1.5),
        }
    }

    #[test]
    fn test_not_ready_before_init() {
        let store = SqliteStore::in_memory();
        assert!(matches!(store.list_all(), Err(Error::NotReady)));
        assert!(matches!(
            store.create(&new_sound("jump", None)),
            Err(Error::NotReady)
        ));
        assert!(matches!(store.delete(SoundId(1)), Err(Error::NotReady)));
    }

    #[test]
    fn test_crud() -> Result<()> {
        let store = SqliteStore::in_memory();
        store.init()?;
        // Init is idempotent.
        store.init()?;

        let first = store.create(&new_sound("jump", Some("A")))?;
        let second = store.create(&new_sound("coin", None))?;
        assert_ne!(first, second);

        let all = store.list_all()?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first);
        assert_eq!(all[0].name, "jump");
        assert_eq!(all[0].key, Some(KeyLabel::from_stored("A")));
        assert_eq!(all[0].blob.bytes(), &[1, 2, 3, 0, 255]);
        assert_eq!(all[0].blob.mime(), "audio/wav");
        assert_eq!(all[0].duration, Some(1.5));
        assert_eq!(all[1].key, None);

        let mut updated = all[1].clone();
        updated.key = Some(KeyLabel::from_stored("Space"));
        updated.duration = None;
        store.update(&updated)?;
        assert_eq!(store.get(second)?, Some(updated));

        store.delete(first)?;
        // Deleting twice is fine.
        store.delete(first)?;
        assert_eq!(store.get(first)?, None);
        assert_eq!(store.list_all()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_update_missing_id_inserts() -> Result<()> {
        let store = SqliteStore::in_memory();
        store.init()?;

        let sound = new_sound("late", None).with_id(SoundId(42));
        store.update(&sound)?;
        assert_eq!(store.get(SoundId(42))?, Some(sound));

        // Fresh ids never collide with the explicit one.
        let next = store.create(&new_sound("next", None))?;
        assert!(next.0 > 42);
        Ok(())
    }

    #[test]
    fn test_persists_across_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("soundpad.db");

        let id = {
            let store = SqliteStore::new(&path);
            store.init()?;
            store.create(&new_sound("kept", Some("K")))?
        };

        let store = SqliteStore::new(&path);
        store.init()?;
        let all = store.list_all()?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].name, "kept");
        Ok(())
    }

    #[test]
    fn test_init_failure_is_storage_fault() {
        let store = SqliteStore::new(Path::new("/nonexistent-soundpad-dir/sub/soundpad.db"));
        assert!(matches!(store.init(), Err(Error::Storage(_))));
        assert!(matches!(store.list_all(), Err(Error::NotReady)));
    }
}
