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

//! Durable storage of sound records.

use std::{path::Path, sync::Arc};

use crate::error::Result;
use crate::sound::{NewSound, Sound, SoundId};

pub mod sqlite;

/// A durable, keyed collection of sounds. The store is the source of truth; anything held in
/// memory is a cache of it.
pub trait SoundStore: Send + Sync + 'static {
    /// One-time schema setup. Idempotent. Every other operation fails with `NotReady` until
    /// this has succeeded.
    fn init(&self) -> Result<()>;

    /// Persists a new record and returns the id assigned to it.
    fn create(&self, sound: &NewSound) -> Result<SoundId>;

    /// Overwrites the record with the same id, creating it if it is missing.
    fn update(&self, sound: &Sound) -> Result<()>;

    /// Removes the record. Removing an absent id succeeds.
    fn delete(&self, id: SoundId) -> Result<()>;

    /// Returns every record. No particular order is promised.
    fn list_all(&self) -> Result<Vec<Sound>>;
}

/// Opens the store for the given database location. `:memory:` yields a throwaway store.
pub fn open(database: &str) -> Arc<dyn SoundStore> {
    if database == sqlite::IN_MEMORY {
        return Arc::new(sqlite::SqliteStore::in_memory());
    }
    Arc::new(sqlite::SqliteStore::new(Path::new(database)))
}
