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

//! The application session: the in-memory sound collection, its key binding index, the
//! capture state, and the playback manager, kept in step with the store.
//!
//! Every mutation persists first. Only after the store accepted it is the in-memory
//! collection changed and the index rebuilt, so a storage fault leaves the session as it was.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio;
use crate::capture::{Capture, CaptureTarget};
use crate::error::{Error, Result};
use crate::keys::{KeyBindingIndex, KeyEvent, KeyLabel};
use crate::playback::{PlaybackHandle, PlaybackManager};
use crate::snapshot::{self, ImportPolicy, ImportReport};
use crate::sound::{self, now_millis, Blob, NewSound, Sound, SoundId};
use crate::store::SoundStore;

/// Name used when a sound is added without a usable name.
pub const UNTITLED: &str = "Untitled";

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub import_policy: ImportPolicy,
    pub default_blob_type: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            import_policy: ImportPolicy::default(),
            default_blob_type: "audio/mpeg".to_string(),
        }
    }
}

/// What a key-down did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The event was consumed by a pending capture.
    Captured {
        target: CaptureTarget,
        label: KeyLabel,
    },
    /// The event came from an editable control and was left alone.
    Ignored,
    /// The bound sounds were started.
    Played(Vec<SoundId>),
    /// Nothing was bound to Space, so every playback was stopped.
    StoppedAll(usize),
    /// Nothing is bound to the key.
    Unbound(KeyLabel),
}

pub struct Session {
    store: Arc<dyn SoundStore>,
    /// Cache of the store, in store iteration order.
    sounds: Vec<Sound>,
    index: KeyBindingIndex,
    capture: Capture,
    playback: PlaybackManager,
    /// Label captured for the add form, waiting to be used by the next add.
    pending_key: Option<KeyLabel>,
    options: SessionOptions,
}

impl Session {
    /// Initializes the store, loads every record, and builds the index. Nothing else may touch
    /// the store before this completes.
    pub async fn open(
        store: Arc<dyn SoundStore>,
        playback: PlaybackManager,
        options: SessionOptions,
    ) -> Result<Session> {
        let sounds = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || {
                store.init()?;
                store.list_all()
            })
            .await??
        };

        let index = KeyBindingIndex::rebuild(&sounds);
        info!(sounds = sounds.len(), keys = index.len(), "Session opened");

        Ok(Session {
            store,
            sounds,
            index,
            capture: Capture::new(),
            playback,
            pending_key: None,
            options,
        })
    }

    /// Runs a store operation off the async runtime.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SoundStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }

    fn rebuild_index(&mut self) {
        self.index = KeyBindingIndex::rebuild(&self.sounds);
        debug!(keys = self.index.len(), "Key binding index rebuilt");
    }

    fn position(&self, id: SoundId) -> Result<usize> {
        self.sounds
            .iter()
            .position(|sound| sound.id == id)
            .ok_or(Error::UnknownSound(id))
    }

    /// Persists a changed copy of an existing sound, then swaps it into the collection.
    async fn commit_update(&mut self, sound: Sound) -> Result<()> {
        let position = self.position(sound.id)?;
        let persisted = sound.clone();
        self.with_store(move |store| store.update(&persisted)).await?;

        self.sounds[position] = sound;
        self.rebuild_index();
        Ok(())
    }

    /// Adds a sound. The duration is probed from the payload and left empty if that fails.
    pub async fn add_sound(
        &mut self,
        name: &str,
        key: Option<KeyLabel>,
        blob: Blob,
    ) -> Result<SoundId> {
        let name = match name.trim() {
            "" => UNTITLED.to_string(),
            trimmed => trimmed.to_string(),
        };
        let duration = probe(&blob).await;

        let new = NewSound {
            name,
            key,
            blob,
            created_at: now_millis(),
            duration,
        };
        let request = new.clone();
        let id = self.with_store(move |store| store.create(&request)).await?;

        info!(%id, name = new.name, key = ?new.key, "Sound added");
        self.sounds.push(new.with_id(id));
        self.rebuild_index();
        Ok(id)
    }

    /// Adds a sound from an audio file. The name defaults to the file name.
    pub async fn add_file(
        &mut self,
        path: &Path,
        name: Option<&str>,
        key: Option<KeyLabel>,
    ) -> Result<SoundId> {
        let bytes = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || std::fs::read(path)).await??
        };
        let blob = Blob::new(sound::mime_for_path(path), bytes);

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().trim().to_string())
            .unwrap_or_default();
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&file_name)
            .to_string();

        self.add_sound(&name, key, blob).await
    }

    /// Renames a sound. Blank names are ignored.
    pub async fn rename(&mut self, id: SoundId, name: &str) -> Result<()> {
        let name = name.trim();
        let position = self.position(id)?;
        if name.is_empty() {
            debug!(%id, "Ignoring blank rename");
            return Ok(());
        }

        let mut sound = self.sounds[position].clone();
        sound.name = name.to_string();
        self.commit_update(sound).await?;
        info!(%id, new_name = name, "Sound renamed");
        Ok(())
    }

    /// Binds the sound to the key, or unbinds it with None.
    pub async fn bind(&mut self, id: SoundId, key: Option<KeyLabel>) -> Result<()> {
        let mut sound = self.sounds[self.position(id)?].clone();
        sound.key = key;
        let key = sound.key.clone();
        self.commit_update(sound).await?;
        info!(%id, key = ?key, "Sound bound");
        Ok(())
    }

    pub async fn unbind(&mut self, id: SoundId) -> Result<()> {
        self.bind(id, None).await
    }

    /// Swaps the audio of a sound. The previous duration is kept if the new payload cannot be
    /// probed.
    pub async fn replace_blob(&mut self, id: SoundId, blob: Blob) -> Result<()> {
        let mut sound = self.sounds[self.position(id)?].clone();
        if let Some(duration) = probe(&blob).await {
            sound.duration = Some(duration);
        }
        sound.blob = blob;
        self.commit_update(sound).await?;
        info!(%id, "Sound audio replaced");
        Ok(())
    }

    /// Replaces the audio of a sound with the contents of a file.
    pub async fn replace_file(&mut self, id: SoundId, path: &Path) -> Result<()> {
        self.position(id)?;
        let bytes = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || std::fs::read(path)).await??
        };
        self.replace_blob(id, Blob::new(sound::mime_for_path(path), bytes))
            .await
    }

    /// Deletes a sound. Deleting an unknown id succeeds.
    pub async fn delete(&mut self, id: SoundId) -> Result<()> {
        self.with_store(move |store| store.delete(id)).await?;

        let before = self.sounds.len();
        self.sounds.retain(|sound| sound.id != id);
        if self.sounds.len() != before {
            info!(%id, "Sound deleted");
        }
        self.rebuild_index();
        Ok(())
    }

    /// Arms a key capture for the add form or for an existing sound.
    pub fn begin_capture(&mut self, target: CaptureTarget) -> Result<()> {
        if let CaptureTarget::Sound(id) = target {
            self.position(id)?;
        }
        self.capture.begin(target)
    }

    pub fn cancel_capture(&mut self) -> Option<CaptureTarget> {
        self.capture.cancel()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }

    /// The label captured for the add form, if any.
    pub fn pending_key(&self) -> Option<&KeyLabel> {
        self.pending_key.as_ref()
    }

    /// Takes the label captured for the add form so it can be used for a new sound.
    pub fn take_pending_key(&mut self) -> Option<KeyLabel> {
        self.pending_key.take()
    }

    /// Handles a key-down.
    ///
    /// A pending capture consumes the event, even from an editable control. Otherwise events
    /// from editable controls are ignored, bound keys play every sound bound to them, and an
    /// unbound Space stops everything.
    pub async fn handle_key(&mut self, event: &KeyEvent, editable: bool) -> Result<KeyOutcome> {
        if let Some((target, label)) = self.capture.intercept(event) {
            match target {
                CaptureTarget::Pending => {
                    self.pending_key = Some(label.clone());
                }
                CaptureTarget::Sound(id) => {
                    if self.position(id).is_ok() {
                        self.bind(id, Some(label.clone())).await?;
                    } else {
                        warn!(%id, key = %label, "Captured key for a sound that no longer exists");
                    }
                }
            }
            return Ok(KeyOutcome::Captured { target, label });
        }

        if editable {
            return Ok(KeyOutcome::Ignored);
        }

        Ok(self.dispatch(&event.label()))
    }

    /// Plays everything bound to the label. An unbound Space stops all playback.
    pub fn dispatch(&self, label: &KeyLabel) -> KeyOutcome {
        let bound = self.index.resolve(label);
        if !bound.is_empty() {
            let played = bound
                .iter()
                .map(|sound| self.playback.play(sound).sound_id())
                .collect::<Vec<SoundId>>();
            debug!(key = %label, sounds = played.len(), "Dispatched");
            return KeyOutcome::Played(played);
        }

        if label.is_space() {
            return KeyOutcome::StoppedAll(self.playback.stop_all());
        }

        debug!(key = %label, "Nothing bound");
        KeyOutcome::Unbound(label.clone())
    }

    /// Plays a sound regardless of its binding.
    pub fn play(&self, id: SoundId) -> Result<PlaybackHandle> {
        let sound = &self.sounds[self.position(id)?];
        Ok(self.playback.play(sound))
    }

    pub fn stop_all(&self) -> usize {
        self.playback.stop_all()
    }

    pub fn playback(&self) -> &PlaybackManager {
        &self.playback
    }

    /// Sounds in store order.
    pub fn sounds(&self) -> &[Sound] {
        &self.sounds
    }

    pub fn sound(&self, id: SoundId) -> Option<&Sound> {
        self.sounds.iter().find(|sound| sound.id == id)
    }

    /// Sounds newest first, the order they are presented in.
    pub fn sounds_by_recency(&self) -> Vec<Sound> {
        let mut sounds = self.sounds.clone();
        sound::sort_by_recency(&mut sounds);
        sounds
    }

    pub fn resolve(&self, label: &KeyLabel) -> &[Sound] {
        self.index.resolve(label)
    }

    /// Serializes the whole library into a snapshot document.
    pub async fn export(&self) -> Result<String> {
        let sounds = self.sounds.clone();
        let text = tokio::task::spawn_blocking(move || snapshot::export(&sounds)).await??;
        info!(sounds = self.sounds.len(), "Library exported");
        Ok(text)
    }

    /// Imports a snapshot document. Every item becomes a new record with a fresh id. Items
    /// that fail to decode are handled according to the session's import policy.
    pub async fn import(&mut self, text: &str) -> Result<ImportReport> {
        let requests = {
            let text = text.to_string();
            let default_blob_type = self.options.default_blob_type.clone();
            tokio::task::spawn_blocking(move || snapshot::import(&text, &default_blob_type))
                .await??
        };

        let total = requests.len();
        let mut report = ImportReport::default();
        for (index, request) in requests.into_iter().enumerate() {
            let new = match request {
                Ok(new) => new,
                Err(e) => {
                    warn!(item = index, err = %e, "Unable to import item");
                    report.failed.push((index, e));
                    match self.options.import_policy {
                        ImportPolicy::Abort => {
                            report.aborted = index + 1 < total;
                            break;
                        }
                        ImportPolicy::Skip => continue,
                    }
                }
            };

            let request = new.clone();
            let id = self.with_store(move |store| store.create(&request)).await?;
            self.sounds.push(new.with_id(id));
            self.rebuild_index();
            report.created.push(id);
        }

        info!(
            created = report.created.len(),
            failed = report.failed.len(),
            aborted = report.aborted,
            "Import finished"
        );
        Ok(report)
    }
}

/// Probes the duration of a payload off the runtime. Failures are not errors.
async fn probe(blob: &Blob) -> Option<f64> {
    let blob = blob.clone();
    match tokio::task::spawn_blocking(move || audio::probe_duration(&blob)).await {
        Ok(Ok(duration)) => Some(duration),
        Ok(Err(e)) => {
            debug!(err = %e, "Unable to probe duration");
            None
        }
        Err(e) => {
            warn!(err = %e, "Duration probe task failed");
            None
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sounds", &self.sounds.len())
            .field("keys", &self.index.len())
            .field("capture", &self.capture)
            .field("playback", &self.playback)
            .finish()
    }
}
