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

//! Tracking of currently sounding clips so they can be stopped together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use crate::audio::{self, Device};
use crate::playsync::CancelHandle;
use crate::sound::{Sound, SoundId};

/// Global playback ID counter.
static NEXT_PLAYBACK_ID: AtomicU64 = AtomicU64::new(1);

/// A single playing instance of a sound.
#[derive(Clone)]
pub struct PlaybackHandle {
    id: u64,
    sound_id: SoundId,
    cancel_handle: CancelHandle,
    finished: Arc<AtomicBool>,
}

impl PlaybackHandle {
    fn new(sound_id: SoundId) -> PlaybackHandle {
        PlaybackHandle {
            id: NEXT_PLAYBACK_ID.fetch_add(1, Ordering::SeqCst),
            sound_id,
            cancel_handle: CancelHandle::new(),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sound_id(&self) -> SoundId {
        self.sound_id
    }

    /// True once the playback ended, failed, or was stopped.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Stops this playback. Stopping a finished playback does nothing.
    pub fn stop(&self) {
        self.cancel_handle.cancel();
    }
}

type Registry = Arc<Mutex<HashMap<u64, PlaybackHandle>>>;

/// Removes its playback from the registry when the playback thread ends, however it ends.
struct Registration {
    id: u64,
    active: Registry,
    finished: Arc<AtomicBool>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Release);
        if self.active.lock().remove(&self.id).is_some() {
            debug!(playback = self.id, "Playback deregistered");
        }
    }
}

/// Spawns playbacks on an audio device and keeps the set of live ones.
pub struct PlaybackManager {
    device: Arc<dyn Device>,
    active: Registry,
}

impl PlaybackManager {
    pub fn new(device: Arc<dyn Device>) -> PlaybackManager {
        PlaybackManager {
            device,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts playing the sound in the background and returns its handle right away. Decoding
    /// and device failures are logged and otherwise ignored.
    pub fn play(&self, sound: &Sound) -> PlaybackHandle {
        let handle = PlaybackHandle::new(sound.id);
        self.active.lock().insert(handle.id, handle.clone());

        let registration = Registration {
            id: handle.id,
            active: self.active.clone(),
            finished: handle.finished.clone(),
        };
        let device = self.device.clone();
        let blob = sound.blob.clone();
        let name = sound.name.clone();
        let sound_id = sound.id;
        let cancel_handle = handle.cancel_handle.clone();

        let spawned = thread::Builder::new()
            .name(format!("playback-{}", handle.id))
            .spawn(move || {
                let _registration = registration;
                let span = span!(Level::INFO, "playback", sound = %sound_id);
                let _enter = span.enter();

                if cancel_handle.is_cancelled() {
                    return;
                }

                let clip = match audio::decode(&blob) {
                    Ok(clip) => clip,
                    Err(e) => {
                        warn!(
                            sound_name = name,
                            err = %e,
                            "Unable to decode sound, skipping playback"
                        );
                        return;
                    }
                };

                if let Err(e) = device.play(&clip, cancel_handle) {
                    warn!(
                        sound_name = name,
                        device = %device,
                        err = %e,
                        "Playback failed"
                    );
                }
            });

        // A failed spawn drops the closure, and with it the registration.
        if let Err(e) = spawned {
            warn!(err = %e, "Unable to start playback thread");
        }

        handle
    }

    /// Stops every live playback and forgets them. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<PlaybackHandle> = {
            let mut active = self.active.lock();
            active.drain().map(|(_, handle)| handle).collect()
        };

        let stopped = drained.len();
        for handle in drained {
            handle.stop();
        }

        if stopped > 0 {
            info!(stopped, "All playback stopped");
        }
        stopped
    }

    /// Number of playbacks currently registered.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

impl std::fmt::Debug for PlaybackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackManager")
            .field("device", &self.device.to_string())
            .field("active", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::mock;
    use crate::sound::{Blob, NewSound};
    use crate::testutil::{eventually, wav_bytes};

    fn sound(id: i64, seconds: f32) -> Sound {
        NewSound {
            name: format!("sound {}", id),
            key: None,
            blob: Blob::new("audio/wav", wav_bytes(seconds, 8000, 1)),
            created_at: id,
            duration: None,
        }
        .with_id(SoundId(id))
    }

    fn manager(name: &str) -> (PlaybackManager, Arc<mock::Device>) {
        let device = audio::get_device(name).unwrap();
        let mock = device.to_mock().unwrap();
        (PlaybackManager::new(device), mock)
    }

    #[test]
    fn test_play_and_stop_all() {
        let (manager, device) = manager("mock-device");

        let handle = manager.play(&sound(1, 30.0));
        assert_eq!(handle.sound_id(), SoundId(1));
        assert_eq!(manager.active_count(), 1);
        eventually(|| device.is_playing(), "Device never started playing");

        assert_eq!(manager.stop_all(), 1);
        assert_eq!(manager.active_count(), 0);
        eventually(|| !device.is_playing(), "Device never stopped");
        eventually(|| handle.is_finished(), "Handle never finished");
        assert_eq!(device.cancelled(), 1);

        // Nothing left to stop.
        assert_eq!(manager.stop_all(), 0);
    }

    #[test]
    fn test_fan_out_is_independent() {
        let (manager, device) = manager("mock-device");

        let handles: Vec<PlaybackHandle> =
            (1..=3).map(|id| manager.play(&sound(id, 30.0))).collect();
        eventually(|| device.playing() == 3, "Not every sound started");

        handles[1].stop();
        eventually(|| device.playing() == 2, "Stopping one affected the others");
        eventually(|| manager.active_count() == 2, "Stopped playback not deregistered");

        assert_eq!(manager.stop_all(), 2);
        eventually(|| !device.is_playing(), "Device never stopped");
    }

    #[test]
    fn test_natural_end_deregisters() {
        let (manager, device) = manager("mock-device");

        let handle = manager.play(&sound(1, 0.05));
        eventually(|| manager.active_count() == 0, "Playback never deregistered");
        assert!(handle.is_finished());
        assert_eq!(device.started(), 1);
        assert_eq!(device.cancelled(), 0);
    }

    #[test]
    fn test_undecodable_sound_is_swallowed() {
        let (manager, device) = manager("mock-device");
        let mut broken = sound(1, 0.1);
        broken.blob = Blob::new("audio/mpeg", b"not audio at all".to_vec());

        let handle = manager.play(&broken);
        eventually(|| handle.is_finished(), "Broken playback never finished");
        assert_eq!(manager.active_count(), 0);
        assert_eq!(device.started(), 0);
    }

    #[test]
    fn test_device_failure_is_swallowed() {
        let (manager, _) = manager(mock::FAILING_DEVICE);

        let handle = manager.play(&sound(1, 0.1));
        eventually(|| handle.is_finished(), "Failed playback never finished");
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.stop_all(), 0);
    }
}
