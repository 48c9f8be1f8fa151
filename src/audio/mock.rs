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
#[cfg(test)]
use std::error::Error as StdError;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
};

use tracing::{info, span, Level};

use super::Clip;
use crate::error::{Error, Result};
use crate::playsync::CancelHandle;

/// Name of the mock device that refuses every clip.
pub const FAILING_DEVICE: &str = "mock-fail";

/// A mock device. Doesn't actually play anything, but holds each clip for its duration.
#[derive(Clone)]
pub struct Device {
    name: String,
    playing: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            playing: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns true if any clip is currently playing.
    #[cfg(test)]
    pub fn is_playing(&self) -> bool {
        self.playing() > 0
    }

    /// Number of clips currently playing.
    #[cfg(test)]
    pub fn playing(&self) -> usize {
        self.playing.load(Ordering::Acquire)
    }

    /// Number of clips ever started.
    #[cfg(test)]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }

    /// Number of clips that were cut short by cancellation.
    #[cfg(test)]
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl super::Device for Device {
    /// Sleeps for the clip's duration, or until cancelled.
    fn play(&self, clip: &Clip, cancel_handle: CancelHandle) -> Result<()> {
        let span = span!(Level::INFO, "play clip (mock)");
        let _enter = span.enter();

        if self.name == FAILING_DEVICE {
            return Err(Error::Playback(format!("{} refuses to play", self.name)));
        }

        info!(
            device = self.name,
            duration = format!("{:?}", clip.duration()),
            "Playing clip."
        );

        let (sleep_tx, sleep_rx) = mpsc::channel::<()>();

        self.started.fetch_add(1, Ordering::AcqRel);
        self.playing.fetch_add(1, Ordering::AcqRel);
        let finished = Arc::new(AtomicBool::new(false));
        let join_handle = {
            let cancel_handle = cancel_handle.clone();
            let finished = finished.clone();
            let duration = clip.duration();
            thread::spawn(move || {
                // Wait for a signal or until the clip runs out.
                let _ = sleep_rx.recv_timeout(duration);

                finished.store(true, Ordering::Release);
                cancel_handle.notify();
            })
        };

        cancel_handle.wait(finished.clone());
        let _ = sleep_tx.send(());
        let join_result = join_handle.join();

        if cancel_handle.is_cancelled() {
            self.cancelled.fetch_add(1, Ordering::AcqRel);
        }
        self.playing.fetch_sub(1, Ordering::AcqRel);

        if join_result.is_err() {
            return Err(Error::Playback("error while joining thread".to_string()));
        }

        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> std::result::Result<Arc<Device>, Box<dyn StdError>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
