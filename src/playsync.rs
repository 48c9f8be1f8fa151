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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// Shared between whoever starts a playback and the device playing it. The device is
/// responsible for stopping once the handle is cancelled.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<Mutex<CancelState>>,
    condvar: Arc<Condvar>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        CancelHandle::new()
    }
}

impl CancelHandle {
    pub fn new() -> CancelHandle {
        CancelHandle {
            state: Arc::new(Mutex::new(CancelState::Untouched)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true once the playback has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.state.lock() == CancelState::Cancelled
    }

    /// Blocks until the handle is cancelled or `finished` is set.
    pub fn wait(&self, finished: Arc<AtomicBool>) {
        let mut state = self.state.lock();
        while *state == CancelState::Untouched && !finished.load(Ordering::Acquire) {
            self.condvar.wait(&mut state);
        }
    }

    /// Wakes up waiters so they can re-check whether the playback finished. The lock is taken
    /// so a waiter between its check and its wait cannot miss the wakeup.
    pub fn notify(&self) {
        let _state = self.state.lock();
        self.condvar.notify_all();
    }

    /// Cancels the playback. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if *state == CancelState::Untouched {
            *state = CancelState::Cancelled;
            self.condvar.notify_all();
        }
    }
}
