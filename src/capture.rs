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

//! Turns "the next key pressed" into a key label for a pending (re)bind.

use std::mem;

use tracing::debug;

use crate::error::{Error, Result};
use crate::keys::{KeyEvent, KeyLabel};
use crate::sound::SoundId;

/// What a captured key will be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The key field of a sound that is about to be added.
    Pending,
    /// An existing sound being rebound.
    Sound(SoundId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Capturing(CaptureTarget),
}

/// The capture state machine. Only one capture may be outstanding at a time.
#[derive(Debug)]
pub struct Capture {
    state: State,
}

impl Default for Capture {
    fn default() -> Self {
        Capture { state: State::Idle }
    }
}

impl Capture {
    pub fn new() -> Capture {
        Capture::default()
    }

    /// Arms the capture. A second request while one is pending is rejected and the first
    /// target stays armed.
    pub fn begin(&mut self, target: CaptureTarget) -> Result<()> {
        match self.state {
            State::Idle => {
                debug!(target = ?target, "Capture started");
                self.state = State::Capturing(target);
                Ok(())
            }
            State::Capturing(pending) => {
                debug!(pending = ?pending, requested = ?target, "Capture already in progress");
                Err(Error::CaptureInProgress)
            }
        }
    }

    /// Returns true while the next key-down will be consumed.
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, State::Capturing(_))
    }

    /// The target of the pending capture, if any.
    pub fn pending(&self) -> Option<CaptureTarget> {
        match self.state {
            State::Idle => None,
            State::Capturing(target) => Some(target),
        }
    }

    /// Offers a key-down to the machine. While capturing, the event is consumed: the machine
    /// returns to idle and the target is handed back with the canonical label.
    pub fn intercept(&mut self, event: &KeyEvent) -> Option<(CaptureTarget, KeyLabel)> {
        match mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::Capturing(target) => {
                let label = event.label();
                debug!(target = ?target, key = %label, "Key captured");
                Some((target, label))
            }
        }
    }

    /// Abandons a pending capture without binding anything.
    pub fn cancel(&mut self) -> Option<CaptureTarget> {
        match mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::Capturing(target) => Some(target),
        }
    }
}
