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

//! A keyboard-driven soundboard. Sounds live in a local SQLite library, each optionally bound
//! to a key; pressing the key plays every sound bound to it.

pub mod audio;
pub mod capture;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod keys;
pub mod playback;
pub mod playsync;
pub mod session;
pub mod snapshot;
pub mod sound;
pub mod store;
#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
