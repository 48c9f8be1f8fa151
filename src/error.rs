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

use crate::sound::SoundId;

/// Errors surfaced by the sound library. Playback errors are produced by devices and
/// decoders but are logged and swallowed by the playback manager, never returned from dispatch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Sound store is not initialized, restart the application")]
    NotReady,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid snapshot format: {0}")]
    Format(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("A key capture is already in progress")]
    CaptureInProgress,

    #[error("No sound with id {0}")]
    UnknownSound(SoundId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<base64::DecodeError> for Error {
    fn from(value: base64::DecodeError) -> Self {
        Error::Decode(value.to_string())
    }
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(value: symphonia::core::errors::Error) -> Self {
        Error::Decode(value.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Error::Task(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
