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

//! The sound record and the small helpers that travel with it.

use std::{
    fmt,
    path::Path,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use crate::keys::KeyLabel;

/// MIME type used when nothing better is known about a payload.
pub const GENERIC_BLOB_TYPE: &str = "application/octet-stream";

/// Store-assigned identifier of a sound. Never chosen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SoundId(pub i64);

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Binary audio payload plus its MIME type. Cloning is cheap, the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    mime: String,
    bytes: Arc<Vec<u8>>,
}

impl Blob {
    pub fn new(mime: &str, bytes: Vec<u8>) -> Blob {
        Blob {
            mime: mime.to_string(),
            bytes: Arc::new(bytes),
        }
    }

    /// The MIME type tag.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// The raw payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A persisted sound.
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub id: SoundId,
    pub name: String,
    pub key: Option<KeyLabel>,
    pub blob: Blob,
    /// Milliseconds since the UNIX epoch at insert time.
    pub created_at: i64,
    /// Length in seconds, if it could be probed. Advisory only.
    pub duration: Option<f64>,
}

impl fmt::Display for Sound {
    /// One listing line: id, key, length and name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key.as_ref().map_or("-", |key| key.as_str());
        write!(
            f,
            "{:>4}  {:<8}  {}  {}",
            self.id,
            key,
            time_label(self.duration),
            self.name
        )
    }
}

/// A sound that has not been persisted yet and therefore has no id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSound {
    pub name: String,
    pub key: Option<KeyLabel>,
    pub blob: Blob,
    pub created_at: i64,
    pub duration: Option<f64>,
}

impl NewSound {
    /// Attaches the id handed out by the store.
    pub fn with_id(self, id: SoundId) -> Sound {
        Sound {
            id,
            name: self.name,
            key: self.key,
            blob: self.blob,
            created_at: self.created_at,
            duration: self.duration,
        }
    }
}

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds since the epoch, never smaller than a previously returned value.
pub fn now_millis() -> i64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = wall.max(last);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// Guesses the MIME type of an audio file from its extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") | Some("wave") => "audio/wav",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a") | Some("aac") | Some("mp4") => "audio/mp4",
        Some("webm") => "audio/webm",
        _ => GENERIC_BLOB_TYPE,
    }
}

/// Formats a duration as `mm:ss`, or `--:--` if it is unknown.
pub fn time_label(seconds: Option<f64>) -> String {
    match seconds {
        Some(seconds) if seconds.is_finite() && seconds >= 0.0 => {
            let minutes = (seconds / 60.0).floor() as u64;
            let seconds = (seconds % 60.0).floor() as u64;
            format!("{:02}:{:02}", minutes, seconds)
        }
        _ => "--:--".to_string(),
    }
}

/// Orders sounds newest first. Ties fall back to the id so the order is stable.
pub fn sort_by_recency(sounds: &mut [Sound]) {
    sounds.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
