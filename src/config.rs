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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use crate::audio::DEFAULT_DEVICE;
use crate::session::SessionOptions;
use crate::snapshot::ImportPolicy;

pub mod error;

pub use error::ConfigError;

const DEFAULT_DATABASE: &str = "soundpad.db";
const DEFAULT_BLOB_TYPE: &str = "audio/mpeg";

/// A YAML representation of the soundpad configuration. Every field is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Soundpad {
    /// Path to the SQLite database. ":memory:" keeps nothing between runs.
    database: Option<String>,

    /// The audio device: "default", a cpal device name, or a name starting with "mock".
    audio_device: Option<String>,

    /// What an import does when an item cannot be decoded (default: abort).
    import_policy: Option<ImportPolicy>,

    /// MIME type assumed for imported items that have none (default: audio/mpeg).
    default_blob_type: Option<String>,
}

impl Soundpad {
    /// Parse the configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Soundpad, ConfigError> {
        let soundpad = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Soundpad>()?;
        soundpad.validate()?;
        Ok(soundpad)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.as_deref().is_some_and(|db| db.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "database",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(blob_type) = &self.default_blob_type {
            if !blob_type.contains('/') {
                return Err(ConfigError::Invalid {
                    field: "default_blob_type",
                    reason: format!("{} is not a MIME type", blob_type),
                });
            }
        }
        Ok(())
    }

    /// Overrides the database, e.g. from the command line.
    pub fn with_database(mut self, database: Option<String>) -> Soundpad {
        if database.is_some() {
            self.database = database;
        }
        self
    }

    /// Overrides the audio device, e.g. from the command line.
    pub fn with_audio_device(mut self, audio_device: Option<String>) -> Soundpad {
        if audio_device.is_some() {
            self.audio_device = audio_device;
        }
        self
    }

    /// Returns the database location (default: soundpad.db).
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    /// Returns the audio device (default: the system default output).
    pub fn audio_device(&self) -> &str {
        self.audio_device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    pub fn import_policy(&self) -> ImportPolicy {
        self.import_policy.unwrap_or_default()
    }

    pub fn default_blob_type(&self) -> &str {
        self.default_blob_type
            .as_deref()
            .unwrap_or(DEFAULT_BLOB_TYPE)
    }

    /// The session options this configuration describes.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            import_policy: self.import_policy(),
            default_blob_type: self.default_blob_type().to_string(),
        }
    }
}
