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
use std::{error::Error, fmt, sync::Arc, time::Duration};

use crate::playsync::CancelHandle;

pub mod cpal;
pub mod decode;
pub mod mock;

pub use decode::{decode, probe_duration};

/// Name of the device that follows the system's default output.
pub const DEFAULT_DEVICE: &str = "default";

/// Decoded audio ready to be played. Samples are interleaved f32 in [-1.0, 1.0].
#[derive(Clone)]
pub struct Clip {
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

impl Clip {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Clip {
        Clip {
            samples: Arc::new(samples),
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn samples(&self) -> &Arc<Vec<f32>> {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

impl fmt::Debug for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clip")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

/// An audio output.
pub trait Device: fmt::Display + Send + Sync {
    /// Plays the clip, blocking until it reaches its end or the cancel handle fires.
    fn play(&self, clip: &Clip, cancel_handle: CancelHandle) -> crate::error::Result<()>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device with the given name. Names starting with "mock" yield a silent device.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(cpal::Device::get(name)?))
}
