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
use std::{
    error::Error as StdError,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, Level};

use super::{Clip, Device as AudioDevice, DEFAULT_DEVICE};
use crate::error::{Error, Result};
use crate::playsync::CancelHandle;

/// A clip being mixed into the output stream.
struct Voice {
    samples: Arc<Vec<f32>>,
    channels: usize,
    /// Position in source frames. Fractional when the clip's rate differs from the stream's.
    position: f64,
    /// Source frames advanced per output frame.
    step: f64,
    finished: Arc<AtomicBool>,
    cancel_handle: CancelHandle,
}

impl Voice {
    fn new(
        clip: &Clip,
        output_rate: u32,
        finished: Arc<AtomicBool>,
        cancel_handle: CancelHandle,
    ) -> Voice {
        Voice {
            samples: clip.samples().clone(),
            channels: clip.channels() as usize,
            position: 0.0,
            step: clip.sample_rate() as f64 / output_rate.max(1) as f64,
            finished,
            cancel_handle,
        }
    }

    fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Sample of the current frame destined for the given output channel.
    fn sample_for(&self, frame: usize, output_channel: usize, output_channels: usize) -> f32 {
        let base = frame * self.channels;
        if self.channels == 1 {
            self.samples[base]
        } else if output_channels == 1 {
            let sum: f32 = self.samples[base..base + self.channels].iter().sum();
            sum / self.channels as f32
        } else if output_channel < self.channels {
            self.samples[base + output_channel]
        } else {
            0.0
        }
    }

    /// Marks the voice as done and wakes whoever is waiting on it.
    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
        self.cancel_handle.notify();
    }
}

/// Sums all active voices into the output buffer. Lives inside the stream callback.
struct Mixer {
    voice_rx: Receiver<Voice>,
    voices: Vec<Voice>,
    channels: usize,
}

impl Mixer {
    fn new(voice_rx: Receiver<Voice>, channels: u16) -> Mixer {
        Mixer {
            voice_rx,
            voices: Vec::new(),
            channels: channels.max(1) as usize,
        }
    }

    fn mix(&mut self, output: &mut [f32]) {
        while let Ok(voice) = self.voice_rx.try_recv() {
            self.voices.push(voice);
        }

        output.fill(0.0);
        let channels = self.channels;
        self.voices.retain_mut(|voice| {
            if voice.cancel_handle.is_cancelled() {
                voice.finish();
                return false;
            }

            let frames = voice.frames();
            for out_frame in output.chunks_mut(channels) {
                let frame = voice.position as usize;
                if frame >= frames {
                    break;
                }
                for (channel, sample) in out_frame.iter_mut().enumerate() {
                    *sample += voice.sample_for(frame, channel, channels);
                }
                voice.position += voice.step;
            }

            if voice.position as usize >= frames {
                voice.finish();
                return false;
            }
            true
        });

        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        // Nobody will mix these anymore, so release their waiters.
        for voice in self.voices.drain(..) {
            voice.finish();
        }
        while let Ok(voice) = self.voice_rx.try_recv() {
            voice.finish();
        }
    }
}

/// Builds a stream whose callback converts the mixer's f32 output into the device's format.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.mix(&mut scratch);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

/// The open output stream. The stream itself is owned by a dedicated thread since cpal
/// streams cannot move between threads on every platform.
struct Output {
    voice_tx: Sender<Voice>,
    sample_rate: u32,
    shutdown_tx: Option<Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    fn start(device: cpal::Device, name: &str) -> std::result::Result<Output, Box<dyn StdError>> {
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let sample_rate = config.sample_rate.0;

        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<Voice>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<(), String>>(1);

        let output_thread = {
            let name = name.to_string();
            thread::spawn(move || {
                let mixer = Mixer::new(voice_rx, config.channels);
                let stream = match sample_format {
                    cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
                    cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
                    cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
                    cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
                    other => {
                        let _ = ready_tx
                            .send(Err(format!("unsupported sample format {:?}", other)));
                        return;
                    }
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }

                info!(
                    device = name,
                    channels = config.channels,
                    sample_rate = config.sample_rate.0,
                    "Output stream started."
                );
                let _ = ready_tx.send(Ok(()));

                // Hold the stream until the output is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(format!("unable to open {}: {}", name, e).into()),
            Err(_) => return Err(format!("output thread for {} exited", name).into()),
        }

        Ok(Output {
            voice_tx,
            sample_rate,
            shutdown_tx: Some(shutdown_tx),
            output_thread: Some(output_thread),
        })
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        drop(self.shutdown_tx.take());
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

/// A small wrapper around a cpal::Device.
pub struct Device {
    name: String,
    max_channels: u16,
    host_id: cpal::HostId,
    /// Present once the device has been opened for playback. Listed devices stay closed.
    output: Option<Output>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

fn max_output_channels(device: &cpal::Device) -> u16 {
    device
        .supported_output_configs()
        .map(|configs| configs.map(|config| config.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> std::result::Result<Vec<Box<dyn AudioDevice>>, Box<dyn StdError>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|(device, _)| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal output devices along with the underlying handles.
    fn list_cpal_devices() -> std::result::Result<Vec<(Device, cpal::Device)>, Box<dyn StdError>>
    {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_channels = max_output_channels(&device);
                if max_channels == 0 {
                    continue;
                }
                let Ok(name) = device.name() else {
                    continue;
                };

                devices.push((
                    Device {
                        name,
                        max_channels,
                        host_id,
                        output: None,
                    },
                    device,
                ));
            }
        }

        devices.sort_by_key(|(device, _)| device.name.to_string());
        Ok(devices)
    }

    /// Opens the given cpal device for playback. "default" follows the system's default output.
    pub fn get(name: &str) -> std::result::Result<Device, Box<dyn StdError>> {
        let (mut device, cpal_device) = if name == DEFAULT_DEVICE {
            let _shh_stdout = shh::stdout()?;
            let _shh_stderr = shh::stderr()?;
            let host = cpal::default_host();
            let cpal_device = host
                .default_output_device()
                .ok_or("no default output device available")?;
            (
                Device {
                    name: cpal_device.name()?,
                    max_channels: max_output_channels(&cpal_device),
                    host_id: host.id(),
                    output: None,
                },
                cpal_device,
            )
        } else {
            Device::list_cpal_devices()?
                .into_iter()
                .find(|(device, _)| device.name.trim() == name)
                .ok_or_else(|| format!("no device found with name {}", name))?
        };

        device.output = Some(Output::start(cpal_device, &device.name)?);
        Ok(device)
    }
}

impl AudioDevice for Device {
    /// Mixes the clip into the output stream and waits for it to drain or be cancelled.
    fn play(&self, clip: &Clip, cancel_handle: CancelHandle) -> Result<()> {
        let span = span!(Level::INFO, "play clip (cpal)");
        let _enter = span.enter();

        let output = self
            .output
            .as_ref()
            .ok_or_else(|| Error::Playback(format!("{} is not open for playback", self.name)))?;

        info!(
            device = self.name,
            channels = clip.channels(),
            sample_rate = clip.sample_rate(),
            duration = format!("{:?}", clip.duration()),
            "Playing clip."
        );

        if cancel_handle.is_cancelled() {
            return Ok(());
        }

        let finished = Arc::new(AtomicBool::new(false));
        output
            .voice_tx
            .send(Voice::new(
                clip,
                output.sample_rate,
                finished.clone(),
                cancel_handle.clone(),
            ))
            .map_err(|_| Error::Playback(format!("output stream for {} is gone", self.name)))?;

        cancel_handle.wait(finished);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> std::result::Result<Arc<super::mock::Device>, Box<dyn StdError>> {
        Err("not a mock".into())
    }
}
