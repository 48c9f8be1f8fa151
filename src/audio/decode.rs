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

//! Decoding of in-memory audio payloads (WAV, MP3, FLAC, OGG, ...) with symphonia.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::Clip;
use crate::error::{Error, Result};
use crate::sound::Blob;

/// A probed payload: the format reader positioned at the first packet, and the track to read.
struct Opened {
    format_reader: Box<dyn FormatReader>,
    track_id: u32,
}

/// Maps a MIME type to a file extension symphonia's probe understands.
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.split(';').next().unwrap_or_default().trim() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => Some("wav"),
        "audio/ogg" | "audio/vorbis" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/aac" | "audio/x-m4a" => Some("m4a"),
        "audio/webm" => Some("webm"),
        _ => None,
    }
}

fn open(blob: &Blob) -> Result<Opened> {
    let source = Cursor::new(blob.bytes().to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(blob.mime());
    if let Some(extension) = extension_for_mime(blob.mime()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| Error::Decode(format!("unrecognized {} payload: {}", blob.mime(), e)))?;

    let format_reader = probed.format;
    let track_id = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| t.id)
        .ok_or_else(|| Error::Decode("no audio track found".to_string()))?;

    Ok(Opened {
        format_reader,
        track_id,
    })
}

/// Reads the next packet. End of stream, including decoders that report it as a decode
/// error, yields None.
fn read_next_packet(format_reader: &mut dyn FormatReader) -> Result<Option<Packet>> {
    match format_reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        Err(SymphoniaError::DecodeError(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decodes every packet of the track, handing each interleaved buffer to `sink`. Returns the
/// channel count and sample rate observed.
fn decode_packets(
    opened: &mut Opened,
    mut sink: impl FnMut(&[f32], usize),
) -> Result<(u16, u32)> {
    let params = opened
        .format_reader
        .tracks()
        .iter()
        .find(|t| t.id == opened.track_id)
        .map(|t| t.codec_params.clone())
        .ok_or_else(|| Error::Decode("audio track disappeared".to_string()))?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder: Box<dyn Decoder> = get_codecs().make(&params, &decoder_opts)?;

    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut buffer: Option<SampleBuffer<f32>> = None;

    while let Some(packet) = read_next_packet(opened.format_reader.as_mut())? {
        if packet.track_id() != opened.track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            // A single corrupt packet is skipped rather than failing the whole clip.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if decoded.frames() == 0 {
            continue;
        }
        channels = spec.channels.count() as u16;
        sample_rate = spec.rate;

        let needed = decoded.capacity() * spec.channels.count();
        if buffer.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            sink(buf.samples(), channels as usize);
        }
    }

    if channels == 0 || sample_rate == 0 {
        return Err(Error::Decode("channel layout or sample rate unknown".to_string()));
    }

    Ok((channels, sample_rate))
}

/// Decodes the whole payload into a playable clip.
pub fn decode(blob: &Blob) -> Result<Clip> {
    let mut opened = open(blob)?;
    let mut samples = Vec::new();
    let (channels, sample_rate) =
        decode_packets(&mut opened, |chunk, _| samples.extend_from_slice(chunk))?;

    debug!(
        mime = blob.mime(),
        channels,
        sample_rate,
        frames = samples.len() / channels as usize,
        "Decoded clip"
    );
    Ok(Clip::new(samples, channels, sample_rate))
}

/// Determines the length of the payload in seconds. Container metadata is used when present,
/// otherwise the payload is decoded and its frames counted.
pub fn probe_duration(blob: &Blob) -> Result<f64> {
    let mut opened = open(blob)?;

    let params = opened
        .format_reader
        .tracks()
        .iter()
        .find(|t| t.id == opened.track_id)
        .map(|t| t.codec_params.clone());
    if let Some(params) = params {
        if let (Some(n_frames), Some(sample_rate)) = (params.n_frames, params.sample_rate) {
            if sample_rate > 0 {
                return Ok(n_frames as f64 / sample_rate as f64);
            }
        }
    }

    let mut samples = 0usize;
    let (channels, sample_rate) =
        decode_packets(&mut opened, |chunk, _| samples += chunk.len())?;
    let seconds = (samples / channels as usize) as f64 / sample_rate as f64;
    if !seconds.is_finite() {
        return Err(Error::Decode("duration is not finite".to_string()));
    }
    Ok(seconds)
}

#[cfg(test)]
mod test {
    use crate::testutil::wav_bytes;

    use super::*;

    #[test]
    fn test_decode_wav() {
        let blob = Blob::new("audio/wav", wav_bytes(0.5, 44100, 2));
        let clip = decode(&blob).unwrap();

        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(clip.frames(), 22050);
        assert!(clip.samples().iter().any(|s| s.abs() > 0.1));
        assert!(clip.samples().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_decode_without_useful_mime() {
        // The probe falls back to sniffing the content.
        let blob = Blob::new("application/octet-stream", wav_bytes(0.1, 22050, 1));
        let clip = decode(&blob).unwrap();
        assert_eq!(clip.channels(), 1);
        assert_eq!(clip.sample_rate(), 22050);
    }

    #[test]
    fn test_probe_duration() {
        let blob = Blob::new("audio/wav", wav_bytes(1.25, 48000, 1));
        let duration = probe_duration(&blob).unwrap();
        assert!((duration - 1.25).abs() < 0.001, "duration was {}", duration);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let blob = Blob::new("audio/mpeg", b"definitely not audio".to_vec());
        assert!(matches!(decode(&blob), Err(Error::Decode(_))));
        assert!(matches!(probe_duration(&blob), Err(Error::Decode(_))));
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_mime("audio/ogg; codecs=vorbis"), Some("ogg"));
        assert_eq!(extension_for_mime("application/octet-stream"), None);
    }
}
