// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
//! Decodes encoded audio (WAV, FLAC, MP3, OGG and anything else symphonia probes) into PCM.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::audio::{AudioBuffer, DecodeError};

/// Decodes a complete in-memory file. The extension, if known, helps the format probe.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channel_count = track
        .codec_params
        .channels
        .map(|channels| channels.count() as u16);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped rather than failing the whole file.
            Err(SymphoniaError::DecodeError(err)) => {
                debug!(err, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channel_count.get_or_insert(spec.channels.count() as u16);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let sample_rate = sample_rate.ok_or(DecodeError::MissingParameter("sample rate"))?;
    let channel_count = channel_count.ok_or(DecodeError::MissingParameter("channel layout"))?;
    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(AudioBuffer::new(samples, channel_count, sample_rate))
}

#[cfg(test)]
mod test {
    use super::decode_bytes;
    use crate::audio::DecodeError;
    use crate::testutil::wav_bytes;

    #[test]
    fn decodes_wav() {
        let samples: Vec<i16> = (0..200).map(|i| (i * 100) as i16).collect();
        let bytes = wav_bytes(2, 22050, &samples);

        let buffer = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(2, buffer.channel_count());
        assert_eq!(22050, buffer.sample_rate());
        assert_eq!(100, buffer.frames());
        let expected = 100.0 / i16::MAX as f32;
        assert!((buffer.sample(0, 1).unwrap() - expected).abs() < 1e-3);
    }

    #[test]
    fn decodes_without_hint() {
        let bytes = wav_bytes(1, 44100, &[0, 1000, 2000, 3000]);
        let buffer = decode_bytes(bytes, None).unwrap();
        assert_eq!(4, buffer.frames());
    }

    #[test]
    fn rejects_garbage() {
        let result = decode_bytes(b"definitely not audio".to_vec(), Some("wav"));
        assert!(matches!(result, Err(DecodeError::AudioError(_))));
    }
}
