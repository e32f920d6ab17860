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
use std::{fs::File, io::Cursor, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::samples::MemoryFetcher;

fn spec(channels: u16, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Interleaved 16 bit samples as an in-memory WAV file.
pub fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec(channels, sample_rate))
            .expect("unable to create wav writer");
        for sample in samples {
            writer.write_sample(*sample).expect("unable to write sample");
        }
        writer.finalize().expect("unable to finalize wav");
    }
    cursor.into_inner()
}

/// Writes interleaved 16 bit samples to a WAV file.
pub fn write_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
    let mut writer = WavWriter::new(
        File::create(path).expect("unable to create wav file"),
        spec(channels, sample_rate),
    )
    .expect("unable to create wav writer");
    for sample in samples {
        writer.write_sample(*sample).expect("unable to write sample");
    }
    writer.finalize().expect("unable to finalize wav");
}

/// A fetcher serving a short mono WAV at `/{id}.wav` for each id.
pub fn fetcher_with_samples(ids: &[&str]) -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    for id in ids {
        fetcher.insert(&format!("/{id}.wav"), wav_bytes(1, 44100, &[0, 100, 200, 300]));
    }
    fetcher
}
