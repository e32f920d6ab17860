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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::codec::EncodedState;
use crate::library::{default_pad_assignments, Library, SampleInfo};
use crate::pads::{PadRegistry, PadUpdate, PAD_COUNT};
use crate::sequencer::pattern::{Pattern, DEFAULT_BPM, DEFAULT_STEPS};
use crate::util::parse_row;

/// A pad in a kit file.
#[derive(Deserialize, Clone, Debug)]
pub struct KitPad {
    /// The pad index, 0 to 15.
    pad: usize,
    sample: Option<String>,
    pitch: Option<i32>,
    volume: Option<f32>,
    mute_group: Option<i32>,
}

/// A pattern row in a kit file, written as `x` and `.` characters.
#[derive(Deserialize, Clone, Debug)]
pub struct KitRow {
    pad: usize,
    steps: String,
}

/// A YAML representation of a kit: a sample library, pad assignments and a pattern.
#[derive(Deserialize, Clone, Debug)]
pub struct Kit {
    /// Tempo (default: 92).
    bpm: Option<u32>,

    /// Pattern length (default: 16).
    steps: Option<usize>,

    /// The sample library. The built-in library is used if this is missing.
    samples: Option<Vec<SampleInfo>>,

    /// Pad settings. Pads start from the default layout if this is missing and empty otherwise.
    pads: Option<Vec<KitPad>>,

    /// Active steps, by pad.
    #[serde(default)]
    rows: Vec<KitRow>,
}

impl Kit {
    /// Parse a kit from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Kit, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Kit>()?)
    }

    /// The kit's sample library.
    pub fn library(&self) -> Library {
        match &self.samples {
            Some(samples) => Library::new(samples.clone()),
            None => Library::builtin(),
        }
    }

    /// Builds the pads and pattern the kit describes. Values are clamped like any other edit.
    pub fn to_state(&self) -> Result<EncodedState, ConfigError> {
        let mut registry = PadRegistry::new();
        match &self.pads {
            None => registry.set_pads(&default_pad_assignments()),
            Some(pads) => {
                for pad in pads {
                    if pad.pad >= PAD_COUNT {
                        return Err(ConfigError::UnknownPad(pad.pad));
                    }
                    let mut update = PadUpdate::new().sample(pad.sample.as_deref());
                    if let Some(pitch) = pad.pitch {
                        update = update.pitch(pitch);
                    }
                    if let Some(volume) = pad.volume {
                        update = update.volume(volume);
                    }
                    if let Some(mute_group) = pad.mute_group {
                        update = update.mute_group(mute_group);
                    }
                    registry.set_pad(pad.pad, update);
                }
            }
        }

        let mut rows = vec![Vec::new(); PAD_COUNT];
        for row in self.rows.iter() {
            if row.pad >= PAD_COUNT {
                return Err(ConfigError::UnknownPad(row.pad));
            }
            rows[row.pad] = parse_row(&row.steps).ok_or_else(|| ConfigError::InvalidRow {
                pad: row.pad,
                row: row.steps.clone(),
            })?;
        }
        let pattern = Pattern::from_rows(
            self.steps.unwrap_or(DEFAULT_STEPS),
            self.bpm.unwrap_or(DEFAULT_BPM),
            &rows,
        );

        Ok(EncodedState {
            pads: registry.pads().clone(),
            pattern,
        })
    }
}
