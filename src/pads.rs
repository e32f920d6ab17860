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

//! The pad registry: sixteen pads, each with a sample assignment and playback settings.

use tracing::debug;

/// The number of pads on the instrument.
pub const PAD_COUNT: usize = 16;

/// The number of mute groups. Group 0 means "no group" and is not counted.
pub const MUTE_GROUP_COUNT: u8 = 4;

/// The lowest pitch offset in semitones.
pub const MIN_PITCH: i32 = -12;

/// The highest pitch offset in semitones.
pub const MAX_PITCH: i32 = 12;

/// Clamps a pitch offset to [MIN_PITCH, MAX_PITCH].
pub fn clamp_pitch(pitch: i32) -> i32 {
    pitch.clamp(MIN_PITCH, MAX_PITCH)
}

/// Clamps a volume to [0, 1]. NaN is treated as silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Clamps a mute group to [0, MUTE_GROUP_COUNT].
pub fn clamp_mute_group(group: i32) -> u8 {
    // The clamp keeps the value inside u8 range.
    group.clamp(0, i32::from(MUTE_GROUP_COUNT)) as u8
}

/// The configuration of a single pad.
#[derive(Clone, Debug, PartialEq)]
pub struct PadConfig {
    /// The assigned sample, if any.
    pub sample_id: Option<String>,
    /// Pitch offset in semitones.
    pub pitch: i32,
    /// Linear volume.
    pub volume: f32,
    /// Mute group, 0 for none.
    pub mute_group: u8,
}

impl PadConfig {
    /// Creates a pad with the given sample and default settings.
    pub fn with_sample(sample_id: &str) -> PadConfig {
        PadConfig {
            sample_id: Some(sample_id.to_string()),
            ..Default::default()
        }
    }

    /// Returns the configuration with every numeric field clamped to its range.
    pub fn clamped(self) -> PadConfig {
        PadConfig {
            sample_id: self.sample_id,
            pitch: clamp_pitch(self.pitch),
            volume: clamp_volume(self.volume),
            mute_group: clamp_mute_group(i32::from(self.mute_group)),
        }
    }

    /// Returns true if the pad holds nothing but defaults.
    pub fn is_default(&self) -> bool {
        *self == PadConfig::default()
    }
}

impl Default for PadConfig {
    fn default() -> Self {
        PadConfig {
            sample_id: None,
            pitch: 0,
            volume: 1.0,
            mute_group: 0,
        }
    }
}

/// A partial pad update. Fields left as `None` are not touched.
#[derive(Clone, Debug, Default)]
pub struct PadUpdate {
    sample_id: Option<Option<String>>,
    pitch: Option<i32>,
    volume: Option<f32>,
    mute_group: Option<i32>,
}

impl PadUpdate {
    pub fn new() -> PadUpdate {
        PadUpdate::default()
    }

    /// Assigns a sample, or clears the assignment with `None`.
    pub fn sample(mut self, sample_id: Option<&str>) -> PadUpdate {
        self.sample_id = Some(sample_id.map(str::to_string));
        self
    }

    pub fn pitch(mut self, pitch: i32) -> PadUpdate {
        self.pitch = Some(pitch);
        self
    }

    pub fn volume(mut self, volume: f32) -> PadUpdate {
        self.volume = Some(volume);
        self
    }

    pub fn mute_group(mut self, mute_group: i32) -> PadUpdate {
        self.mute_group = Some(mute_group);
        self
    }
}

/// Holds the configuration of all pads.
///
/// Every mutation clamps its input, so the registry never holds an out-of-range value.
/// Out-of-range pad indices are ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PadRegistry {
    pads: [PadConfig; PAD_COUNT],
}

impl PadRegistry {
    /// Creates a registry with every pad at its defaults.
    pub fn new() -> PadRegistry {
        PadRegistry::default()
    }

    /// All pads in index order.
    pub fn pads(&self) -> &[PadConfig; PAD_COUNT] {
        &self.pads
    }

    /// Gets a single pad.
    pub fn pad(&self, index: usize) -> Option<&PadConfig> {
        self.pads.get(index)
    }

    /// The number of pads.
    pub fn pad_count(&self) -> usize {
        PAD_COUNT
    }

    /// Applies a partial update to one pad.
    pub fn set_pad(&mut self, index: usize, update: PadUpdate) {
        let Some(pad) = self.pads.get_mut(index) else {
            debug!(index, "Ignoring update for unknown pad");
            return;
        };

        if let Some(sample_id) = update.sample_id {
            pad.sample_id = sample_id;
        }
        if let Some(pitch) = update.pitch {
            pad.pitch = clamp_pitch(pitch);
        }
        if let Some(volume) = update.volume {
            pad.volume = clamp_volume(volume);
        }
        if let Some(mute_group) = update.mute_group {
            pad.mute_group = clamp_mute_group(mute_group);
        }
    }

    /// Replaces pads from the front of the registry. Extra entries are ignored and
    /// missing entries keep their current configuration.
    pub fn set_pads(&mut self, pads: &[PadConfig]) {
        for (slot, pad) in self.pads.iter_mut().zip(pads) {
            *slot = pad.clone().clamped();
        }
    }

    pub fn assign_sample(&mut self, index: usize, sample_id: Option<&str>) {
        self.set_pad(index, PadUpdate::new().sample(sample_id));
    }

    pub fn set_pitch(&mut self, index: usize, pitch: i32) {
        self.set_pad(index, PadUpdate::new().pitch(pitch));
    }

    pub fn set_volume(&mut self, index: usize, volume: f32) {
        self.set_pad(index, PadUpdate::new().volume(volume));
    }

    pub fn set_mute_group(&mut self, index: usize, mute_group: i32) {
        self.set_pad(index, PadUpdate::new().mute_group(mute_group));
    }

    /// Resets every pad to its defaults.
    pub fn reset(&mut self) {
        self.pads = Default::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamps_numeric_fields() {
        let mut registry = PadRegistry::new();
        registry.set_pad(
            3,
            PadUpdate::new()
                .pitch(40)
                .volume(1.7)
                .mute_group(9)
                .sample(Some("ark-kick")),
        );

        let pad = registry.pad(3).unwrap();
        assert_eq!(Some("ark-kick"), pad.sample_id.as_deref());
        assert_eq!(MAX_PITCH, pad.pitch);
        assert_eq!(1.0, pad.volume);
        assert_eq!(MUTE_GROUP_COUNT, pad.mute_group);

        registry.set_pitch(3, -99);
        registry.set_volume(3, -0.5);
        registry.set_mute_group(3, -1);
        let pad = registry.pad(3).unwrap();
        assert_eq!(MIN_PITCH, pad.pitch);
        assert_eq!(0.0, pad.volume);
        assert_eq!(0, pad.mute_group);
    }

    #[test]
    fn nan_volume_is_silent() {
        assert_eq!(0.0, clamp_volume(f32::NAN));
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut registry = PadRegistry::new();
        registry.set_pad(0, PadUpdate::new().sample(Some("bam-kick")).pitch(5));
        registry.set_volume(0, 0.25);

        assert_eq!(
            &PadConfig {
                sample_id: Some("bam-kick".to_string()),
                pitch: 5,
                volume: 0.25,
                mute_group: 0,
            },
            registry.pad(0).unwrap()
        );

        registry.assign_sample(0, None);
        assert_eq!(None, registry.pad(0).unwrap().sample_id);
        assert_eq!(5, registry.pad(0).unwrap().pitch);
    }

    #[test]
    fn unknown_pad_is_ignored() {
        let mut registry = PadRegistry::new();
        registry.set_pitch(PAD_COUNT, 3);
        assert_eq!(PadRegistry::new(), registry);
        assert!(registry.pad(PAD_COUNT).is_none());
    }

    #[test]
    fn set_pads_replaces_prefix() {
        let mut registry = PadRegistry::new();
        registry.set_pitch(5, 2);
        registry.set_pads(&[
            PadConfig::with_sample("ark-kick"),
            PadConfig {
                pitch: 100,
                ..Default::default()
            },
        ]);

        assert_eq!(Some("ark-kick"), registry.pad(0).unwrap().sample_id.as_deref());
        assert_eq!(MAX_PITCH, registry.pad(1).unwrap().pitch);
        assert_eq!(2, registry.pad(5).unwrap().pitch);

        registry.reset();
        assert!(registry.pads().iter().all(PadConfig::is_default));
    }
}
