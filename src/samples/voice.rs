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

//! Voice bookkeeping for pad playback.
//!
//! Tracks which voices each pad has sounding and which voice holds each mute group.

use std::collections::HashMap;

use tracing::debug;

use crate::audio::VoiceId;

/// Represents a voice started for a pad.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayingVoice {
    /// The sink's ID for this voice.
    pub id: VoiceId,
    /// The pad that triggered it.
    pub pad_index: usize,
    /// The sample being played.
    pub sample_id: String,
    /// When it starts on the output clock.
    pub start_time: f64,
    pub playback_rate: f64,
    pub gain: f32,
}

/// Active voices, grouped by pad. A pad can have any number of overlapping voices.
#[derive(Default)]
pub struct VoiceManager {
    voices: HashMap<usize, Vec<PlayingVoice>>,
}

impl VoiceManager {
    /// Creates a new voice manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a newly started voice.
    pub fn add_voice(&mut self, voice: PlayingVoice) {
        self.voices.entry(voice.pad_index).or_default().push(voice);
    }

    /// Forgets a voice that has ended. Returns it if it was still tracked.
    pub fn remove_voice(&mut self, id: VoiceId) -> Option<PlayingVoice> {
        let pad = self
            .voices
            .iter()
            .find(|(_, voices)| voices.iter().any(|v| v.id == id))
            .map(|(pad, _)| *pad)?;

        let voices = self.voices.get_mut(&pad)?;
        let position = voices.iter().position(|v| v.id == id)?;
        let voice = voices.remove(position);
        if voices.is_empty() {
            self.voices.remove(&pad);
        }
        Some(voice)
    }

    /// Removes and returns every voice of a pad.
    pub fn take_pad(&mut self, pad_index: usize) -> Vec<PlayingVoice> {
        self.voices.remove(&pad_index).unwrap_or_default()
    }

    /// Removes and returns every voice.
    pub fn take_all(&mut self) -> Vec<PlayingVoice> {
        let mut voices: Vec<PlayingVoice> = self.voices.drain().flat_map(|(_, v)| v).collect();
        voices.sort_by_key(|v| v.id);
        voices
    }

    /// The voices of a pad, oldest first.
    pub fn pad_voices(&self, pad_index: usize) -> &[PlayingVoice] {
        self.voices
            .get(&pad_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if the pad has any voice.
    pub fn is_pad_playing(&self, pad_index: usize) -> bool {
        !self.pad_voices(pad_index).is_empty()
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.active_count())
            .field("active_pads", &self.voices.len())
            .finish()
    }
}

/// The voice holding each mute group. Group 0 is never tracked.
#[derive(Debug, Default)]
pub struct MuteGroups {
    holders: HashMap<u8, VoiceId>,
}

impl MuteGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// The voice currently holding a group.
    pub fn holder(&self, group: u8) -> Option<VoiceId> {
        self.holders.get(&group).copied()
    }

    /// Makes `voice` the holder of `group` and returns the voice it replaced.
    pub fn claim(&mut self, group: u8, voice: VoiceId) -> Option<VoiceId> {
        if group == 0 {
            return None;
        }
        let previous = self.holders.insert(group, voice);
        if let Some(previous) = previous {
            debug!(group, %previous, %voice, "Mute group cut");
        }
        previous
    }

    /// Releases whatever group `voice` holds.
    pub fn release(&mut self, voice: VoiceId) {
        self.holders.retain(|_, holder| *holder != voice);
    }

    /// Releases a group without regard to its holder.
    pub fn release_group(&mut self, group: u8) -> Option<VoiceId> {
        self.holders.remove(&group)
    }

    pub fn clear(&mut self) {
        self.holders.clear();
    }

    /// The number of groups with a holder.
    pub fn held(&self) -> usize {
        self.holders.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_voice(pad_index: usize) -> PlayingVoice {
        PlayingVoice {
            id: VoiceId::next(),
            pad_index,
            sample_id: "ark-kick".to_string(),
            start_time: 0.0,
            playback_rate: 1.0,
            gain: 1.0,
        }
    }

    #[test]
    fn test_pads_hold_many_voices() {
        let mut manager = VoiceManager::new();
        let first = make_voice(2);
        let second = make_voice(2);
        let other = make_voice(5);
        manager.add_voice(first.clone());
        manager.add_voice(second.clone());
        manager.add_voice(other.clone());

        assert_eq!(3, manager.active_count());
        assert_eq!(&[first.clone(), second.clone()], manager.pad_voices(2));

        assert_eq!(Some(first.clone()), manager.remove_voice(first.id));
        assert_eq!(None, manager.remove_voice(first.id));
        assert!(manager.is_pad_playing(2));

        assert_eq!(vec![second], manager.take_pad(2));
        assert!(!manager.is_pad_playing(2));
        assert_eq!(vec![other], manager.take_all());
        assert_eq!(0, manager.active_count());
    }

    #[test]
    fn test_mute_group_claims() {
        let mut groups = MuteGroups::new();
        let a = VoiceId::next();
        let b = VoiceId::next();

        assert_eq!(None, groups.claim(0, a));
        assert_eq!(None, groups.holder(0));

        assert_eq!(None, groups.claim(1, a));
        assert_eq!(Some(a), groups.claim(1, b));
        assert_eq!(Some(b), groups.holder(1));

        // Releasing a superseded voice leaves the current holder in place.
        groups.release(a);
        assert_eq!(Some(b), groups.holder(1));
        groups.release(b);
        assert_eq!(None, groups.holder(1));
        assert_eq!(0, groups.held());
    }
}
