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

//! The sampler: pads bound to the voice engine, with mute group choking.

use tracing::{debug, info};

use crate::audio::VoiceId;
use crate::observers::{Observers, Subscription};
use crate::pads::{PadConfig, PadRegistry};
use crate::samples::{LoadedSample, MuteGroups, SampleError, SampleRequest, VoiceEngine};

/// Plays pads.
///
/// Within a mute group at most one voice sounds: triggering a pad in groups 1 to 4 stops the
/// group's previous voice at the moment the new one starts. Group 0 pads never choke.
pub struct Sampler {
    engine: VoiceEngine,
    pads: PadRegistry,
    mute_groups: MuteGroups,
    trigger_observers: Observers<usize>,
}

impl Sampler {
    pub fn new(engine: VoiceEngine) -> Sampler {
        Sampler {
            engine,
            pads: PadRegistry::new(),
            mute_groups: MuteGroups::new(),
            trigger_observers: Observers::new(),
        }
    }

    pub fn engine(&self) -> &VoiceEngine {
        &self.engine
    }

    pub fn pads(&self) -> &PadRegistry {
        &self.pads
    }

    /// The pad registry, for editing.
    pub fn pads_mut(&mut self) -> &mut PadRegistry {
        &mut self.pads
    }

    pub fn pad(&self, index: usize) -> Option<&PadConfig> {
        self.pads.pad(index)
    }

    pub fn load_sample(&mut self, id: &str, url: &str) -> Result<LoadedSample, SampleError> {
        self.engine.load_sample(id, url)
    }

    pub fn load_samples(&mut self, requests: &[SampleRequest]) -> Vec<LoadedSample> {
        self.engine.load_samples(requests)
    }

    /// The current time on the output clock.
    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    /// Subscribes to pad triggers. The handler receives the pad index.
    pub fn on_trigger<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&usize) + Send + 'static,
    {
        self.trigger_observers.subscribe(handler)
    }

    /// Plays a pad at `when` on the output clock, or now. Does nothing for an unknown pad, a
    /// pad without a sample, or a sample that isn't loaded.
    pub fn trigger(&mut self, pad_index: usize, when: Option<f64>) -> Option<VoiceId> {
        let pad = self.pads.pad(pad_index)?;
        let Some(sample_id) = pad.sample_id.as_deref() else {
            debug!(pad = pad_index, "Pad has no sample");
            return None;
        };
        if !self.engine.has_sample(sample_id) {
            debug!(pad = pad_index, sample = sample_id, "Pad sample not loaded");
            return None;
        }

        let start_time = when.unwrap_or_else(|| self.engine.current_time());
        if let Some(previous) = self.mute_groups.release_group(pad.mute_group) {
            self.engine.stop_voice(previous, Some(start_time));
        }

        let voice = self.engine.play_sample(
            sample_id,
            pad_index,
            f64::from(pad.pitch),
            pad.volume,
            Some(start_time),
        )?;
        self.mute_groups.claim(pad.mute_group, voice);
        self.trigger_observers.notify(&pad_index);
        Some(voice)
    }

    /// Stops every voice of a pad.
    pub fn stop(&mut self, pad_index: usize) {
        self.engine.stop_pad(pad_index);
    }

    /// Stops every voice.
    pub fn stop_all(&mut self) {
        self.engine.stop_all();
        self.mute_groups.clear();
    }

    /// Processes ended voices, releasing any mute groups they held.
    pub fn process_ended(&mut self) -> usize {
        let ended = self.engine.process_ended();
        for id in ended.iter() {
            self.mute_groups.release(*id);
        }
        ended.len()
    }

    /// The voice holding a mute group.
    pub fn mute_group_holder(&self, group: u8) -> Option<VoiceId> {
        self.mute_groups.holder(group)
    }

    /// Stops everything and releases the output.
    pub fn dispose(mut self) {
        self.trigger_observers.clear();
        self.mute_groups.clear();
        self.engine.dispose();
        info!("Sampler disposed");
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("engine", &self.engine)
            .field("held_mute_groups", &self.mute_groups.held())
            .finish()
    }
}
