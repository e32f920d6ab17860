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

//! The voice engine: loads samples and plays them on an output sink.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{playback_rate, OutputSink, TimeSource, VoiceId, VoiceRequest};
use crate::pads::clamp_volume;
use crate::samples::{
    AssetFetcher, LoadedSample, PlayingVoice, SampleError, SampleLoader, SampleRequest,
    VoiceManager,
};

/// Plays loaded samples for pads.
///
/// Voices are tracked per pad from the moment they start until the sink reports them ended,
/// which [VoiceEngine::process_ended] picks up.
pub struct VoiceEngine {
    sink: Arc<dyn OutputSink>,
    loader: SampleLoader,
    voices: VoiceManager,
}

impl VoiceEngine {
    /// Creates an engine that fetches samples with `fetcher` and plays them on `sink`.
    pub fn new(sink: Arc<dyn OutputSink>, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            sink,
            loader: SampleLoader::new(fetcher),
            voices: VoiceManager::new(),
        }
    }

    /// The current time on the output clock.
    pub fn current_time(&self) -> f64 {
        self.sink.current_time()
    }

    /// The output clock, for scheduling against.
    pub fn time_source(&self) -> Arc<dyn TimeSource> {
        self.sink.time_source()
    }

    /// Fetches and decodes one sample. A loaded ID is returned from the cache.
    pub fn load_sample(&mut self, id: &str, url: &str) -> Result<LoadedSample, SampleError> {
        self.loader.load(id, url)
    }

    /// Loads many samples. Returns only those that loaded, in request order.
    pub fn load_samples(&mut self, requests: &[SampleRequest]) -> Vec<LoadedSample> {
        self.loader.load_all(requests)
    }

    pub fn has_sample(&self, id: &str) -> bool {
        self.loader.contains(id)
    }

    pub fn sample(&self, id: &str) -> Option<&LoadedSample> {
        self.loader.get(id)
    }

    /// Plays a loaded sample for a pad. The pitch offset in semitones sets the playback rate
    /// and the volume is clamped to [0, 1]. Starts at `when` on the output clock, or now.
    /// Returns `None` if the sample isn't loaded.
    pub fn play_sample(
        &mut self,
        sample_id: &str,
        pad_index: usize,
        pitch: f64,
        volume: f32,
        when: Option<f64>,
    ) -> Option<VoiceId> {
        let Some(sample) = self.loader.get(sample_id) else {
            warn!(sample = sample_id, pad = pad_index, "Sample not loaded");
            return None;
        };

        let start_time = when.unwrap_or_else(|| self.sink.current_time());
        let rate = playback_rate(pitch);
        let gain = clamp_volume(volume);
        let id = self.sink.start_voice(VoiceRequest {
            buffer: sample.buffer(),
            playback_rate: rate,
            gain,
            start_time,
        });

        debug!(
            sample = sample_id,
            pad = pad_index,
            pitch,
            volume = gain,
            start_time,
            voice = %id,
            "Sample triggered"
        );
        self.voices.add_voice(PlayingVoice {
            id,
            pad_index,
            sample_id: sample_id.to_string(),
            start_time,
            playback_rate: rate,
            gain,
        });
        Some(id)
    }

    /// Stops a single voice at `at`, or now. The voice stays tracked until it ends.
    pub fn stop_voice(&mut self, id: VoiceId, at: Option<f64>) {
        self.sink.stop_voice(id, at);
    }

    /// Stops every voice of a pad.
    pub fn stop_pad(&mut self, pad_index: usize) {
        let voices = self.voices.take_pad(pad_index);
        for voice in voices.iter() {
            self.sink.stop_voice(voice.id, None);
        }
        if !voices.is_empty() {
            debug!(pad = pad_index, stopped = voices.len(), "Pad stopped");
        }
    }

    /// Stops all sample playback.
    pub fn stop_all(&mut self) {
        let voices = self.voices.take_all();
        for voice in voices.iter() {
            self.sink.stop_voice(voice.id, None);
        }
        if !voices.is_empty() {
            info!(stopped = voices.len(), "All samples stopped");
        }
    }

    /// Collects the voices the sink reports as ended and stops tracking them. Returns every
    /// ended ID, including voices that were no longer tracked.
    pub fn process_ended(&mut self) -> Vec<VoiceId> {
        let ended = self.sink.take_ended();
        for id in ended.iter() {
            self.voices.remove_voice(*id);
        }
        ended
    }

    /// Returns true if the pad has a voice playing.
    pub fn is_pad_playing(&self, pad_index: usize) -> bool {
        self.voices.is_pad_playing(pad_index)
    }

    /// The voices a pad has playing.
    pub fn pad_voices(&self, pad_index: usize) -> &[PlayingVoice] {
        self.voices.pad_voices(pad_index)
    }

    /// Returns the number of active voices.
    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }

    /// Returns the total memory used by loaded samples.
    pub fn memory_usage(&self) -> usize {
        self.loader.total_memory_usage()
    }

    /// Stops everything, releases the output and drops every loaded sample.
    pub fn dispose(mut self) {
        self.stop_all();
        self.sink.close();
        self.loader.clear();
        info!("Voice engine disposed");
    }
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("active_voices", &self.active_voice_count())
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::audio::mock::{Device, ManualClock};
    use crate::testutil::fetcher_with_samples;

    fn engine() -> (VoiceEngine, Arc<Device>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let device = Arc::new(Device::with_time_source("mock", clock.clone()));
        let fetcher = fetcher_with_samples(&["kick", "snare"]);
        let mut engine = VoiceEngine::new(device.clone(), Arc::new(fetcher));
        engine.load_sample("kick", "/kick.wav").unwrap();
        engine.load_sample("snare", "/snare.wav").unwrap();
        (engine, device, clock)
    }

    #[test]
    fn plays_with_rate_and_clamped_gain() {
        let (mut engine, device, clock) = engine();
        clock.set(1.5);

        let id = engine.play_sample("kick", 3, 12.0, 2.0, None).unwrap();
        let voice = device.voice(id).unwrap();
        assert!((voice.playback_rate - 2.0).abs() < 1e-12);
        assert_eq!(1.0, voice.gain);
        assert_eq!(1.5, voice.start_time);

        let id = engine.play_sample("snare", 3, -12.0, 0.5, Some(4.0)).unwrap();
        let voice = device.voice(id).unwrap();
        assert!((voice.playback_rate - 0.5).abs() < 1e-12);
        assert_eq!(0.5, voice.gain);
        assert_eq!(4.0, voice.start_time);

        assert_eq!(2, engine.pad_voices(3).len());
    }

    #[test]
    fn unknown_sample_plays_nothing() {
        let (mut engine, device, _clock) = engine();
        assert_eq!(None, engine.play_sample("missing", 0, 0.0, 1.0, None));
        assert!(device.voices().is_empty());
        assert_eq!(0, engine.active_voice_count());
    }

    #[test]
    fn voices_are_forgotten_when_they_end() {
        let (mut engine, device, _clock) = engine();
        let first = engine.play_sample("kick", 0, 0.0, 1.0, None).unwrap();
        let second = engine.play_sample("kick", 0, 0.0, 1.0, None).unwrap();
        assert!(engine.is_pad_playing(0));

        device.finish(first);
        assert_eq!(vec![first], engine.process_ended());
        assert!(engine.is_pad_playing(0));

        device.finish(second);
        engine.process_ended();
        assert!(!engine.is_pad_playing(0));
    }

    #[test]
    fn stop_pad_tolerates_finished_voices() {
        let (mut engine, device, _clock) = engine();
        let first = engine.play_sample("kick", 1, 0.0, 1.0, None).unwrap();
        let second = engine.play_sample("snare", 1, 0.0, 1.0, None).unwrap();
        let other = engine.play_sample("snare", 2, 0.0, 1.0, None).unwrap();

        // Finished on the device, ended event not yet processed.
        device.finish(first);
        engine.stop_pad(1);
        assert!(!engine.is_pad_playing(1));
        assert!(engine.is_pad_playing(2));
        assert_eq!(vec![first, second], engine.process_ended());
        assert!(!device.voice(other).unwrap().ended);

        engine.stop_all();
        assert_eq!(0, engine.active_voice_count());
        assert_eq!(vec![other], engine.process_ended());
    }

    #[test]
    fn dispose_closes_the_output() {
        let (mut engine, device, _clock) = engine();
        engine.play_sample("kick", 0, 0.0, 1.0, None).unwrap();
        engine.dispose();
        assert!(device.is_closed());
    }
}
