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
// Core voice mixing that can be driven by both the cpal callback and tests.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::audio::{AudioBuffer, OutputSink, TimeSource, VoiceId, VoiceRequest};

/// The mixer clock: frames rendered divided by the sample rate.
pub struct FrameClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl FrameClock {
    fn new(sample_rate: u32) -> FrameClock {
        FrameClock {
            frames: AtomicU64::new(0),
            sample_rate: sample_rate.max(1),
        }
    }

    /// The number of frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Converts a time into the frame it falls on. Negative times map to frame 0.
    fn frame_at(&self, time: f64) -> u64 {
        (time * f64::from(self.sample_rate)).round().max(0.0) as u64
    }
}

impl TimeSource for FrameClock {
    fn current_time(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// A voice inside the mixer.
struct MixerVoice {
    id: VoiceId,
    buffer: Arc<AudioBuffer>,
    /// Source frames consumed per output frame.
    increment: f64,
    gain: f32,
    start_frame: u64,
    stop_frame: Option<u64>,
    /// Read position in source frames.
    position: f64,
}

impl MixerVoice {
    /// Adds this voice into an interleaved block that starts at `block_start`. Returns true
    /// once the voice has finished.
    fn render(&mut self, output: &mut [f32], num_channels: usize, block_start: u64) -> bool {
        let source_frames = self.buffer.frames();
        let block_frames = output.len() / num_channels;

        for frame in 0..block_frames {
            let absolute = block_start + frame as u64;
            if absolute < self.start_frame {
                continue;
            }
            if self.stop_frame.is_some_and(|stop| absolute >= stop) {
                return true;
            }

            let index = self.position as usize;
            if index >= source_frames {
                return true;
            }
            let fraction = (self.position - index as f64) as f32;

            for channel in 0..num_channels {
                let current = self.buffer.sample(index, channel).unwrap_or(0.0);
                let next = self.buffer.sample(index + 1, channel).unwrap_or(current);
                let value = current + (next - current) * fraction;
                output[frame * num_channels + channel] += value * self.gain;
            }
            self.position += self.increment;
        }

        let block_end = block_start + block_frames as u64;
        self.position as usize >= source_frames
            || self.stop_frame.is_some_and(|stop| block_end >= stop)
    }
}

/// Mixes scheduled voices into interleaved output blocks.
pub struct Mixer {
    voices: Mutex<Vec<MixerVoice>>,
    clock: Arc<FrameClock>,
    num_channels: u16,
    sample_rate: u32,
    ended_tx: Sender<VoiceId>,
    ended_rx: Receiver<VoiceId>,
    closed: AtomicBool,
}

impl Mixer {
    /// Creates a new mixer.
    pub fn new(num_channels: u16, sample_rate: u32) -> Mixer {
        let (ended_tx, ended_rx) = crossbeam_channel::unbounded();
        Mixer {
            voices: Mutex::new(Vec::new()),
            clock: Arc::new(FrameClock::new(sample_rate)),
            num_channels: num_channels.max(1),
            sample_rate,
            ended_tx,
            ended_rx,
            closed: AtomicBool::new(false),
        }
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of voices waiting or playing.
    pub fn active_voices(&self) -> usize {
        self.voices.lock().len()
    }

    /// Renders the next block into `output`, which is overwritten. The block length is
    /// `output.len() / num_channels` frames.
    pub fn render(&self, output: &mut [f32]) {
        output.fill(0.0);
        let num_channels = usize::from(self.num_channels);
        let block_start = self.clock.frames();

        {
            let mut voices = self.voices.lock();
            voices.retain_mut(|voice| {
                if voice.render(output, num_channels, block_start) {
                    // The receiver lives as long as the mixer.
                    let _ = self.ended_tx.send(voice.id);
                    false
                } else {
                    true
                }
            });
        }

        self.clock
            .frames
            .fetch_add((output.len() / num_channels) as u64, Ordering::AcqRel);
    }
}

impl OutputSink for Mixer {
    fn time_source(&self) -> Arc<dyn TimeSource> {
        self.clock.clone()
    }

    fn start_voice(&self, request: VoiceRequest) -> VoiceId {
        let id = VoiceId::next();
        if self.closed.load(Ordering::Acquire) {
            debug!(voice = %id, "Mixer closed, dropping voice");
            return id;
        }

        let increment = request.playback_rate * f64::from(request.buffer.sample_rate())
            / f64::from(self.sample_rate.max(1));
        self.voices.lock().push(MixerVoice {
            id,
            buffer: request.buffer,
            increment,
            gain: request.gain,
            start_frame: self.clock.frame_at(request.start_time),
            stop_frame: None,
            position: 0.0,
        });
        id
    }

    fn stop_voice(&self, voice: VoiceId, at: Option<f64>) {
        let stop_frame = match at {
            Some(time) => self.clock.frame_at(time),
            None => self.clock.frames(),
        };

        let mut voices = self.voices.lock();
        if let Some(voice) = voices.iter_mut().find(|v| v.id == voice) {
            voice.stop_frame = Some(voice.stop_frame.map_or(stop_frame, |s| s.min(stop_frame)));
        }
    }

    fn take_ended(&self) -> Vec<VoiceId> {
        self.ended_rx.try_iter().collect()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.voices.lock().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
