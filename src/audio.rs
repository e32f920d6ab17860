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
//! Audio output: decoded buffers, the output sink abstraction and its implementations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod context;
pub mod cpal;
pub mod decode;
pub mod error;
pub mod mixer;
pub mod mock;

pub use error::{AudioError, DecodeError};

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// A clock measured in seconds. Scheduled start and stop times refer to this clock.
pub trait TimeSource: Send + Sync {
    /// The current time in seconds.
    fn current_time(&self) -> f64;
}

/// Identifies a voice started on an output sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    /// Allocates a new, globally unique voice ID.
    pub fn next() -> VoiceId {
        VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// Decoded PCM audio, interleaved.
pub struct AudioBuffer {
    samples: Vec<f32>,
    channel_count: u16,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from interleaved samples. A zero channel count is treated as mono.
    pub fn new(samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            samples,
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// The interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channel_count)
    }

    /// The length at normal speed, in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Gets a sample. Channels past the buffer's own wrap around, so mono feeds every output.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> Option<f32> {
        let channels = usize::from(self.channel_count);
        self.samples
            .get(frame * channels + channel % channels)
            .copied()
    }

    /// Memory used by the samples, in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("frames", &self.frames())
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// A request to play a buffer.
#[derive(Clone, Debug)]
pub struct VoiceRequest {
    pub buffer: Arc<AudioBuffer>,
    /// 1.0 is normal speed. Pitch follows speed.
    pub playback_rate: f64,
    /// Linear gain.
    pub gain: f32,
    /// When to start, on the sink's clock. Times in the past start immediately.
    pub start_time: f64,
}

/// Something that plays voices and reports when they end.
pub trait OutputSink: Send + Sync {
    /// The sink's clock.
    fn time_source(&self) -> Arc<dyn TimeSource>;

    /// The current time on the sink's clock.
    fn current_time(&self) -> f64 {
        self.time_source().current_time()
    }

    /// Creates a voice that plays once, starting at the requested time.
    fn start_voice(&self, request: VoiceRequest) -> VoiceId;

    /// Stops a voice at the given time, or right away with `None`. Stopping a voice that has
    /// already ended, or that the sink does not know, does nothing.
    fn stop_voice(&self, voice: VoiceId, at: Option<f64>);

    /// Drains the voices that ended since the last call, in the order they ended. A voice
    /// ends when it plays to completion or reaches its stop time.
    fn take_ended(&self) -> Vec<VoiceId>;

    /// Releases the output. Voices started afterwards are never heard.
    fn close(&self);

    /// Returns true once the sink has been closed.
    fn is_closed(&self) -> bool;
}

/// Converts a pitch offset in semitones into a playback rate.
pub fn playback_rate(semitones: f64) -> f64 {
    2f64.powf(semitones / 12.0)
}
