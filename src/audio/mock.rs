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
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

use crate::audio::{AudioBuffer, OutputSink, TimeSource, VoiceId, VoiceRequest};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    /// Jumps to the given time.
    pub fn set(&self, time: f64) {
        *self.now.lock() = time;
    }

    /// Moves the clock forward.
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl TimeSource for ManualClock {
    fn current_time(&self) -> f64 {
        *self.now.lock()
    }
}

/// Seconds since creation, from the monotonic system clock.
#[derive(Debug)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> WallClock {
        WallClock {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A voice as seen by the mock device.
#[derive(Clone, Debug)]
pub struct MockVoice {
    pub id: VoiceId,
    pub buffer: Arc<AudioBuffer>,
    pub playback_rate: f64,
    pub gain: f32,
    pub start_time: f64,
    pub stop_time: Option<f64>,
    pub ended: bool,
}

impl MockVoice {
    /// When the voice would finish if nothing stopped it.
    fn natural_end(&self) -> f64 {
        self.start_time + self.buffer.duration() / self.playback_rate.max(f64::MIN_POSITIVE)
    }
}

#[derive(Default)]
struct State {
    voices: Vec<MockVoice>,
    ended: Vec<VoiceId>,
}

impl State {
    fn end(&mut self, id: VoiceId) {
        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id && !v.ended) {
            voice.ended = true;
            self.ended.push(id);
        }
    }
}

/// A mock device. Doesn't actually play anything, but tracks voices against its clock and
/// reports them as ended when they would have finished.
pub struct Device {
    name: String,
    time_source: Arc<dyn TimeSource>,
    state: Mutex<State>,
    closed: AtomicBool,
}

impl Device {
    /// Gets the given mock device, running on the wall clock.
    pub fn get(name: &str) -> Device {
        Device::with_time_source(name, Arc::new(WallClock::new()))
    }

    /// Creates a mock device on the given clock.
    pub fn with_time_source(name: &str, time_source: Arc<dyn TimeSource>) -> Device {
        info!(device = name, "Using mock audio device");
        Device {
            name: name.to_string(),
            time_source,
            state: Mutex::new(State::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Every voice started so far, in start order.
    pub fn voices(&self) -> Vec<MockVoice> {
        self.state.lock().voices.clone()
    }

    /// Gets a single voice.
    pub fn voice(&self, id: VoiceId) -> Option<MockVoice> {
        self.state.lock().voices.iter().find(|v| v.id == id).cloned()
    }

    /// Ends a voice as though it had played to completion.
    pub fn finish(&self, id: VoiceId) {
        self.state.lock().end(id);
    }
}

impl OutputSink for Device {
    fn time_source(&self) -> Arc<dyn TimeSource> {
        self.time_source.clone()
    }

    fn start_voice(&self, request: VoiceRequest) -> VoiceId {
        let id = VoiceId::next();
        let closed = self.closed.load(Ordering::Acquire);
        self.state.lock().voices.push(MockVoice {
            id,
            buffer: request.buffer,
            playback_rate: request.playback_rate,
            gain: request.gain,
            start_time: request.start_time,
            stop_time: None,
            ended: closed,
        });
        id
    }

    fn stop_voice(&self, voice: VoiceId, at: Option<f64>) {
        let now = self.time_source.current_time();
        let mut state = self.state.lock();
        match at {
            Some(time) if time > now => {
                if let Some(voice) = state.voices.iter_mut().find(|v| v.id == voice && !v.ended) {
                    voice.stop_time = Some(voice.stop_time.map_or(time, |s| s.min(time)));
                }
            }
            _ => state.end(voice),
        }
    }

    fn take_ended(&self) -> Vec<VoiceId> {
        let now = self.time_source.current_time();
        let mut state = self.state.lock();
        let due: Vec<VoiceId> = state
            .voices
            .iter()
            .filter(|v| !v.ended)
            .filter(|v| v.stop_time.is_some_and(|stop| stop <= now) || v.natural_end() <= now)
            .map(|v| v.id)
            .collect();
        for id in due {
            state.end(id);
        }
        std::mem::take(&mut state.ended)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut state = self.state.lock();
        for voice in state.voices.iter_mut() {
            voice.ended = true;
        }
        state.ended.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
