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

//! A lookahead step scheduler.
//!
//! The clock is polled at a coarse interval. On every poll it schedules each step whose start
//! time falls inside the lookahead window, passing the exact time to the caller so that audio
//! can be started on the output clock rather than on the polling clock.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::TimeSource;
use crate::sequencer::pattern::{step_duration, DEFAULT_BPM, DEFAULT_STEPS};

/// How far ahead of the current time steps are scheduled, in seconds.
pub const DEFAULT_LOOKAHEAD: f64 = 0.1;

/// How often the clock should be polled.
pub const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_millis(25);

/// Receives the clock's scheduling callbacks.
pub trait ClockEvents {
    /// A step has been scheduled to start at `time` on the time source's clock.
    fn on_step(&mut self, step: usize, time: f64);

    /// The current step changed.
    fn on_step_change(&mut self, step: usize);
}

/// The scheduling state machine.
pub struct Clock {
    /// The clock steps are scheduled against. Nothing is scheduled without one.
    time_source: Option<Arc<dyn TimeSource>>,
    playing: bool,
    /// The next step to schedule.
    current_step: usize,
    /// When the next step starts on the time source's clock.
    next_step_time: f64,
    bpm: u32,
    total_steps: usize,
    lookahead: f64,
    schedule_interval: Duration,
}

impl Clock {
    /// Creates a stopped clock with the default tempo, length and timing.
    pub fn new() -> Clock {
        Clock::with_timing(DEFAULT_LOOKAHEAD, DEFAULT_SCHEDULE_INTERVAL)
    }

    /// Creates a stopped clock with the given lookahead window and polling interval.
    pub fn with_timing(lookahead: f64, schedule_interval: Duration) -> Clock {
        Clock {
            time_source: None,
            playing: false,
            current_step: 0,
            next_step_time: 0.0,
            bpm: DEFAULT_BPM,
            total_steps: DEFAULT_STEPS,
            lookahead,
            schedule_interval,
        }
    }

    /// Binds the clock to a time source.
    pub fn set_time_source(&mut self, time_source: Arc<dyn TimeSource>) {
        self.time_source = Some(time_source);
    }

    /// Returns true if a time source is bound.
    pub fn has_time_source(&self) -> bool {
        self.time_source.is_some()
    }

    /// Sets the tempo. Takes effect from the next scheduled step.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = bpm.max(1);
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Sets the loop length. The current step wraps to 0 if it is now out of range.
    pub fn set_total_steps(&mut self, total_steps: usize) {
        self.total_steps = total_steps.max(1);
        if self.current_step >= self.total_steps {
            self.current_step = 0;
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// The next step to be scheduled.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// How often [Clock::tick] should be called while playing.
    pub fn schedule_interval(&self) -> Duration {
        self.schedule_interval
    }

    /// The duration of one step at the current tempo.
    pub fn step_duration(&self) -> f64 {
        step_duration(self.bpm)
    }

    /// Starts scheduling from step 0 at the current time. Does nothing if already playing or
    /// if no time source is bound, so callers must check [Clock::is_playing].
    pub fn start(&mut self) {
        if self.playing {
            return;
        }
        let Some(time_source) = &self.time_source else {
            debug!("Clock has no time source, not starting");
            return;
        };

        self.current_step = 0;
        self.next_step_time = time_source.current_time();
        self.playing = true;
        info!(
            bpm = self.bpm,
            steps = self.total_steps,
            start = self.next_step_time,
            "Clock started"
        );
    }

    /// Stops scheduling and resets to step 0. Steps already handed out are not recalled.
    pub fn stop<E: ClockEvents + ?Sized>(&mut self, events: &mut E) {
        if !self.playing {
            return;
        }

        self.playing = false;
        self.current_step = 0;
        events.on_step_change(0);
        info!("Clock stopped");
    }

    /// Schedules every step that starts before the end of the lookahead window. Returns the
    /// number of steps scheduled.
    pub fn tick<E: ClockEvents + ?Sized>(&mut self, events: &mut E) -> usize {
        if !self.playing {
            return 0;
        }
        let Some(time_source) = &self.time_source else {
            return 0;
        };

        let horizon = time_source.current_time() + self.lookahead;
        let mut scheduled = 0;
        while self.next_step_time < horizon {
            events.on_step(self.current_step, self.next_step_time);
            events.on_step_change(self.current_step);

            self.next_step_time += self.step_duration();
            self.current_step = (self.current_step + 1) % self.total_steps;
            scheduled += 1;
        }
        scheduled
    }

    /// Stops the clock and releases the time source.
    pub fn dispose<E: ClockEvents + ?Sized>(&mut self, events: &mut E) {
        self.stop(events);
        self.time_source = None;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("playing", &self.playing)
            .field("current_step", &self.current_step)
            .field("next_step_time", &self.next_step_time)
            .field("bpm", &self.bpm)
            .field("total_steps", &self.total_steps)
            .field("lookahead", &self.lookahead)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::audio::mock::ManualClock;

    #[derive(Default)]
    struct Recorded {
        steps: Vec<(usize, f64)>,
        changes: Vec<usize>,
    }

    impl ClockEvents for Recorded {
        fn on_step(&mut self, step: usize, time: f64) {
            self.steps.push((step, time));
        }

        fn on_step_change(&mut self, step: usize) {
            self.changes.push(step);
        }
    }

    fn clock_at(bpm: u32, total_steps: usize) -> (Clock, Arc<ManualClock>) {
        let time = Arc::new(ManualClock::new());
        let mut clock = Clock::new();
        clock.set_time_source(time.clone());
        clock.set_bpm(bpm);
        clock.set_total_steps(total_steps);
        (clock, time)
    }

    #[test]
    fn schedules_every_step_in_order() {
        let (mut clock, time) = clock_at(120, 4);
        let mut events = Recorded::default();

        clock.start();
        clock.tick(&mut events);
        // Poll at 25ms until 0.6s.
        for _ in 0..24 {
            time.advance(0.025);
            clock.tick(&mut events);
        }

        let steps: Vec<usize> = events.steps.iter().map(|(step, _)| *step).collect();
        assert_eq!(vec![0, 1, 2, 3, 0, 1], steps);
        for (i, (_, at)) in events.steps.iter().enumerate() {
            assert!((at - i as f64 * 0.125).abs() < 1e-9);
        }
        assert_eq!(steps, events.changes);
    }

    #[test]
    fn late_poll_catches_up() {
        let (mut clock, time) = clock_at(120, 16);
        let mut events = Recorded::default();

        clock.start();
        time.set(0.5);
        assert_eq!(5, clock.tick(&mut events));
        assert_eq!(
            vec![(0, 0.0), (1, 0.125), (2, 0.25), (3, 0.375), (4, 0.5)],
            events.steps
        );
        assert_eq!(5, clock.current_step());
    }

    #[test]
    fn first_step_is_at_start_time() {
        let (mut clock, time) = clock_at(92, 16);
        time.set(3.25);
        let mut events = Recorded::default();

        clock.start();
        clock.tick(&mut events);
        assert_eq!(vec![(0, 3.25)], events.steps);
    }

    #[test]
    fn start_without_time_source_is_ignored() {
        let mut clock = Clock::new();
        clock.start();
        assert!(!clock.is_playing());
        assert_eq!(0, clock.tick(&mut Recorded::default()));
    }

    #[test]
    fn start_twice_keeps_position() {
        let (mut clock, time) = clock_at(120, 16);
        let mut events = Recorded::default();
        clock.start();
        time.set(0.3);
        clock.tick(&mut events);
        let step = clock.current_step();

        clock.start();
        assert_eq!(step, clock.current_step());
    }

    #[test]
    fn stop_resets_and_reports_step_zero() {
        let (mut clock, time) = clock_at(120, 16);
        let mut events = Recorded::default();

        clock.stop(&mut events);
        assert!(events.changes.is_empty());

        clock.start();
        time.set(0.3);
        clock.tick(&mut events);
        events.changes.clear();

        clock.stop(&mut events);
        assert!(!clock.is_playing());
        assert_eq!(0, clock.current_step());
        assert_eq!(vec![0], events.changes);

        time.set(1.0);
        assert_eq!(0, clock.tick(&mut events));
    }

    #[test]
    fn shrinking_wraps_current_step() {
        let (mut clock, time) = clock_at(120, 16);
        let mut events = Recorded::default();
        clock.start();
        time.set(1.0);
        clock.tick(&mut events);
        assert_eq!(9, clock.current_step());

        clock.set_total_steps(8);
        assert_eq!(0, clock.current_step());
        clock.set_total_steps(4);
        assert_eq!(0, clock.current_step());
    }

    #[test]
    fn tempo_change_applies_to_following_steps() {
        let (mut clock, time) = clock_at(120, 16);
        let mut events = Recorded::default();
        clock.start();
        clock.tick(&mut events);
        assert_eq!(vec![(0, 0.0)], events.steps);

        clock.set_bpm(60);
        time.set(0.3);
        clock.tick(&mut events);
        assert_eq!(vec![(0, 0.0), (1, 0.125), (2, 0.375)], events.steps);
    }

    #[test]
    fn dispose_stops_and_unbinds() {
        let (mut clock, _time) = clock_at(120, 16);
        let mut events = Recorded::default();
        clock.start();
        clock.dispose(&mut events);
        assert!(!clock.is_playing());
        assert!(!clock.has_time_source());
        clock.start();
        assert!(!clock.is_playing());
    }
}
