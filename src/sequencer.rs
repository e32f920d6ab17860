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

//! The step sequencer: a pattern driven by the lookahead clock.

pub mod clock;
pub mod pattern;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::TimeSource;
use crate::observers::{Observers, Subscription};
use crate::sequencer::clock::{Clock, ClockEvents};
use crate::sequencer::pattern::{clamp_bpm, clamp_steps, resize_pattern, Pattern};

/// Whether the sequencer is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayState::Stopped => write!(f, "stopped"),
            PlayState::Playing => write!(f, "playing"),
        }
    }
}

/// A change of the current step.
///
/// The time is always 0.0. Step notifications track the scheduler, which runs ahead of the
/// audio by up to the lookahead window, so they are not tied to an audible moment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepEvent {
    pub step: usize,
    pub time: f64,
}

/// Called for every active cell of a scheduled step with the pad index and start time.
pub type PadTrigger = Box<dyn FnMut(usize, f64) + Send>;

/// Routes clock callbacks to the pattern and the subscribers.
struct Dispatch<'a> {
    pattern: &'a Pattern,
    on_pad_trigger: &'a mut Option<PadTrigger>,
    step_observers: &'a Observers<StepEvent>,
    current_step: &'a mut usize,
}

impl ClockEvents for Dispatch<'_> {
    fn on_step(&mut self, step: usize, time: f64) {
        let Some(on_pad_trigger) = self.on_pad_trigger.as_mut() else {
            return;
        };
        for pad in self.pattern.active_pads(step) {
            on_pad_trigger(pad, time);
        }
    }

    fn on_step_change(&mut self, step: usize) {
        *self.current_step = step;
        self.step_observers.notify(&StepEvent { step, time: 0.0 });
    }
}

/// Owns the pattern and the clock that plays it.
pub struct Sequencer {
    clock: Clock,
    pattern: Pattern,
    play_state: PlayState,
    /// The last step reported to step observers.
    current_step: usize,
    on_pad_trigger: Option<PadTrigger>,
    step_observers: Observers<StepEvent>,
    play_state_observers: Observers<PlayState>,
}

impl Sequencer {
    /// Creates a stopped sequencer with the default pattern and timing.
    pub fn new() -> Sequencer {
        Sequencer::with_clock(Clock::new())
    }

    /// Creates a stopped sequencer around a configured clock.
    pub fn with_clock(clock: Clock) -> Sequencer {
        let pattern = Pattern::default();
        let mut sequencer = Sequencer {
            clock,
            pattern,
            play_state: PlayState::Stopped,
            current_step: 0,
            on_pad_trigger: None,
            step_observers: Observers::new(),
            play_state_observers: Observers::new(),
        };
        sequencer.sync_clock();
        sequencer
    }

    /// Binds the clock to a time source.
    pub fn init(&mut self, time_source: Arc<dyn TimeSource>) {
        self.clock.set_time_source(time_source);
        self.sync_clock();
    }

    /// Sets the function called for each active cell of a scheduled step.
    pub fn set_on_pad_trigger<F>(&mut self, on_pad_trigger: F)
    where
        F: FnMut(usize, f64) + Send + 'static,
    {
        self.on_pad_trigger = Some(Box::new(on_pad_trigger));
    }

    /// Subscribes to step changes.
    pub fn on_step<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&StepEvent) + Send + 'static,
    {
        self.step_observers.subscribe(handler)
    }

    /// Subscribes to play state changes.
    pub fn on_play_state_change<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&PlayState) + Send + 'static,
    {
        self.play_state_observers.subscribe(handler)
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Replaces the whole pattern, including its tempo and length.
    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
        self.sync_clock();
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    pub fn is_playing(&self) -> bool {
        self.play_state == PlayState::Playing
    }

    /// The step most recently scheduled, or 0 when stopped.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn bpm(&self) -> u32 {
        self.pattern.bpm()
    }

    pub fn steps(&self) -> usize {
        self.pattern.steps()
    }

    /// How often [Sequencer::tick] should be called.
    pub fn schedule_interval(&self) -> Duration {
        self.clock.schedule_interval()
    }

    /// Flips one cell.
    pub fn toggle_step(&mut self, pad: usize, step: usize) {
        self.pattern = self.pattern.with_step_toggled(pad, step);
    }

    /// Sets one cell.
    pub fn set_step(&mut self, pad: usize, step: usize, active: bool) {
        self.pattern = self.pattern.with_step(pad, step, active);
    }

    /// Reads one cell. Out-of-range coordinates are off.
    pub fn get_step(&self, pad: usize, step: usize) -> bool {
        self.pattern.get(pad, step)
    }

    /// Turns every cell off, keeping length and tempo.
    pub fn clear_pattern(&mut self) {
        self.pattern = self.pattern.cleared();
    }

    /// Sets the tempo, clamped to the allowed range.
    pub fn set_bpm(&mut self, bpm: i64) {
        self.pattern = self.pattern.with_bpm(clamp_bpm(bpm));
        self.clock.set_bpm(self.pattern.bpm());
        debug!(bpm = self.pattern.bpm(), "Tempo changed");
    }

    /// Sets the pattern length, clamped to the allowed range. Rows keep their prefix.
    pub fn set_steps(&mut self, steps: i64) {
        self.pattern = resize_pattern(&self.pattern, clamp_steps(steps));
        self.clock.set_total_steps(self.pattern.steps());
        debug!(steps = self.pattern.steps(), "Pattern length changed");
    }

    /// Starts playback. The clock only starts if a time source is bound.
    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }

        self.play_state = PlayState::Playing;
        self.clock.start();
        info!(bpm = self.bpm(), steps = self.steps(), "Sequencer playing");
        self.play_state_observers.notify(&self.play_state);
    }

    /// Stops playback and returns to step 0.
    pub fn stop(&mut self) {
        if !self.is_playing() {
            return;
        }

        self.play_state = PlayState::Stopped;
        let mut dispatch = Dispatch {
            pattern: &self.pattern,
            on_pad_trigger: &mut self.on_pad_trigger,
            step_observers: &self.step_observers,
            current_step: &mut self.current_step,
        };
        self.clock.stop(&mut dispatch);
        info!("Sequencer stopped");
        self.play_state_observers.notify(&self.play_state);
    }

    /// Plays if stopped, stops if playing.
    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
    }

    /// Polls the clock. Returns the number of steps scheduled.
    pub fn tick(&mut self) -> usize {
        let mut dispatch = Dispatch {
            pattern: &self.pattern,
            on_pad_trigger: &mut self.on_pad_trigger,
            step_observers: &self.step_observers,
            current_step: &mut self.current_step,
        };
        self.clock.tick(&mut dispatch)
    }

    /// Stops playback and drops every callback and subscriber.
    pub fn dispose(&mut self) {
        self.stop();
        let mut dispatch = Dispatch {
            pattern: &self.pattern,
            on_pad_trigger: &mut self.on_pad_trigger,
            step_observers: &self.step_observers,
            current_step: &mut self.current_step,
        };
        self.clock.dispose(&mut dispatch);
        self.on_pad_trigger = None;
        self.step_observers.clear();
        self.play_state_observers.clear();
    }

    fn sync_clock(&mut self) {
        self.clock.set_bpm(self.pattern.bpm());
        self.clock.set_total_steps(self.pattern.steps());
        if self.current_step >= self.pattern.steps() {
            self.current_step = 0;
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("clock", &self.clock)
            .field("play_state", &self.play_state)
            .field("steps", &self.pattern.steps())
            .field("bpm", &self.pattern.bpm())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::audio::mock::ManualClock;
    use crate::sequencer::pattern::{create_default_pattern, MAX_BPM, MAX_STEPS, MIN_STEPS};

    fn sequencer() -> (Sequencer, Arc<ManualClock>, Arc<Mutex<Vec<(usize, f64)>>>) {
        let time = Arc::new(ManualClock::new());
        let triggers = Arc::new(Mutex::new(Vec::new()));
        let mut sequencer = Sequencer::new();
        sequencer.init(time.clone());
        {
            let triggers = triggers.clone();
            sequencer.set_on_pad_trigger(move |pad, time| triggers.lock().push((pad, time)));
        }
        (sequencer, time, triggers)
    }

    #[test]
    fn triggers_active_cells_at_scheduled_time() {
        let (mut sequencer, time, triggers) = sequencer();
        sequencer.set_bpm(120);
        sequencer.set_step(0, 0, true);
        sequencer.set_step(3, 0, true);
        sequencer.set_step(1, 2, true);

        time.set(2.0);
        sequencer.play();
        time.set(2.3);
        sequencer.tick();

        assert_eq!(vec![(0, 2.0), (3, 2.0), (1, 2.25)], *triggers.lock());
        assert_eq!(3, sequencer.current_step());
    }

    #[test]
    fn step_observers_see_zero_time() {
        let (mut sequencer, time, _triggers) = sequencer();
        let steps = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let steps = steps.clone();
            sequencer.on_step(move |event| steps.lock().push(*event))
        };

        sequencer.set_bpm(120);
        sequencer.play();
        time.set(0.2);
        sequencer.tick();
        sequencer.stop();

        assert_eq!(
            vec![
                StepEvent { step: 0, time: 0.0 },
                StepEvent { step: 1, time: 0.0 },
                StepEvent { step: 2, time: 0.0 },
                StepEvent { step: 0, time: 0.0 },
            ],
            *steps.lock()
        );
        assert_eq!(0, sequencer.current_step());
    }

    #[test]
    fn play_state_changes_are_published_once() {
        let (mut sequencer, _time, _triggers) = sequencer();
        let states = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let states = states.clone();
            sequencer.on_play_state_change(move |state| states.lock().push(*state))
        };

        sequencer.play();
        sequencer.play();
        sequencer.toggle();
        sequencer.stop();
        assert_eq!(vec![PlayState::Playing, PlayState::Stopped], *states.lock());

        subscription.unsubscribe();
        sequencer.play();
        assert_eq!(2, states.lock().len());
        assert_eq!("playing", sequencer.play_state().to_string());
    }

    #[test]
    fn tempo_and_length_are_clamped() {
        let (mut sequencer, _time, _triggers) = sequencer();
        sequencer.set_bpm(1000);
        assert_eq!(MAX_BPM, sequencer.bpm());
        sequencer.set_steps(0);
        assert_eq!(MIN_STEPS, sequencer.steps());
        sequencer.set_steps(500);
        assert_eq!(MAX_STEPS, sequencer.steps());
    }

    #[test]
    fn resizing_keeps_cells_and_wraps_the_clock() {
        let (mut sequencer, time, triggers) = sequencer();
        sequencer.set_bpm(120);
        sequencer.set_step(4, 1, true);
        sequencer.play();
        time.set(1.0);
        sequencer.tick();
        triggers.lock().clear();

        sequencer.set_steps(4);
        assert!(sequencer.get_step(4, 1));
        assert_eq!(4, sequencer.pattern().row(4).unwrap().len());

        time.set(1.3);
        sequencer.tick();
        assert_eq!(vec![(4, 1.25)], *triggers.lock());
    }

    #[test]
    fn set_pattern_replaces_tempo_and_length() {
        let (mut sequencer, _time, _triggers) = sequencer();
        sequencer.set_pattern(create_default_pattern(8, 140).with_step(2, 2, true));
        assert_eq!(8, sequencer.steps());
        assert_eq!(140, sequencer.bpm());
        assert!(sequencer.get_step(2, 2));

        sequencer.toggle_step(2, 2);
        assert!(!sequencer.get_step(2, 2));
        sequencer.set_step(2, 3, true);
        sequencer.clear_pattern();
        assert!(sequencer.pattern().is_empty());
        assert_eq!(8, sequencer.steps());
    }

    #[test]
    fn playing_without_time_source_schedules_nothing() {
        let mut sequencer = Sequencer::new();
        sequencer.play();
        assert!(sequencer.is_playing());
        assert_eq!(0, sequencer.tick());
    }

    #[test]
    fn dispose_drops_callbacks() {
        let (mut sequencer, time, triggers) = sequencer();
        sequencer.set_step(0, 0, true);
        sequencer.play();
        sequencer.dispose();
        assert!(!sequencer.is_playing());

        sequencer.play();
        time.set(1.0);
        assert_eq!(0, sequencer.tick());
        assert!(triggers.lock().is_empty());
    }
}
