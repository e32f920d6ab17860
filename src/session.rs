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

//! A playing instrument: the sequencer wired to the sampler, with share-token state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, span, warn, Level};

use crate::codec::{self, EncodedState};
use crate::library::default_pad_assignments;
use crate::playsync::CancelHandle;
use crate::sampler::Sampler;
use crate::samples::{SampleRequest, VoiceEngine};
use crate::sequencer::clock::Clock;
use crate::sequencer::Sequencer;

/// Ties a sequencer to a sampler. Every scheduled cell triggers its pad at the scheduled time.
pub struct Session {
    sequencer: Sequencer,
    sampler: Arc<Mutex<Sampler>>,
    url_param: String,
}

impl Session {
    /// Creates a session around a voice engine. The sequencer runs on the engine's clock.
    pub fn new(engine: VoiceEngine, clock: Clock, url_param: &str) -> Session {
        let time_source = engine.time_source();
        let sampler = Arc::new(Mutex::new(Sampler::new(engine)));

        let mut sequencer = Sequencer::with_clock(clock);
        sequencer.init(time_source);
        {
            let sampler = sampler.clone();
            sequencer.set_on_pad_trigger(move |pad, time| {
                sampler.lock().trigger(pad, Some(time));
            });
        }

        Session {
            sequencer,
            sampler,
            url_param: url_param.to_string(),
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    /// The shared sampler. Don't hold the lock across [Session::tick].
    pub fn sampler(&self) -> Arc<Mutex<Sampler>> {
        self.sampler.clone()
    }

    /// Loads samples, returning how many loaded.
    pub fn load_samples(&mut self, requests: &[SampleRequest]) -> usize {
        self.sampler.lock().load_samples(requests).len()
    }

    /// Restores a share token, or falls back to the default pad layout and an empty pattern.
    /// Returns true if the token was restored.
    pub fn init(&mut self, token: Option<&str>) -> bool {
        match token.and_then(codec::decode_state) {
            Some(state) => {
                self.restore(state);
                info!("Restored shared state");
                true
            }
            None => {
                if token.is_some() {
                    warn!("Ignoring invalid share token");
                }
                self.sampler
                    .lock()
                    .pads_mut()
                    .set_pads(&default_pad_assignments());
                false
            }
        }
    }

    /// Replaces the pads and the pattern.
    pub fn restore(&mut self, state: EncodedState) {
        self.sampler.lock().pads_mut().set_pads(&state.pads);
        self.sequencer.set_pattern(state.pattern);
    }

    /// The current pads and pattern.
    pub fn state(&self) -> EncodedState {
        EncodedState {
            pads: self.sampler.lock().pads().pads().clone(),
            pattern: self.sequencer.pattern().clone(),
        }
    }

    /// The current state as a share token.
    pub fn encoded_state(&self) -> String {
        codec::encode_state(&self.state())
    }

    /// A share URL for the current state.
    pub fn share_url(&self, base_url: &str) -> String {
        codec::share_url(base_url, &self.state(), &self.url_param)
    }

    pub fn play(&mut self) {
        self.sequencer.play();
    }

    /// Stops the sequencer and silences every pad.
    pub fn stop(&mut self) {
        self.sequencer.stop();
        self.sampler.lock().stop_all();
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    /// Processes ended voices and polls the clock. Returns the number of steps scheduled.
    pub fn tick(&mut self) -> usize {
        self.sampler.lock().process_ended();
        self.sequencer.tick()
    }

    /// Ticks at the clock's interval until cancelled.
    pub fn run_until(&mut self, cancel_handle: &CancelHandle) {
        let span = span!(Level::INFO, "session");
        let _enter = span.enter();

        let interval = self.sequencer.schedule_interval();
        info!(interval = format!("{:?}", interval), "Scheduling");
        while !cancel_handle.is_cancelled() {
            self.tick();
            spin_sleep::sleep(interval.min(Duration::from_secs(1)));
        }
    }

    /// Stops everything and releases the output.
    pub fn dispose(mut self) {
        self.sequencer.dispose();
        drop(self.sequencer);
        match Arc::try_unwrap(self.sampler) {
            Ok(sampler) => sampler.into_inner().dispose(),
            Err(sampler) => {
                warn!("Sampler still shared, stopping without releasing the output");
                sampler.lock().stop_all();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::audio::mock::{Device, ManualClock};
    use crate::audio::OutputSink;
    use crate::pads::PadUpdate;
    use crate::sequencer::pattern::create_default_pattern;
    use crate::test::eventually;
    use crate::testutil::fetcher_with_samples;

    fn session() -> (Session, Arc<Device>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let device = Arc::new(Device::with_time_source("mock", clock.clone()));
        let fetcher = fetcher_with_samples(&["ark-kick", "root-hh-a", "root-oh"]);
        let mut session = Session::new(
            VoiceEngine::new(device.clone(), Arc::new(fetcher)),
            Clock::new(),
            "s",
        );
        session.load_samples(&[
            SampleRequest::new("ark-kick", "/ark-kick.wav"),
            SampleRequest::new("root-hh-a", "/root-hh-a.wav"),
            SampleRequest::new("root-oh", "/root-oh.wav"),
        ]);
        (session, device, clock)
    }

    #[test]
    fn first_step_triggers_at_start_time() {
        let (mut session, device, clock) = session();
        session.init(None);
        session
            .sequencer_mut()
            .set_pattern(create_default_pattern(16, 92).with_step(0, 0, true));
        {
            let sampler = session.sampler();
            sampler.lock().pads_mut().assign_sample(0, Some("ark-kick"));
        }

        clock.set(12.5);
        session.play();
        session.tick();

        let voices = device.voices();
        assert_eq!(1, voices.len());
        assert_eq!(12.5, voices[0].start_time);
        assert!(session.sampler().lock().engine().is_pad_playing(0));
    }

    #[test]
    fn open_hat_is_choked_by_closed_hat() {
        let (mut session, device, clock) = session();
        {
            let sampler = session.sampler();
            let mut sampler = sampler.lock();
            sampler
                .pads_mut()
                .set_pad(4, PadUpdate::new().sample(Some("root-hh-a")).mute_group(1));
            sampler
                .pads_mut()
                .set_pad(6, PadUpdate::new().sample(Some("root-oh")).mute_group(1));
        }
        session.sequencer_mut().set_bpm(120);
        session.sequencer_mut().set_step(6, 0, true);
        session.sequencer_mut().set_step(4, 2, true);

        session.play();
        clock.set(0.2);
        session.tick();

        let voices = device.voices();
        assert_eq!(2, voices.len());
        assert_eq!(0.0, voices[0].start_time);
        assert_eq!(Some(0.25), voices[0].stop_time);
        assert_eq!(0.25, voices[1].start_time);
        assert_eq!(None, voices[1].stop_time);
    }

    #[test]
    fn share_token_round_trips_through_a_session() {
        let (mut original, _device, _clock) = session();
        original.init(None);
        original.sequencer_mut().set_steps(32);
        original.sequencer_mut().set_bpm(140);
        original.sequencer_mut().set_step(3, 31, true);
        original
            .sampler()
            .lock()
            .pads_mut()
            .set_pad(3, PadUpdate::new().pitch(-5).volume(0.7));
        let token = original.encoded_state();

        let (mut restored, _device, _clock) = session();
        assert!(restored.init(Some(&token)));
        assert_eq!(original.state(), restored.state());
        assert_eq!(token, restored.encoded_state());
        assert!(restored
            .share_url("https://example.com/")
            .ends_with(&format!("?s={token}")));
    }

    #[test]
    fn invalid_token_falls_back_to_defaults() {
        let (mut session, _device, _clock) = session();
        assert!(!session.init(Some("garbage!")));
        assert_eq!(default_pad_assignments(), session.state().pads);
        assert!(session.state().pattern.is_empty());
    }

    #[test]
    fn stop_silences_everything() {
        let (mut session, device, clock) = session();
        session.init(None);
        session.sequencer_mut().set_step(0, 0, true);
        session.play();
        session.tick();
        assert_eq!(1, device.voices().len());

        session.stop();
        clock.advance(0.01);
        assert!(device.voices().iter().all(|voice| voice.ended));
        assert!(!session.is_playing());
        assert_eq!(0, session.sequencer().current_step());
    }

    #[test]
    fn dispose_releases_the_output() {
        let (mut session, device, _clock) = session();
        session.init(None);
        session.play();
        session.dispose();
        assert!(device.is_closed());
    }

    #[test]
    fn run_until_ticks_until_cancelled() {
        let (mut session, device, clock) = session();
        session.init(None);
        session.sequencer_mut().set_step(0, 0, true);
        session.play();

        let cancel_handle = CancelHandle::new();
        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                session.run_until(&cancel_handle);
                session
            })
        };

        eventually(|| !device.voices().is_empty(), "Pad was never triggered");
        clock.advance(1.0);
        cancel_handle.cancel();
        let session = join.join().unwrap();
        assert!(session.is_playing());
    }
}
