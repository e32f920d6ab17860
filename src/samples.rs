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

//! Pad-triggered sample playback.
//!
//! This module provides:
//! - Sample fetching, decoding and caching (in-memory for zero-latency playback)
//! - Per-pad voice tracking and mute group bookkeeping
//! - The voice engine that starts and stops voices on an output sink

mod engine;
mod error;
mod loader;
mod voice;

pub use engine::VoiceEngine;
pub use error::SampleError;
pub use loader::{AssetFetcher, FileFetcher, LoadedSample, MemoryFetcher, SampleLoader, SampleRequest};
pub use voice::{MuteGroups, PlayingVoice, VoiceManager};
