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
//! A sixteen pad drum sampler with a step sequencer and shareable state.

pub mod audio;
pub mod codec;
pub mod config;
pub mod library;
pub mod observers;
pub mod pads;
pub mod playsync;
pub mod sampler;
pub mod samples;
pub mod sequencer;
pub mod session;
pub mod util;

#[cfg(test)]
mod testutil;
