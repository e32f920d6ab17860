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
/// Errors raised while opening or running an audio output.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No output device found with name {0}")]
    DeviceNotFound(String),

    #[error("Audio host error: {0}")]
    Host(String),

    #[error("Unsupported output sample format {0}")]
    UnsupportedFormat(String),

    #[error("Output stream failed: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised while decoding encoded audio into PCM.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),

    #[error("No decodable audio track")]
    NoTrack,

    #[error("Audio stream has no {0}")]
    MissingParameter(&'static str),

    #[error("Audio stream contains no samples")]
    Empty,
}
