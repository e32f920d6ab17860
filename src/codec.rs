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

//! Shareable state tokens.
//!
//! The pads and pattern are written as compact JSON, with short keys and default pad fields
//! left out, then base64url encoded without padding:
//!
//! ```text
//! {"p":[{"s":"ark-kick","p":-3,"v":0.5,"m":1},{},...],"q":{"t":16,"b":92,"g":"8000..."}}
//! ```
//!
//! The grid string is hex. Cells are read pad by pad, step by step, four cells per digit with
//! the first cell in the high bit.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, warn};

use crate::pads::{PadConfig, MAX_PITCH, MIN_PITCH, MUTE_GROUP_COUNT, PAD_COUNT};
use crate::sequencer::pattern::{clamp_bpm, clamp_steps, Pattern};

/// The query parameter share URLs carry the token in.
pub const DEFAULT_URL_PARAM: &str = "s";

/// Errors from decoding a token.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Token is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Token is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Token does not hold a valid state: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything a share token holds.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedState {
    pub pads: [PadConfig; PAD_COUNT],
    pub pattern: Pattern,
}

/// Reads any JSON number as an integer, saturating at the i64 bounds. Fractions are cut.
fn saturate(number: serde_json::Number) -> i64 {
    match (number.as_i64(), number.as_u64()) {
        (Some(value), _) => value,
        (None, Some(_)) => i64::MAX,
        // Float casts saturate and NaN becomes 0.
        (None, None) => number.as_f64().map_or(0, |value| value as i64),
    }
}

fn saturating_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Number::deserialize(deserializer).map(saturate)
}

fn saturating_int_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<serde_json::Number>::deserialize(deserializer).map(|number| number.map(saturate))
}

#[derive(Serialize, Deserialize, Default)]
struct CompactPad {
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "saturating_int_opt"
    )]
    p: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    v: Option<f32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "saturating_int_opt"
    )]
    m: Option<i64>,
}

#[derive(Serialize, Deserialize)]
struct CompactPattern {
    #[serde(deserialize_with = "saturating_int")]
    t: i64,
    #[serde(deserialize_with = "saturating_int")]
    b: i64,
    g: String,
}

#[derive(Serialize, Deserialize)]
struct CompactState {
    p: Vec<CompactPad>,
    q: CompactPattern,
}

impl From<&PadConfig> for CompactPad {
    fn from(pad: &PadConfig) -> Self {
        let defaults = PadConfig::default();
        CompactPad {
            s: pad.sample_id.clone(),
            p: (pad.pitch != defaults.pitch).then_some(i64::from(pad.pitch)),
            v: (pad.volume != defaults.volume).then(|| (pad.volume * 100.0).round() / 100.0),
            m: (pad.mute_group != defaults.mute_group).then_some(i64::from(pad.mute_group)),
        }
    }
}

impl From<CompactPad> for PadConfig {
    fn from(pad: CompactPad) -> Self {
        let defaults = PadConfig::default();
        // Both clamps keep the values inside the target integer ranges.
        let pitch = pad
            .p
            .map_or(defaults.pitch, |p| p.clamp(i64::from(MIN_PITCH), i64::from(MAX_PITCH)) as i32);
        let mute_group = pad
            .m
            .map_or(defaults.mute_group, |m| m.clamp(0, i64::from(MUTE_GROUP_COUNT)) as u8);
        PadConfig {
            sample_id: pad.s,
            pitch,
            volume: pad.v.unwrap_or(defaults.volume),
            mute_group,
        }
        .clamped()
    }
}

/// Encodes the state as a token. Returns an empty string if serialization fails.
pub fn encode_state(state: &EncodedState) -> String {
    let compact = CompactState {
        p: state.pads.iter().map(CompactPad::from).collect(),
        q: CompactPattern {
            t: state.pattern.steps() as i64,
            b: i64::from(state.pattern.bpm()),
            g: encode_grid(&state.pattern),
        },
    };

    match serde_json::to_string(&compact) {
        Ok(json) => STANDARD
            .encode(json)
            .replace('+', "-")
            .replace('/', "_")
            .trim_end_matches('=')
            .to_string(),
        Err(e) => {
            error!(err = %e, "Failed to encode state");
            String::new()
        }
    }
}

/// Decodes a token, or returns `None` for anything malformed.
pub fn decode_state(token: &str) -> Option<EncodedState> {
    match try_decode_state(token) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(err = %e, "Failed to decode state");
            None
        }
    }
}

/// Decodes a token. Pads past the sixteenth are dropped and missing pads take defaults.
/// Out-of-range values are clamped.
pub fn try_decode_state(token: &str) -> Result<EncodedState, CodecError> {
    let mut base64 = token.replace('-', "+").replace('_', "/");
    while base64.len() % 4 != 0 {
        base64.push('=');
    }

    let json = String::from_utf8(STANDARD.decode(base64)?)?;
    let compact: CompactState = serde_json::from_str(&json)?;

    let mut pads = compact.p.into_iter().map(PadConfig::from);
    let pads: [PadConfig; PAD_COUNT] =
        std::array::from_fn(|_| pads.next().unwrap_or_default());
    let steps = clamp_steps(compact.q.t);
    let rows = decode_grid(&compact.q.g, steps);
    let pattern = Pattern::from_rows(steps, clamp_bpm(compact.q.b), &rows);

    Ok(EncodedState { pads, pattern })
}

fn encode_grid(pattern: &Pattern) -> String {
    let bits: Vec<bool> = pattern.rows().iter().flatten().copied().collect();
    bits.chunks(4)
        .map(|nibble| {
            let value = nibble
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .fold(0u32, |value, (i, _)| value | 1 << (3 - i));
            char::from_digit(value, 16).unwrap_or('0')
        })
        .collect()
}

/// Unpacks the grid for the given length. Missing cells are off, and so are the cells of a
/// character that isn't a hex digit.
fn decode_grid(hex: &str, steps: usize) -> Vec<Vec<bool>> {
    let mut bits = hex.chars().flat_map(|c| {
        let value = c.to_digit(16).unwrap_or(0);
        (0..4).rev().map(move |bit| value & (1 << bit) != 0)
    });

    (0..PAD_COUNT)
        .map(|_| (0..steps).map(|_| bits.next().unwrap_or(false)).collect())
        .collect()
}

/// Sets the token parameter on a URL, replacing any existing value and keeping the rest of
/// the query and the fragment.
pub fn share_url(base_url: &str, state: &EncodedState, param: &str) -> String {
    let token = encode_state(state);
    let (without_fragment, fragment) = match base_url.split_once('#') {
        Some((url, fragment)) => (url, Some(fragment)),
        None => (base_url, None),
    };
    let (path, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    let mut pairs: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(param))
        .map(str::to_string)
        .collect();
    pairs.push(format!("{param}={token}"));

    let mut url = format!("{path}?{}", pairs.join("&"));
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    url
}

/// Reads the state from a URL's token parameter. Returns `None` if the parameter is missing,
/// empty or malformed.
pub fn parse_share_url(url: &str, param: &str) -> Option<EncodedState> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let (_, query) = without_fragment.split_once('?')?;
    let token = query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == param).then_some(value)
    })?;

    if token.is_empty() {
        return None;
    }
    decode_state(token)
}
