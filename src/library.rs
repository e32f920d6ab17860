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

//! The sample library: what can be assigned to pads and where to fetch it.

use std::fmt;

use serde::Deserialize;

use crate::pads::{PadConfig, PAD_COUNT};
use crate::samples::SampleRequest;

/// The built-in library as (id, url, name).
const BUILTIN_SAMPLES: &[(&str, &str, &str)] = &[
    ("ark-kick", "/samples/001 ark kick.wav", "Ark Kick"),
    ("bam-kick", "/samples/002 bam kick.wav", "Bam Kick"),
    ("close-kick", "/samples/003 close kick.wav", "Close Kick"),
    ("collie-kick", "/samples/004 collie kick a.wav", "Collie Kick"),
    ("shanty-sn", "/samples/100 shanty sn.wav", "Shanty Snare"),
    ("shawty-sn", "/samples/101 shawty sn.wav", "Shawty Snare"),
    ("smugl-sn", "/samples/102 smugl sn.wav", "Smugl Snare"),
    ("spring-sn", "/samples/103 spring sn.wav", "Spring Snare"),
    ("clangy-sn", "/samples/104 clangy sn.wav", "Clangy Snare"),
    ("root-hh-a", "/samples/200 root hh a.wav", "Root HH A"),
    ("root-hh-b", "/samples/201 root hh b.wav", "Root HH B"),
    ("root-oh", "/samples/202 root oh.wav", "Root Open HH"),
    ("smugl-hh", "/samples/203 smugl hh a.wav", "Smugl HH"),
    ("alban-bass", "/samples/400 alban bass.wav", "Alban Bass"),
    ("bell-bass", "/samples/401 bell bass.wav", "Bell Bass"),
    ("cs-bass-a", "/samples/402 cs bass a.wav", "CS Bass A"),
    ("cs-bass-b", "/samples/403 cs bass b.wav", "CS Bass B"),
    // Loops, all at 71 BPM.
    ("baby-g-drms-a", "/samples/800 baby g drms a 71.wav", "Baby G Drums A"),
    ("baby-g-drms-b", "/samples/801 baby g drms b 71.wav", "Baby G Drums B"),
    ("baby-g-drms-c", "/samples/802 baby g drms c 71.wav", "Baby G Drums C"),
    ("baby-g-fill-a", "/samples/803 baby g fill a 71.wav", "Baby G Fill A"),
    ("baby-g-fill-b", "/samples/804 baby g fill b 71.wav", "Baby G Fill B"),
    ("baby-g-fill-c", "/samples/805 baby g fill c 71.wav", "Baby G Fill C"),
    ("baby-g-bass-a", "/samples/806 baby g bass a 71.wav", "Baby G Bass A"),
    ("baby-g-bass-b", "/samples/807 baby g bass b 71.wav", "Baby G Bass B"),
    ("baby-g-bass-c", "/samples/808 baby g bass c 71.wav", "Baby G Bass C"),
    ("baby-g-mel-a", "/samples/809 baby g mel a 71.wav", "Baby G Melody A"),
    ("baby-g-mel-b", "/samples/810 baby g mel b 71.wav", "Baby G Melody B"),
    ("baby-g-mel-c", "/samples/811 baby g mel c 71.wav", "Baby G Melody C"),
];

/// The samples a fresh session puts on pads 0 to 15.
const DEFAULT_PAD_SAMPLES: [&str; PAD_COUNT] = [
    "ark-kick",
    "bam-kick",
    "shanty-sn",
    "shawty-sn",
    "root-hh-a",
    "root-hh-b",
    "root-oh",
    "smugl-hh",
    "alban-bass",
    "bell-bass",
    "cs-bass-a",
    "cs-bass-b",
    "baby-g-drms-a",
    "baby-g-bass-a",
    "baby-g-mel-a",
    "baby-g-fill-a",
];

/// A library entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SampleInfo {
    pub id: String,
    pub url: String,
    pub name: String,
}

/// Library groupings, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Kicks,
    Snares,
    HiHats,
    Bass,
    DrumLoops,
    Fills,
    BassLoops,
    Melody,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Kicks,
        Category::Snares,
        Category::HiHats,
        Category::Bass,
        Category::DrumLoops,
        Category::Fills,
        Category::BassLoops,
        Category::Melody,
    ];

    /// Classifies a sample by its ID. The first matching rule wins.
    pub fn of(id: &str) -> Option<Category> {
        if id.contains("kick") {
            Some(Category::Kicks)
        } else if id.contains("-sn") {
            Some(Category::Snares)
        } else if id.contains("-hh") || id.contains("-oh") {
            Some(Category::HiHats)
        } else if id == "alban-bass" || id == "bell-bass" || id.starts_with("cs-bass") {
            Some(Category::Bass)
        } else if id.contains("-drms-") {
            Some(Category::DrumLoops)
        } else if id.contains("-fill-") {
            Some(Category::Fills)
        } else if id.contains("baby-g-bass") {
            Some(Category::BassLoops)
        } else if id.contains("-mel-") {
            Some(Category::Melody)
        } else {
            None
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Kicks => "Kicks",
            Category::Snares => "Snares",
            Category::HiHats => "Hi-Hats",
            Category::Bass => "Bass",
            Category::DrumLoops => "Drum Loops",
            Category::Fills => "Fills",
            Category::BassLoops => "Bass Loops",
            Category::Melody => "Melody",
        };
        f.write_str(label)
    }
}

/// An ordered set of samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Library {
    samples: Vec<SampleInfo>,
}

impl Library {
    /// The library that ships with the instrument.
    pub fn builtin() -> Library {
        Library {
            samples: BUILTIN_SAMPLES
                .iter()
                .map(|(id, url, name)| SampleInfo {
                    id: id.to_string(),
                    url: url.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    pub fn new(samples: Vec<SampleInfo>) -> Library {
        Library { samples }
    }

    pub fn samples(&self) -> &[SampleInfo] {
        &self.samples
    }

    pub fn sample_by_id(&self, id: &str) -> Option<&SampleInfo> {
        self.samples.iter().find(|sample| sample.id == id)
    }

    /// A display name: "Empty" for no sample, the ID itself for an unknown sample.
    pub fn sample_name(&self, id: Option<&str>) -> String {
        match id {
            None => "Empty".to_string(),
            Some(id) => self
                .sample_by_id(id)
                .map_or_else(|| id.to_string(), |sample| sample.name.clone()),
        }
    }

    /// Every sample, as load requests.
    pub fn samples_for_loading(&self) -> Vec<SampleRequest> {
        self.samples
            .iter()
            .map(|sample| SampleRequest::new(&sample.id, &sample.url))
            .collect()
    }

    /// Samples grouped by category. Empty categories and unclassified samples are left out.
    pub fn samples_by_category(&self) -> Vec<(Category, Vec<&SampleInfo>)> {
        Category::ALL
            .iter()
            .map(|category| {
                let samples: Vec<&SampleInfo> = self
                    .samples
                    .iter()
                    .filter(|sample| Category::of(&sample.id) == Some(*category))
                    .collect();
                (*category, samples)
            })
            .filter(|(_, samples)| !samples.is_empty())
            .collect()
    }
}

impl Default for Library {
    fn default() -> Self {
        Library::builtin()
    }
}

/// The pad layout of a fresh session.
pub fn default_pad_assignments() -> [PadConfig; PAD_COUNT] {
    DEFAULT_PAD_SAMPLES.map(PadConfig::with_sample)
}
