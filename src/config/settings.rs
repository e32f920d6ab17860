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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::codec::DEFAULT_URL_PARAM;
use crate::sequencer::clock::{DEFAULT_LOOKAHEAD, DEFAULT_SCHEDULE_INTERVAL};

const DEFAULT_DEVICE: &str = "default";

/// A YAML representation of the instrument settings.
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    /// The directory sample URLs are resolved under. Relative to the settings file.
    samples_dir: String,

    /// The audio output device. Names starting with "mock" use a silent device.
    device: Option<String>,

    /// How far ahead steps are scheduled, in seconds (default: 0.1).
    lookahead: Option<f64>,

    /// How often the scheduler runs (default: 25ms).
    schedule_interval: Option<String>,

    /// The share URL query parameter (default: "s").
    url_param: Option<String>,

    /// An optional kit file to start from. Relative to the settings file.
    kit: Option<String>,

    /// The directory the settings were loaded from.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Settings {
    /// Creates settings with everything but the samples directory at its default.
    pub fn new(samples_dir: &str) -> Settings {
        Settings {
            samples_dir: samples_dir.to_string(),
            device: None,
            lookahead: None,
            schedule_interval: None,
            url_param: None,
            kit: None,
            base_path: PathBuf::new(),
        }
    }

    /// Parse settings from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Settings, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.base_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(settings)
    }

    /// The resolved samples directory.
    pub fn samples_dir(&self) -> PathBuf {
        self.base_path.join(&self.samples_dir)
    }

    /// Returns the audio device.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the lookahead window in seconds. Non-positive values fall back to the default.
    pub fn lookahead(&self) -> f64 {
        match self.lookahead {
            Some(lookahead) if lookahead > 0.0 => lookahead,
            _ => DEFAULT_LOOKAHEAD,
        }
    }

    /// Returns the scheduling interval.
    pub fn schedule_interval(&self) -> Result<Duration, ConfigError> {
        match &self.schedule_interval {
            Some(interval) => DurationString::from_string(interval.clone())
                .map(Duration::from)
                .map_err(|e| ConfigError::Duration {
                    value: interval.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(DEFAULT_SCHEDULE_INTERVAL),
        }
    }

    /// Returns the share URL query parameter.
    pub fn url_param(&self) -> &str {
        self.url_param.as_deref().unwrap_or(DEFAULT_URL_PARAM)
    }

    /// The resolved kit file, if one is set.
    pub fn kit(&self) -> Option<PathBuf> {
        self.kit.as_ref().map(|kit| self.base_path.join(kit))
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::new("samples");
        assert_eq!("default", settings.device());
        assert_eq!(0.1, settings.lookahead());
        assert_eq!(Duration::from_millis(25), settings.schedule_interval().unwrap());
        assert_eq!("s", settings.url_param());
        assert_eq!(None, settings.kit());
    }

    #[test]
    fn parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padseq.yaml");
        fs::write(
            &path,
            "samples_dir: static\n\
             device: mock-device\n\
             lookahead: 0.2\n\
             schedule_interval: 10ms\n\
             url_param: state\n\
             kit: kits/house.yaml\n",
        )
        .unwrap();

        let settings = Settings::deserialize(&path).unwrap();
        assert_eq!(dir.path().join("static"), settings.samples_dir());
        assert_eq!("mock-device", settings.device());
        assert_eq!(0.2, settings.lookahead());
        assert_eq!(Duration::from_millis(10), settings.schedule_interval().unwrap());
        assert_eq!("state", settings.url_param());
        assert_eq!(Some(dir.path().join("kits/house.yaml")), settings.kit());
    }

    #[test]
    fn rejects_bad_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padseq.yaml");
        fs::write(&path, "samples_dir: static\nschedule_interval: soon\n").unwrap();

        let settings = Settings::deserialize(&path).unwrap();
        assert!(matches!(
            settings.schedule_interval(),
            Err(ConfigError::Duration { .. })
        ));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Settings::deserialize(&dir.path().join("nope.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
