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

//! Sample fetching, decoding and caching.
//!
//! Samples are decoded entirely into memory before they are played.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::audio::decode::decode_bytes;
use crate::audio::AudioBuffer;
use crate::samples::SampleError;

/// Retrieves the encoded bytes behind a sample URL.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>>;
}

/// Resolves URLs as paths under a root directory. A leading slash or a `file://` scheme is
/// relative to the root.
#[derive(Clone, Debug)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> FileFetcher {
        FileFetcher { root: root.into() }
    }

    /// The file a URL resolves to.
    pub fn resolve(&self, url: &str) -> PathBuf {
        let path = url.strip_prefix("file://").unwrap_or(url);
        self.root.join(path.trim_start_matches('/'))
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(url))
    }
}

/// Serves assets from memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFetcher {
    assets: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> MemoryFetcher {
        MemoryFetcher::default()
    }

    /// Adds an asset.
    pub fn insert(&mut self, url: &str, bytes: Vec<u8>) {
        self.assets.insert(url.to_string(), bytes);
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>> {
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no asset at {url}")))
    }
}

/// A sample to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleRequest {
    pub id: String,
    pub url: String,
}

impl SampleRequest {
    pub fn new(id: &str, url: &str) -> SampleRequest {
        SampleRequest {
            id: id.to_string(),
            url: url.to_string(),
        }
    }
}

/// A loaded sample that can be played back.
/// The audio is stored in an Arc for sharing between voices.
#[derive(Clone, Debug)]
pub struct LoadedSample {
    id: String,
    name: String,
    buffer: Arc<AudioBuffer>,
}

impl LoadedSample {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The display name. Samples are named after their ID when loaded.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The decoded audio.
    pub fn buffer(&self) -> Arc<AudioBuffer> {
        self.buffer.clone()
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.buffer.memory_size()
    }
}

/// Manages loading and caching of sample data.
pub struct SampleLoader {
    fetcher: Arc<dyn AssetFetcher>,
    /// Cache of loaded samples by ID.
    cache: HashMap<String, LoadedSample>,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            cache: HashMap::new(),
        }
    }

    /// Loads a sample, returning the cached copy if the ID is already loaded.
    pub fn load(&mut self, id: &str, url: &str) -> Result<LoadedSample, SampleError> {
        if let Some(sample) = self.cache.get(id) {
            debug!(id, "Using cached sample");
            return Ok(sample.clone());
        }

        let sample = fetch_and_decode(self.fetcher.as_ref(), id, url)?;
        self.cache.insert(id.to_string(), sample.clone());
        Ok(sample)
    }

    /// Loads many samples in parallel. Every request settles independently: failures are
    /// logged and left out, successes are returned in request order.
    pub fn load_all(&mut self, requests: &[SampleRequest]) -> Vec<LoadedSample> {
        let fetcher = self.fetcher.as_ref();
        let cache = &self.cache;
        let results: Vec<Result<LoadedSample, SampleError>> = requests
            .par_iter()
            .map(|request| match cache.get(&request.id) {
                Some(sample) => Ok(sample.clone()),
                None => fetch_and_decode(fetcher, &request.id, &request.url),
            })
            .collect();

        let mut loaded = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(sample) => {
                    self.cache
                        .entry(sample.id.clone())
                        .or_insert_with(|| sample.clone());
                    loaded.push(sample);
                }
                Err(e) => warn!(err = %e, "Sample failed to load"),
            }
        }

        info!(
            requested = requests.len(),
            loaded = loaded.len(),
            memory_mb = self.total_memory_usage() as f64 / 1024.0 / 1024.0,
            "Loaded samples"
        );
        loaded
    }

    /// Returns true if the ID is loaded.
    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    /// Gets a loaded sample.
    pub fn get(&self, id: &str) -> Option<&LoadedSample> {
        self.cache.get(id)
    }

    /// Clears the sample cache.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Returns the total memory usage of cached samples in bytes.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.values().map(|s| s.memory_size()).sum()
    }
}

fn fetch_and_decode(
    fetcher: &dyn AssetFetcher,
    id: &str,
    url: &str,
) -> Result<LoadedSample, SampleError> {
    info!(id, url, "Loading sample into memory");
    let bytes = fetcher.fetch(url).map_err(|source| SampleError::Fetch {
        url: url.to_string(),
        source,
    })?;
    let buffer = decode_bytes(bytes, extension(url)).map_err(|source| SampleError::Decode {
        id: id.to_string(),
        source,
    })?;

    debug!(
        id,
        frames = buffer.frames(),
        channels = buffer.channel_count(),
        sample_rate = buffer.sample_rate(),
        "Decoded sample"
    );
    Ok(LoadedSample {
        id: id.to_string(),
        name: id.to_string(),
        buffer: Arc::new(buffer),
    })
}

/// The file extension of a URL, ignoring any query or fragment.
fn extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path).extension().and_then(|ext| ext.to_str())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::testutil::{wav_bytes, write_wav};

    fn fetcher_with(urls: &[&str]) -> MemoryFetcher {
        let mut fetcher = MemoryFetcher::new();
        for url in urls {
            fetcher.insert(url, wav_bytes(1, 44100, &[0, 100, 200, 300]));
        }
        fetcher
    }

    #[test]
    fn caches_by_id() {
        let mut loader = SampleLoader::new(Arc::new(fetcher_with(&["/a.wav"])));
        let first = loader.load("a", "/a.wav").unwrap();
        // The URL is not consulted for a cached ID.
        let second = loader.load("a", "/missing.wav").unwrap();
        assert!(Arc::ptr_eq(&first.buffer(), &second.buffer()));
        assert_eq!("a", first.id());
        assert_eq!("a", first.name());
        assert!(loader.contains("a"));
        assert_eq!(16, loader.total_memory_usage());

        loader.clear();
        assert!(!loader.contains("a"));
    }

    #[test]
    fn reports_fetch_and_decode_failures() {
        let mut fetcher = fetcher_with(&[]);
        fetcher.insert("/bad.wav", b"not audio".to_vec());
        let mut loader = SampleLoader::new(Arc::new(fetcher));

        assert!(matches!(
            loader.load("missing", "/missing.wav"),
            Err(SampleError::Fetch { .. })
        ));
        assert!(matches!(
            loader.load("bad", "/bad.wav"),
            Err(SampleError::Decode { .. })
        ));
        assert!(!loader.contains("bad"));
    }

    #[test]
    fn batch_keeps_successes_in_order() {
        let mut loader = SampleLoader::new(Arc::new(fetcher_with(&["/one.wav", "/three.wav"])));
        let loaded = loader.load_all(&[
            SampleRequest::new("one", "/one.wav"),
            SampleRequest::new("two", "/two.wav"),
            SampleRequest::new("three", "/three.wav"),
        ]);

        let ids: Vec<&str> = loaded.iter().map(LoadedSample::id).collect();
        assert_eq!(vec!["one", "three"], ids);
        assert!(loader.contains("three"));
        assert!(!loader.contains("two"));
    }

    #[test]
    fn file_fetcher_resolves_under_root() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("001 ark kick.wav"), 1, 44100, &[0, 1, 2]);

        let fetcher = FileFetcher::new(dir.path());
        assert_eq!(
            dir.path().join("samples/x.wav"),
            fetcher.resolve("/samples/x.wav")
        );
        assert_eq!(dir.path().join("x.wav"), fetcher.resolve("file:///x.wav"));

        let mut loader = SampleLoader::new(Arc::new(fetcher));
        let sample = loader.load("ark-kick", "/001 ark kick.wav").unwrap();
        assert_eq!(3, sample.buffer().frames());
    }

    #[test]
    fn extension_ignores_query() {
        assert_eq!(Some("wav"), extension("/samples/a.wav?v=2"));
        assert_eq!(Some("flac"), extension("b.flac#x"));
        assert_eq!(None, extension("/samples/c"));
    }
}
