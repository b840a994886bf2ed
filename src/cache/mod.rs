//! Decoded image cache keyed by location string.
//!
//! Entries are revalidated on access (HTTP cache headers for URLs, file
//! modification time for paths) and evicted least-recently-accessed first
//! once the decoded byte total exceeds the capacity.
//!
//! The lock is not held during network or file I/O. Two threads refreshing
//! the same location may both revalidate or refetch it; the last insert wins
//! and the size accounting stays exact.

pub mod entry;
pub mod headers;
pub mod http;
pub mod image;

pub use self::entry::{EntrySource, FileSource, Freshness, FreshnessContext, ImageEntry, WebSource};
pub use self::http::{HttpClient, HttpResponse, ReqwestClient, Validators};
pub use self::image::Image;

use crate::clock::{Clock, SystemClock};
use crate::settings::Settings;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default capacity: 8 MiB of decoded pixels.
pub const DEFAULT_CAPACITY: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("http status {status} for {url}")]
    Http { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode image {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: ::image::ImageError,
    },
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, ImageEntry>,
    total_size: usize,
    next_seq: u64,
}

impl CacheState {
    fn touch(&mut self, location: &str, now: f64) -> Option<Image> {
        let seq = self.next_seq;
        let entry = self.entries.get_mut(location)?;
        entry.last_accessed = now;
        entry.access_seq = seq;
        self.next_seq += 1;
        Some(entry.image.clone())
    }

    fn remove(&mut self, location: &str) -> Option<ImageEntry> {
        let entry = self.entries.remove(location)?;
        self.total_size -= entry.size;
        Some(entry)
    }

    fn insert(&mut self, location: &str, mut entry: ImageEntry) {
        entry.access_seq = self.next_seq;
        self.next_seq += 1;
        self.remove(location);
        self.total_size += entry.size;
        self.entries.insert(location.to_string(), entry);
    }

    /// Evict least recently accessed entries other than `keep` until the
    /// total fits in `capacity`.
    fn evict(&mut self, keep: &str, capacity: usize) {
        while self.total_size > capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(location, _)| location.as_str() != keep)
                .min_by(|(_, a), (_, b)| {
                    a.last_accessed
                        .total_cmp(&b.last_accessed)
                        .then(a.access_seq.cmp(&b.access_seq))
                })
                .map(|(location, _)| location.clone());
            let Some(victim) = victim else {
                break;
            };
            if let Some(entry) = self.remove(&victim) {
                tracing::debug!(location = %victim, size = entry.size, "evicted image");
            }
        }
    }
}

pub struct ImageCache {
    state: Mutex<CacheState>,
    capacity: usize,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    placeholder: Image,
}

impl ImageCache {
    pub fn new(capacity: usize, http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity,
            http,
            clock,
            placeholder: Image::placeholder(),
        }
    }

    /// Cache using `reqwest` and the system clock, sized from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, CacheError> {
        let http = ReqwestClient::from_settings(settings)?;
        Ok(Self::new(
            settings.image_cache_capacity,
            Arc::new(http),
            Arc::new(SystemClock),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the decoded image at `location`, loading or refreshing it when
    /// the cached copy is missing or stale.
    pub fn get_image(&self, location: &str) -> Result<Image, CacheError> {
        let now = self.clock.now();
        let cached = self
            .lock()
            .entries
            .get(location)
            .map(|e| (e.image.clone(), e.source.clone()));

        if let Some((checked_image, mut source)) = cached {
            let ctx = FreshnessContext {
                now,
                http: self.http.as_ref(),
            };
            let fresh = source.is_fresh(&ctx);
            let mut state = self.lock();
            let unchanged = state
                .entries
                .get(location)
                .map(|entry| entry.image.ptr_eq(&checked_image));
            match unchanged {
                Some(true) => {
                    if let Some(entry) = state.entries.get_mut(location) {
                        entry.source = source;
                    }
                    if fresh {
                        if let Some(image) = state.touch(location, now) {
                            return Ok(image);
                        }
                    }
                    tracing::debug!(location, "cached image is stale");
                    state.remove(location);
                }
                // Reloaded by another caller while we were checking; that
                // copy is newer than anything this check could tell us.
                Some(false) => {
                    if let Some(image) = state.touch(location, now) {
                        return Ok(image);
                    }
                }
                None => {}
            }
        }

        let entry = ImageEntry::load(location, self.http.as_ref(), now)?;
        let image = entry.image.clone();
        let mut state = self.lock();
        state.insert(location, entry);
        state.evict(location, self.capacity);
        tracing::debug!(
            location,
            bytes = image.byte_size(),
            total = state.total_size,
            "cached image"
        );
        Ok(image)
    }

    /// Like [`ImageCache::get_image`], but a failure yields the placeholder
    /// image instead of an error.
    pub fn get_image_or_placeholder(&self, location: &str) -> Image {
        match self.get_image(location) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(location, "image unavailable: {err}");
                self.placeholder.clone()
            }
        }
    }

    pub fn placeholder(&self) -> &Image {
        &self.placeholder
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_size(&self) -> usize {
        self.lock().total_size
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, location: &str) -> bool {
        self.lock().entries.contains_key(location)
    }

    pub fn last_accessed(&self, location: &str) -> Option<f64> {
        self.lock().entries.get(location).map(|e| e.last_accessed)
    }

    /// Snapshot of the source metadata stored for `location`.
    pub fn source(&self, location: &str) -> Option<EntrySource> {
        self.lock().entries.get(location).map(|e| e.source.clone())
    }

    pub fn remove(&self, location: &str) -> bool {
        self.lock().remove(location).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.total_size = 0;
    }
}
