use super::headers::{etag_from_headers, last_modified_from_headers, max_age_from_headers};
use super::http::{HttpClient, Validators};
use super::image::Image;
use super::CacheError;
use reqwest::header::HeaderMap;
use std::path::PathBuf;
use std::time::SystemTime;
use url::Url;

/// What a freshness check needs from the outside world.
pub struct FreshnessContext<'a> {
    pub now: f64,
    pub http: &'a dyn HttpClient,
}

/// Decides whether a cached entry can be reused as-is.
pub trait Freshness {
    /// May refresh the stored metadata as a side effect.
    fn is_fresh(&mut self, ctx: &FreshnessContext<'_>) -> bool;
}

/// Freshness metadata of an image fetched over HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSource {
    pub url: String,
    pub last_modified: Option<i64>,
    pub etag: Option<String>,
    pub max_age: f64,
    pub retrieved: f64,
}

impl WebSource {
    pub fn from_headers(url: &str, headers: &HeaderMap, now: f64) -> Self {
        Self {
            url: url.to_string(),
            last_modified: last_modified_from_headers(headers),
            etag: etag_from_headers(headers),
            max_age: max_age_from_headers(headers, now),
            retrieved: now,
        }
    }
}

impl Freshness for WebSource {
    fn is_fresh(&mut self, ctx: &FreshnessContext<'_>) -> bool {
        if ctx.now - self.retrieved < self.max_age {
            return true;
        }

        let validators = Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified,
        };
        let response = match ctx.http.head(&self.url, &validators) {
            Ok(resp) if resp.is_success() || resp.is_not_modified() => resp,
            Ok(resp) => {
                tracing::debug!(url = %self.url, status = resp.status, "revalidation refused");
                return false;
            }
            Err(err) => {
                tracing::debug!(url = %self.url, "revalidation failed: {err}");
                return false;
            }
        };

        let etag = etag_from_headers(&response.headers);
        let last_modified = last_modified_from_headers(&response.headers);
        let fresh = if response.is_not_modified() {
            true
        } else if let (Some(old), Some(new)) = (&self.etag, &etag) {
            old == new
        } else if let (Some(old), Some(new)) = (self.last_modified, last_modified) {
            old == new
        } else {
            false
        };

        self.retrieved = ctx.now;
        self.max_age = max_age_from_headers(&response.headers, ctx.now);
        if response.is_not_modified() {
            // A 304 may omit validators; keep what we had.
            self.etag = etag.or_else(|| self.etag.take());
            self.last_modified = last_modified.or(self.last_modified);
        } else {
            self.etag = etag;
            self.last_modified = last_modified;
        }
        fresh
    }
}

/// Freshness metadata of an image read from the filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl Freshness for FileSource {
    fn is_fresh(&mut self, _ctx: &FreshnessContext<'_>) -> bool {
        match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified == self.modified,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), "cannot stat cached file: {err}");
                false
            }
        }
    }
}

/// Where a cached image came from.
#[derive(Debug, Clone, PartialEq)]
pub enum EntrySource {
    Web(WebSource),
    File(FileSource),
}

impl Freshness for EntrySource {
    fn is_fresh(&mut self, ctx: &FreshnessContext<'_>) -> bool {
        match self {
            EntrySource::Web(web) => web.is_fresh(ctx),
            EntrySource::File(file) => file.is_fresh(ctx),
        }
    }
}

/// A decoded image plus the bookkeeping the cache needs.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub image: Image,
    pub size: usize,
    pub last_accessed: f64,
    pub(crate) access_seq: u64,
    pub source: EntrySource,
}

/// Whether `location` should be fetched over HTTP rather than read from disk.
pub fn is_url(location: &str) -> bool {
    Url::parse(location)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

impl ImageEntry {
    /// Fetch or read `location` and decode it.
    pub fn load(location: &str, http: &dyn HttpClient, now: f64) -> Result<Self, CacheError> {
        let (image, source) = if is_url(location) {
            let resp = http.get(location)?;
            let image = Image::decode(&resp.body, location)?;
            let source = WebSource::from_headers(location, &resp.headers, now);
            (image, EntrySource::Web(source))
        } else {
            let path = PathBuf::from(location);
            let io_err = |source| CacheError::Io {
                path: location.to_string(),
                source,
            };
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(io_err)?;
            let bytes = std::fs::read(&path).map_err(io_err)?;
            let image = Image::decode(&bytes, location)?;
            (image, EntrySource::File(FileSource { path, modified }))
        };
        Ok(Self {
            size: image.byte_size(),
            image,
            last_accessed: now,
            access_seq: 0,
            source,
        })
    }
}
