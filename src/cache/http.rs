use super::headers::format_http_date;
use super::CacheError;
use crate::settings::Settings;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use std::time::Duration;

/// The parts of an HTTP response the cache consumes.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

/// Validators sent with a revalidation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
}

/// Synchronous HTTP access used by the image cache.
///
/// `get` fails for non-success statuses; `head` returns whatever status the
/// server answered with so the caller can tell `304` apart.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, CacheError>;
    fn head(&self, url: &str, validators: &Validators) -> Result<HttpResponse, CacheError>;
}

/// [`HttpClient`] backed by `reqwest`'s blocking client.
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|source| CacheError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CacheError> {
        Self::new(
            Duration::from_secs(settings.http_timeout_secs),
            &settings.user_agent,
        )
    }
}

fn transport(url: &str) -> impl FnOnce(reqwest::Error) -> CacheError + '_ {
    move |source| CacheError::Transport {
        url: url.to_string(),
        source,
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, CacheError> {
        let resp = self.client.get(url).send().map_err(transport(url))?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(CacheError::Http {
                url: url.to_string(),
                status,
            });
        }
        let headers = resp.headers().clone();
        let body = resp.bytes().map_err(transport(url))?.to_vec();
        tracing::debug!(url, status, bytes = body.len(), "fetched image");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn head(&self, url: &str, validators: &Validators) -> Result<HttpResponse, CacheError> {
        let mut req = self.client.head(url);
        if let Some(etag) = &validators.etag {
            req = req.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(lm) = validators.last_modified.and_then(format_http_date) {
            req = req.header(IF_MODIFIED_SINCE, lm);
        }
        let resp = req.send().map_err(transport(url))?;
        let status = resp.status().as_u16();
        tracing::debug!(url, status, "revalidated image");
        Ok(HttpResponse {
            status,
            headers: resp.headers().clone(),
            body: Vec::new(),
        })
    }
}
