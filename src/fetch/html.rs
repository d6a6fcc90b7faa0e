//! The HTML fetch method.
//!
//! Fetches a page, keeps only textual content, follows the AJAX fragment
//! protocol, and caches a record of `(real URL, content)` so the dispatcher
//! can expose the post-redirect, fragment-restored URL in `X-Real-URL`.

use async_trait::async_trait;
use axum::http::{header::HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ajax::{escape_fragment, fragment_meta_rewrite, unescape_fragment};
use super::{read_limited, Fetcher, QueryMap};
use crate::error::FetchError;

/// Response header carrying the real URL of the cached document.
pub const X_REAL_URL: HeaderName = HeaderName::from_static("x-real-url");

/// Upper bound on fragment rewrites per fetch. The protocol needs at most
/// two hops (hashbang escape, then one meta rewrite); the cap stops
/// pathological documents from looping.
pub const MAX_FRAGMENT_REWRITES: usize = 4;

/// The serialized cache value: the URL the client finally landed on (with
/// any escaped fragment restored) and the page bytes. Internal format only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchRecord {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Content", with = "serde_bytes")]
    pub content: Vec<u8>,
}

pub struct HtmlFetcher {
    client: reqwest::Client,
    max_item_size: u64,
}

impl HtmlFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client, max_item_size: u64) -> Self {
        Self {
            client,
            max_item_size,
        }
    }

    /// Fetch `raw_url`, following the fragment protocol when `ajax` is set.
    pub async fn fetch_page(
        &self,
        raw_url: &str,
        ajax: bool,
    ) -> Result<FetchRecord, FetchError> {
        let mut url = if ajax {
            escape_fragment(raw_url)
        } else {
            raw_url.to_string()
        };
        let mut rewrites = 0;

        loop {
            debug!(%url, "fetching");
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::transport(&url, &e))?;
            let status = response.status().as_u16();
            if status != 200 {
                return Err(FetchError::StatusCode {
                    url: url.clone(),
                    code: status,
                });
            }
            let final_url = response.url().to_string();
            let body = read_limited(response, self.max_item_size, &url).await?;

            // Sniff the first 512 bytes; non-textual bodies cache as empty
            // (a negative entry that lives until evicted).
            let head = body.get(..body.len().min(512)).unwrap_or(&body);
            if !sniffs_as_text(head) {
                return Ok(FetchRecord::default());
            }

            if ajax && rewrites < MAX_FRAGMENT_REWRITES {
                let text = String::from_utf8_lossy(&body);
                if let Some(next) = fragment_meta_rewrite(&url, &text) {
                    rewrites += 1;
                    url = next;
                    continue;
                }
            }

            return Ok(FetchRecord {
                url: unescape_fragment(&final_url),
                content: body,
            });
        }
    }
}

#[async_trait]
impl Fetcher for HtmlFetcher {
    async fn generate(&self, query: &QueryMap) -> Result<Bytes, FetchError> {
        let url = query.get("url").ok_or(FetchError::MissingParam("url"))?;
        let ajax = query.get("ajax") != Some("0");
        let record = self.fetch_page(url, ajax).await?;
        let encoded = serde_json::to_vec(&record)
            .map_err(|e| FetchError::Internal(format!("encoding cache record: {e}")))?;
        Ok(Bytes::from(encoded))
    }

    fn write_response(&self, content: Bytes) -> Response {
        match serde_json::from_slice::<FetchRecord>(&content) {
            Ok(record) => {
                let mut response = record.content.into_response();
                if let Ok(value) = HeaderValue::from_str(&record.url) {
                    response.headers_mut().insert(X_REAL_URL, value);
                }
                response
            }
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("decoding cache record: {err}"),
            )
                .into_response(),
        }
    }
}

/// Minimal content sniff over the first bytes of a body: reject known binary
/// signatures, then treat control bytes outside the usual whitespace set as
/// binary data. Empty bodies sniff as text.
fn sniffs_as_text(head: &[u8]) -> bool {
    const BINARY_MAGICS: &[&[u8]] = &[
        b"\x89PNG\r\n\x1a\n",
        b"GIF87a",
        b"GIF89a",
        b"\xFF\xD8\xFF",
        b"%PDF-",
        b"PK\x03\x04",
        b"\x1F\x8B",
        b"OggS",
        b"\x00asm",
        b"fLaC",
        b"RIFF",
    ];
    const UTF_BOMS: &[&[u8]] = &[b"\xEF\xBB\xBF", b"\xFE\xFF", b"\xFF\xFE"];

    if UTF_BOMS.iter().any(|bom| head.starts_with(bom)) {
        return true;
    }
    if BINARY_MAGICS.iter().any(|magic| head.starts_with(magic)) {
        return false;
    }
    !head.iter().any(|&b| {
        matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
    })
}
