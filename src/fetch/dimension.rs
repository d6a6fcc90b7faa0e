//! The dimension fetch method: image size without a full decode.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{read_limited, Fetcher, QueryMap};
use crate::error::FetchError;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    #[serde(rename = "Width")]
    pub width: u32,
    #[serde(rename = "Height")]
    pub height: u32,
}

pub struct DimensionFetcher {
    client: reqwest::Client,
}

impl DimensionFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for DimensionFetcher {
    async fn generate(&self, query: &QueryMap) -> Result<Bytes, FetchError> {
        let url = query.get("url").ok_or(FetchError::MissingParam("url"))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, &e))?;
        let body = read_limited(response, 0, url).await?;

        let reader = image::io::Reader::new(std::io::Cursor::new(&body))
            .with_guessed_format()
            .map_err(|e| FetchError::Internal(format!("sniffing image from {url}: {e}")))?;
        let (width, height) = reader.into_dimensions().map_err(|e| {
            FetchError::Internal(format!("reading image dimensions from {url}: {e}"))
        })?;

        let encoded = serde_json::to_vec(&Dimensions { width, height })
            .map_err(|e| FetchError::Internal(format!("encoding dimensions: {e}")))?;
        Ok(Bytes::from(encoded))
    }
}
