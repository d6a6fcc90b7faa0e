//! The image fetch method: decode, shrink, re-encode.

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat, ImageOutputFormat};
use tracing::debug;

use super::{read_limited, Fetcher, QueryMap};
use crate::error::FetchError;

/// JPEG quality used for everything that is not PNG.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

pub struct ImageFetcher {
    client: reqwest::Client,
    max_item_size: u64,
    jpeg_quality: u8,
}

impl ImageFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client, max_item_size: u64, jpeg_quality: u8) -> Self {
        Self {
            client,
            max_item_size,
            jpeg_quality,
        }
    }
}

/// Format and truncation failures cache as empty bytes; everything else is
/// a real error.
fn is_benign_decode_error(err: &ImageError) -> bool {
    match err {
        ImageError::Decoding(_) | ImageError::Unsupported(_) => true,
        ImageError::IoError(io) => io.kind() == std::io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

/// Shrink `(w, h)` to fit the optional `width`/`height` bounds, keeping the
/// aspect ratio. Zero bounds and already-fitting dimensions are no-ops.
fn target_dimensions(w: u32, h: u32, width: u32, height: u32) -> (u32, u32) {
    let (mut w64, mut h64) = (u64::from(w), u64::from(h));
    if width > 0 && w64 > u64::from(width) {
        h64 = h64 * u64::from(width) / w64;
        w64 = u64::from(width);
    }
    if height > 0 && h64 > u64::from(height) {
        w64 = w64 * u64::from(height) / h64;
        h64 = u64::from(height);
    }
    (
        u32::try_from(w64.max(1)).unwrap_or(w),
        u32::try_from(h64.max(1)).unwrap_or(h),
    )
}

#[async_trait]
impl Fetcher for ImageFetcher {
    async fn generate(&self, query: &QueryMap) -> Result<Bytes, FetchError> {
        let url = query.get("url").ok_or(FetchError::MissingParam("url"))?;
        let width = query
            .get("width")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        let height = query
            .get("height")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, &e))?;
        if self.max_item_size > 0 {
            if let Some(declared) = response.content_length() {
                if declared > self.max_item_size {
                    // Oversized images cache as empty, like undecodable
                    // ones: the entry soaks up repeat requests.
                    debug!(%url, declared, "oversized image cached as empty");
                    return Ok(Bytes::new());
                }
            }
        }
        let body = read_limited(response, self.max_item_size, url).await?;

        let format = image::guess_format(&body).ok();
        let img = match image::load_from_memory(&body) {
            Ok(img) => img,
            Err(err) if is_benign_decode_error(&err) => {
                debug!(%url, %err, "undecodable image cached as empty");
                return Ok(Bytes::new());
            }
            Err(err) => {
                return Err(FetchError::Internal(format!(
                    "decoding image from {url}: {err}"
                )))
            }
        };

        let (src_w, src_h) = img.dimensions();
        let (w, h) = target_dimensions(src_w, src_h, width, height);
        let img = if (w, h) == (src_w, src_h) {
            img
        } else {
            img.resize_exact(w, h, FilterType::Triangle)
        };

        let mut out = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut out);
        let encoded = if format == Some(ImageFormat::Png) {
            img.write_to(&mut cursor, ImageOutputFormat::Png)
        } else {
            // JPEG cannot carry an alpha channel.
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut cursor, ImageOutputFormat::Jpeg(self.jpeg_quality))
        };
        encoded
            .map_err(|e| FetchError::Internal(format!("encoding image from {url}: {e}")))?;
        Ok(Bytes::from(out))
    }
}
