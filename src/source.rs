// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Frame sources

use crate::config::CameraConfig;
use crate::error::{RecorderError, Result};
use crate::frame::Frame;
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Delivers camera frames at whatever rate the camera manages.
///
/// Sources do not retry; the caller decides when to back off and when to
/// ask for recovery.
#[async_trait]
pub trait FrameSource: Send {
    /// Fetch the next frame
    async fn fetch_frame(&mut self) -> Result<Frame>;

    /// Reset connection state after repeated failures
    async fn recover(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Polls a camera's still-image endpoint over HTTP and decodes the JPEG.
pub struct SnapshotSource {
    client: Client,
    url: String,
    referer: Option<String>,
    cookie: Option<String>,
    timeout: Duration,
}

impl SnapshotSource {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_seconds);
        Ok(Self {
            client: build_client(timeout)?,
            url: config.snapshot_url.clone(),
            referer: config.referer.clone().filter(|r| !r.is_empty()),
            cookie: config.cookie.clone().filter(|c| !c.is_empty()),
            timeout,
        })
    }

    /// Snapshot URL with a cache-busting parameter
    fn request_url(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        with_cache_buster(&self.url, millis)
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(2)
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .build()
        .map_err(|e| RecorderError::Source(format!("failed to build HTTP client: {}", e)))
}

pub(crate) fn with_cache_buster(url: &str, millis: u128) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}r={}", url, separator, millis)
}

/// Decode an encoded still image (JPEG) into an RGB frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes).map_err(|e| RecorderError::Decode(e.to_string()))?;
    Ok(Frame::from_rgb_image(image.to_rgb8()))
}

#[async_trait]
impl FrameSource for SnapshotSource {
    async fn fetch_frame(&mut self) -> Result<Frame> {
        let mut request = self.client.get(self.request_url());
        if let Some(referer) = &self.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecorderError::Source(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RecorderError::Source(format!(
                "snapshot request failed with status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RecorderError::Source(e.to_string()))?;
        if body.is_empty() {
            return Err(RecorderError::Source("empty snapshot body".to_string()));
        }

        let frame = decode_frame(&body)?;
        debug!(
            "Fetched {}x{} snapshot ({} bytes)",
            frame.width(),
            frame.height(),
            body.len()
        );
        Ok(frame)
    }

    async fn recover(&mut self) -> Result<()> {
        info!("Recreating HTTP client for {}", self.url);
        self.client = build_client(self.timeout)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("snapshot {}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_cache_buster() {
        assert_eq!(
            with_cache_buster("http://cam/out.jpg", 42),
            "http://cam/out.jpg?r=42"
        );
        assert_eq!(
            with_cache_buster("http://cam/out.jpg?q=30&id=7", 42),
            "http://cam/out.jpg?q=30&id=7&r=42"
        );
    }

    #[test]
    fn test_decode_jpeg() {
        let image = RgbImage::from_pixel(16, 8, Rgb([120, 60, 30]));
        let mut encoded = Cursor::new(Vec::new());
        image.write_to(&mut encoded, ImageFormat::Jpeg).unwrap();

        let frame = decode_frame(encoded.get_ref()).unwrap();
        assert_eq!(frame.dimensions(), (16, 8));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            decode_frame(b"not an image"),
            Err(RecorderError::Decode(_))
        ));
    }
}
