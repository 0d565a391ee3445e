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

// HTTP upload sink

use super::sink::ClipSink;
use crate::config::UploadConfig;
use crate::error::{RecorderError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// POSTs finished clips to an HTTP endpoint as `application/octet-stream`.
///
/// Labels travel as `x-clip-label-<key>` headers and the file name as
/// `x-clip-name`.
pub struct HttpUploadSink {
    client: Client,
    url: String,
}

impl HttpUploadSink {
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| RecorderError::Upload("upload url missing".to_string()))?;

        let mut client_builder = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(config.timeout_seconds));

        // Add API token if provided
        if let Some(token) = &config.api_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_value)
                    .map_err(|_| RecorderError::Upload("invalid API token".to_string()))?,
            );
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder
            .build()
            .map_err(|e| RecorderError::Upload(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ClipSink for HttpUploadSink {
    async fn upload(&self, path: &Path, labels: &HashMap<String, String>) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        let size = data.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .header("x-clip-name", file_name);

        for (key, value) in labels {
            request = request.header(format!("x-clip-label-{}", key), value);
        }

        let response = request
            .body(data)
            .send()
            .await
            .map_err(|e| RecorderError::Upload(format!("failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecorderError::Upload(format!(
                "upload failed with status {}: {}",
                status, error_text
            )));
        }

        info!("Uploaded {} ({} bytes) to {}", path.display(), size, self.url);
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url() {
        let config = UploadConfig {
            backend: "http".to_string(),
            ..UploadConfig::default()
        };
        assert!(HttpUploadSink::new(&config).is_err());
    }

    #[test]
    fn test_rejects_invalid_token() {
        let config = UploadConfig {
            backend: "http".to_string(),
            url: Some("http://localhost:9/clips".to_string()),
            api_token: Some("bad\ntoken".to_string()),
            ..UploadConfig::default()
        };
        assert!(HttpUploadSink::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let config = UploadConfig {
            backend: "http".to_string(),
            url: Some("http://localhost:9/clips".to_string()),
            ..UploadConfig::default()
        };
        let sink = HttpUploadSink::new(&config).unwrap();
        let result = sink
            .upload(Path::new("/nonexistent/clip.mp4"), &HashMap::new())
            .await;
        assert!(matches!(result, Err(RecorderError::Io(_))));
    }
}
