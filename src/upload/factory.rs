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

// Sink factory for creating clip sinks from configuration

use super::http::HttpUploadSink;
use super::sink::{ClipSink, LogSink};
use crate::config::UploadConfig;
use anyhow::{bail, Result};
use std::sync::Arc;

pub struct SinkFactory;

impl SinkFactory {
    /// Create a clip sink from configuration. `none` yields no sink.
    pub fn create(config: &UploadConfig) -> Result<Option<Arc<dyn ClipSink>>> {
        match config.backend.as_str() {
            "none" => Ok(None),
            "log" => Ok(Some(Arc::new(LogSink))),
            "http" => {
                let sink = HttpUploadSink::new(config)?;
                Ok(Some(Arc::new(sink)))
            }
            unknown => bail!(
                "Unknown upload backend: '{}'. Supported: none, log, http",
                unknown
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_none() {
        let config = UploadConfig::default();
        assert!(SinkFactory::create(&config).unwrap().is_none());
    }

    #[test]
    fn test_create_log_sink() {
        let config = UploadConfig {
            backend: "log".to_string(),
            ..UploadConfig::default()
        };
        let sink = SinkFactory::create(&config).unwrap().unwrap();
        assert_eq!(sink.sink_type(), "log");
    }

    #[test]
    fn test_create_http_sink() {
        let config = UploadConfig {
            backend: "http".to_string(),
            url: Some("http://localhost:8000/clips".to_string()),
            ..UploadConfig::default()
        };
        let sink = SinkFactory::create(&config).unwrap().unwrap();
        assert_eq!(sink.sink_type(), "http");
    }

    #[test]
    fn test_create_unknown_sink() {
        let config = UploadConfig {
            backend: "ftp".to_string(),
            ..UploadConfig::default()
        };
        let result = SinkFactory::create(&config);
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Unknown upload backend"));
        }
    }
}
