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

// Clip sink trait

use crate::error::{RecorderError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Destination for finished clips
#[async_trait]
pub trait ClipSink: Send + Sync {
    /// Deliver one clip file with metadata labels
    ///
    /// # Arguments
    /// * `path` - Finished clip on local disk
    /// * `labels` - Metadata labels/tags
    async fn upload(&self, path: &Path, labels: &HashMap<String, String>) -> Result<()>;

    /// Upload with exponential backoff (100 ms doubling, capped at 30 s)
    async fn upload_with_retry(
        &self,
        path: &Path,
        labels: &HashMap<String, String>,
        max_retries: u32,
    ) -> Result<()> {
        let mut attempt = 0;
        let mut delay = Duration::from_millis(100);

        loop {
            match self.upload(path, labels).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(
                            "Uploaded clip {} after {} retries",
                            path.display(),
                            attempt
                        );
                    }
                    return Ok(());
                }
                Err(RecorderError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    // Removed locally, e.g. by the disk quota; retrying cannot help
                    warn!("Clip {} no longer exists, not uploading", path.display());
                    return Err(RecorderError::Io(e));
                }
                Err(e) if attempt < max_retries => {
                    warn!(
                        "Upload of {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        path.display(),
                        attempt + 1,
                        max_retries,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    delay *= 2;
                    delay = delay.min(Duration::from_secs(30));
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Upload of {} failed after {} attempts: {}",
                        path.display(),
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Get sink type identifier
    fn sink_type(&self) -> &str;
}

/// Sink that only records the clip in the log
pub struct LogSink;

#[async_trait]
impl ClipSink for LogSink {
    async fn upload(&self, path: &Path, labels: &HashMap<String, String>) -> Result<()> {
        info!("Clip ready: {} {:?}", path.display(), labels);
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "log"
    }
}

/// Hand a finished clip to `sink` on a background task.
pub fn dispatch(
    sink: Arc<dyn ClipSink>,
    path: PathBuf,
    max_retries: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let labels = clip_labels(&path);
        if let Err(e) = sink.upload_with_retry(&path, &labels, max_retries).await {
            warn!(
                "Giving up on {} via {} sink: {}",
                path.display(),
                sink.sink_type(),
                e
            );
        }
    })
}

/// Labels describing a clip, derived from its file name
pub fn clip_labels(path: &Path) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if let Some(name) = path.file_name() {
        let name = name.to_string_lossy().to_string();
        let reason = if name.contains("_man") {
            "manual"
        } else if name.contains("_mov") {
            "motion"
        } else {
            "unknown"
        };
        labels.insert("reason".to_string(), reason.to_string());
        labels.insert("file_name".to_string(), name);
    }
    labels
}
