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

// Disk quota enforcement for the clip directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Extension of the clip files managed by the recorder.
pub const CLIP_EXTENSION: &str = "mp4";

/// Outcome of one enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaReport {
    pub files_scanned: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl QuotaReport {
    pub fn bytes_freed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

struct ClipFile {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// Deletes the oldest clips until the directory fits in `budget_bytes`.
///
/// A budget of zero disables enforcement. The newest clip is never removed,
/// so a single clip larger than the budget survives until newer clips push
/// it out.
#[derive(Debug, Clone)]
pub struct DiskQuota {
    budget_bytes: u64,
    extension: String,
}

impl DiskQuota {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            budget_bytes,
            extension: CLIP_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(budget_bytes: u64, extension: impl Into<String>) -> Self {
        Self {
            budget_bytes,
            extension: extension.into(),
        }
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn is_enabled(&self) -> bool {
        self.budget_bytes > 0
    }

    /// Run one best-effort pass over `dir`. Never fails: unreadable entries
    /// are skipped and deletion errors are collected in the report.
    pub fn enforce(&self, dir: &Path) -> QuotaReport {
        let mut report = QuotaReport::default();
        if !self.is_enabled() {
            return report;
        }

        let mut clips = match self.scan(dir) {
            Ok(clips) => clips,
            Err(e) => {
                warn!("Quota scan of {} failed: {}", dir.display(), e);
                return report;
            }
        };

        report.files_scanned = clips.len();
        report.bytes_before = clips.iter().map(|c| c.size).sum();
        report.bytes_after = report.bytes_before;

        if report.bytes_before <= self.budget_bytes {
            debug!(
                "Clip directory {} within quota: {} / {} bytes",
                dir.display(),
                report.bytes_before,
                self.budget_bytes
            );
            return report;
        }

        // Oldest first; ties broken by name so the order is stable
        clips.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        let keep_newest = clips.len().saturating_sub(1);

        for clip in &clips[..keep_newest] {
            match fs::remove_file(&clip.path) {
                Ok(()) => {
                    info!(
                        "Quota: deleted {} ({} bytes)",
                        clip.path.display(),
                        clip.size
                    );
                    report.bytes_after -= clip.size;
                    report.deleted.push(clip.path.clone());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Quota: {} already gone", clip.path.display());
                    report.bytes_after -= clip.size;
                }
                Err(e) => {
                    warn!("Quota: could not delete {}: {}", clip.path.display(), e);
                    report.failed.push((clip.path.clone(), e.to_string()));
                }
            }
            if report.bytes_after <= self.budget_bytes {
                break;
            }
        }

        report
    }

    fn scan(&self, dir: &Path) -> io::Result<Vec<ClipFile>> {
        let mut clips = Vec::new();
        for entry in fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            let matches_extension = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
            if !matches_extension {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            clips.push(ClipFile {
                path,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(clips)
    }
}
