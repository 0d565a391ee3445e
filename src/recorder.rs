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

// Clip recording engine
//
// Turns per-frame motion signals and manual requests into bounded clips:
// - Keeps a pre-roll buffer of recent frames
// - Opens a clip on the first trigger and back-fills it from the buffer
// - Extends the clip while signals keep arriving
// - Closes on a quiet gap past the requested end, or at the hard cap
// - Enforces the disk quota after every close

use crate::buffer::PrerollBuffer;
use crate::config::ClipConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::protocol::{ClipReason, RecordingStatus, StatusSnapshot};
use crate::quota::{DiskQuota, CLIP_EXTENSION};
use crate::video::{FrameRate, VideoWriter, WriterFactory, WriterSpec};
use chrono::{DateTime, Local, TimeZone};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Timing and output settings for the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSettings {
    pub pre_roll_seconds: f64,
    pub post_roll_seconds: f64,
    pub quiet_gap_seconds: f64,
    pub max_clip_seconds: f64,
    pub fps: FrameRate,
    pub codec: String,
    pub fallback_codec: String,
    pub quota_bytes: u64,
    pub clip_dir: PathBuf,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            pre_roll_seconds: 3.0,
            post_roll_seconds: 5.0,
            quiet_gap_seconds: 2.0,
            max_clip_seconds: 60.0,
            fps: FrameRate::Auto,
            codec: "libx264".to_string(),
            fallback_codec: "mpeg4".to_string(),
            quota_bytes: 2 * 1024 * 1024 * 1024,
            clip_dir: PathBuf::from("clips"),
        }
    }
}

impl ClipSettings {
    /// Clamp windows to valid ranges: non-negative roll/gap windows and a
    /// hard cap of at least one second.
    pub fn normalized(mut self) -> Self {
        fn non_negative(value: f64) -> f64 {
            if value.is_finite() {
                value.max(0.0)
            } else {
                0.0
            }
        }
        self.pre_roll_seconds = non_negative(self.pre_roll_seconds);
        self.post_roll_seconds = non_negative(self.post_roll_seconds);
        self.quiet_gap_seconds = non_negative(self.quiet_gap_seconds);
        self.max_clip_seconds = if self.max_clip_seconds.is_nan() {
            1.0
        } else {
            self.max_clip_seconds.max(1.0)
        };
        self
    }
}

impl From<&ClipConfig> for ClipSettings {
    fn from(config: &ClipConfig) -> Self {
        Self {
            pre_roll_seconds: config.pre_roll_seconds,
            post_roll_seconds: config.post_roll_seconds,
            quiet_gap_seconds: config.quiet_gap_seconds,
            max_clip_seconds: config.max_clip_seconds,
            fps: config.fps,
            codec: config.codec.clone(),
            fallback_codec: config.fallback_codec.clone(),
            quota_bytes: config.quota_bytes,
            clip_dir: PathBuf::from(&config.clip_dir),
        }
    }
}

/// Why a session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    MaxDuration,
    QuietGap,
    Shutdown,
}

/// The one in-progress clip
pub struct RecordingSession {
    open_ts: f64,
    extend_until: f64,
    last_signal_ts: f64,
    writer: Box<dyn VideoWriter>,
    frames_written: u64,
    write_failures: u64,
    output_path: PathBuf,
    reason: ClipReason,
    codec: String,
    fps: f64,
}

impl RecordingSession {
    pub fn open_ts(&self) -> f64 {
        self.open_ts
    }

    pub fn extend_until(&self) -> f64 {
        self.extend_until
    }

    pub fn last_signal_ts(&self) -> f64 {
        self.last_signal_ts
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn reason(&self) -> ClipReason {
        self.reason
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration(&self, now_ts: f64) -> f64 {
        (now_ts - self.open_ts).max(0.0)
    }

    /// Refresh liveness and push the earliest close time out to `until`,
    /// never pulling it in.
    fn extend(&mut self, ts: f64, until: f64) {
        self.last_signal_ts = ts;
        if until > self.extend_until {
            self.extend_until = until;
        }
    }

    fn write_frame(&mut self, frame: &Frame) {
        match self.writer.write(frame) {
            Ok(()) => self.frames_written += 1,
            Err(e) => {
                self.write_failures += 1;
                warn!(
                    "Failed to write frame to {}: {}",
                    self.output_path.display(),
                    e
                );
            }
        }
    }

    fn close_cause(&self, ts: f64, settings: &ClipSettings) -> Option<CloseCause> {
        if self.duration(ts) >= settings.max_clip_seconds {
            return Some(CloseCause::MaxDuration);
        }
        if ts - self.last_signal_ts >= settings.quiet_gap_seconds && ts >= self.extend_until {
            return Some(CloseCause::QuietGap);
        }
        None
    }
}

/// Motion-triggered clip recorder.
///
/// All operations are synchronous and expect to be driven from one logical
/// thread, once per incoming frame: `notify_frame`, then any `force_clip`
/// and `notify_motion` calls, then `tick`. Failures inside the engine are
/// logged and never returned.
pub struct ClipRecorder {
    settings: ClipSettings,
    buffer: PrerollBuffer,
    quota: DiskQuota,
    writers: Arc<dyn WriterFactory>,
    session: Option<RecordingSession>,
}

impl ClipRecorder {
    /// Create an engine, creating the clip directory if needed.
    pub fn new(settings: ClipSettings, writers: Arc<dyn WriterFactory>) -> Result<Self> {
        let settings = settings.normalized();
        std::fs::create_dir_all(&settings.clip_dir)?;

        info!(
            "Clip recorder ready: dir={}, pre_roll={}s, post_roll={}s, quiet_gap={}s, max_clip={}s, fps={}, codec={}, writer={}",
            settings.clip_dir.display(),
            settings.pre_roll_seconds,
            settings.post_roll_seconds,
            settings.quiet_gap_seconds,
            settings.max_clip_seconds,
            settings.fps,
            settings.codec,
            writers.factory_type()
        );

        Ok(Self {
            buffer: PrerollBuffer::new(settings.pre_roll_seconds),
            quota: DiskQuota::new(settings.quota_bytes),
            settings,
            writers,
            session: None,
        })
    }

    /// Called for every captured frame. Buffers it for pre-roll and, while a
    /// clip is open, appends it to the clip.
    pub fn notify_frame(&mut self, ts: f64, frame: &Frame) {
        self.buffer.push(ts, frame);
        if let Some(session) = self.session.as_mut() {
            session.write_frame(frame);
        }
    }

    /// Called when motion is present in the current frame.
    pub fn notify_motion(&mut self, ts: f64, frame: &Frame) {
        if self.session.is_none() {
            self.session = self.open_session(ts, frame, ClipReason::Motion);
        }
        let post_roll = self.settings.post_roll_seconds;
        if let Some(session) = self.session.as_mut() {
            session.extend(ts, ts + post_roll);
        }
    }

    /// Manual request for a clip covering at least `duration_seconds` from
    /// `ts`. Extends an open clip instead of starting a new one, and never
    /// shortens an already longer window.
    pub fn force_clip(&mut self, ts: f64, frame: &Frame, duration_seconds: f64) {
        let duration = if duration_seconds.is_finite() {
            duration_seconds.max(1.0)
        } else {
            1.0
        };
        if self.session.is_none() {
            self.session = self.open_session(ts, frame, ClipReason::Manual);
        }
        if let Some(session) = self.session.as_mut() {
            session.extend(ts, ts + duration);
            info!(
                "Forced clip: reason={}, extend_until={:.3}",
                session.reason.as_str(),
                session.extend_until
            );
        }
    }

    /// Evaluate closing conditions. Returns the finished clip's path when a
    /// session closed on this call.
    pub fn tick(&mut self, ts: f64) -> Option<PathBuf> {
        let cause = self
            .session
            .as_ref()?
            .close_cause(ts, &self.settings)?;
        self.close_current(ts, cause)
    }

    /// Close any open session regardless of its timing.
    pub fn shutdown(&mut self, ts: f64) -> Option<PathBuf> {
        self.session.as_ref()?;
        self.close_current(ts, CloseCause::Shutdown)
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn buffer(&self) -> &PrerollBuffer {
        &self.buffer
    }

    pub fn settings(&self) -> &ClipSettings {
        &self.settings
    }

    pub fn status(&self) -> StatusSnapshot {
        match &self.session {
            None => StatusSnapshot::idle(self.buffer.len()),
            Some(session) => StatusSnapshot {
                status: RecordingStatus::Recording,
                reason: Some(session.reason),
                output_path: Some(session.output_path.clone()),
                frames_written: session.frames_written,
                open_ts: Some(session.open_ts),
                extend_until: Some(session.extend_until),
                last_signal_ts: Some(session.last_signal_ts),
                buffered_frames: self.buffer.len(),
            },
        }
    }

    fn open_session(
        &self,
        ts: f64,
        frame: &Frame,
        reason: ClipReason,
    ) -> Option<RecordingSession> {
        let fps = self.settings.fps.resolve();
        let output_path = unique_clip_path(&self.settings.clip_dir, ts, reason);
        let mut spec = WriterSpec {
            path: output_path.clone(),
            codec: self.settings.codec.clone(),
            fps,
            width: frame.width(),
            height: frame.height(),
        };

        let writer = match self.writers.open(&spec) {
            Ok(writer) => writer,
            Err(e) if !spec.codec.eq_ignore_ascii_case(&self.settings.fallback_codec) => {
                warn!(
                    "{}; retrying with fallback codec '{}'",
                    e, self.settings.fallback_codec
                );
                spec.codec = self.settings.fallback_codec.clone();
                match self.writers.open(&spec) {
                    Ok(writer) => writer,
                    Err(e) => {
                        error!("Dropping {} trigger: {}", reason.as_str(), e);
                        return None;
                    }
                }
            }
            Err(e) => {
                error!("Dropping {} trigger: {}", reason.as_str(), e);
                return None;
            }
        };

        let mut session = RecordingSession {
            open_ts: ts,
            extend_until: ts + self.settings.post_roll_seconds,
            last_signal_ts: ts,
            writer,
            frames_written: 0,
            write_failures: 0,
            output_path,
            reason,
            codec: spec.codec,
            fps,
        };

        let pre_roll = self.buffer.get_since(ts - self.settings.pre_roll_seconds);
        for (_, buffered) in &pre_roll {
            session.write_frame(buffered);
        }
        // The trigger frame belongs in the clip even when it was never buffered
        if !pre_roll.iter().any(|(buffered_ts, _)| *buffered_ts == ts) {
            session.write_frame(frame);
        }

        info!(
            "Session opened ({}) -> {} (fps={}, size={}x{}, pre_roll_frames={})",
            reason.as_str(),
            session.output_path.display(),
            fps,
            frame.width(),
            frame.height(),
            pre_roll.len()
        );

        Some(session)
    }

    fn close_current(&mut self, ts: f64, cause: CloseCause) -> Option<PathBuf> {
        // Taking the session first guarantees the engine is idle even if
        // releasing the writer fails
        let session = self.session.take()?;
        let RecordingSession {
            open_ts,
            writer,
            frames_written,
            write_failures,
            output_path,
            reason,
            ..
        } = session;

        match writer.release() {
            Ok(()) => info!(
                "Session closed ({:?}) -> {} (frames={}, failed_writes={}, reason={}, duration={:.1}s)",
                cause,
                output_path.display(),
                frames_written,
                write_failures,
                reason.as_str(),
                (ts - open_ts).max(0.0)
            ),
            Err(e) => error!(
                "Error closing session {}: {}",
                output_path.display(),
                e
            ),
        }

        self.enforce_quota();
        Some(output_path)
    }

    fn enforce_quota(&self) {
        let report = self.quota.enforce(&self.settings.clip_dir);
        if !report.deleted.is_empty() || !report.failed.is_empty() {
            info!(
                "Quota pass: scanned={}, deleted={}, failed={}, bytes {} -> {} (budget {})",
                report.files_scanned,
                report.deleted.len(),
                report.failed.len(),
                report.bytes_before,
                report.bytes_after,
                self.quota.budget_bytes()
            );
        } else {
            debug!(
                "Quota pass: {} clips, {} bytes",
                report.files_scanned, report.bytes_before
            );
        }
    }
}

/// `clip_%Y%m%d_%H%M%S_{mov|man}.mp4` in local time.
pub fn clip_file_name(ts: f64, reason: ClipReason) -> String {
    let stamp = local_time(ts).format("%Y%m%d_%H%M%S");
    format!("clip_{}_{}.{}", stamp, reason.file_tag(), CLIP_EXTENSION)
}

fn local_time(ts: f64) -> DateTime<Local> {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9) as u32;
    Local
        .timestamp_opt(secs as i64, nanos.min(999_999_999))
        .earliest()
        .unwrap_or_else(Local::now)
}

/// Two triggers inside the same second get distinct files.
fn unique_clip_path(dir: &Path, ts: f64, reason: ClipReason) -> PathBuf {
    let name = clip_file_name(ts, reason);
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name.trim_end_matches(&format!(".{}", CLIP_EXTENSION)).to_string();
    (1u32..)
        .map(|n| dir.join(format!("{}-{}.{}", stem, n, CLIP_EXTENSION)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_normalized() {
        let settings = ClipSettings {
            pre_roll_seconds: -1.0,
            post_roll_seconds: f64::NAN,
            quiet_gap_seconds: 2.0,
            max_clip_seconds: 0.2,
            ..ClipSettings::default()
        }
        .normalized();
        assert_eq!(settings.pre_roll_seconds, 0.0);
        assert_eq!(settings.post_roll_seconds, 0.0);
        assert_eq!(settings.quiet_gap_seconds, 2.0);
        assert_eq!(settings.max_clip_seconds, 1.0);
    }

    #[test]
    fn test_clip_file_name_format() {
        let name = clip_file_name(1_700_000_000.4, ClipReason::Motion);
        assert!(name.starts_with("clip_"));
        assert!(name.ends_with("_mov.mp4"));
        // clip_YYYYMMDD_HHMMSS_mov.mp4
        assert_eq!(name.len(), "clip_20231114_221320_mov.mp4".len());

        let manual = clip_file_name(1_700_000_000.0, ClipReason::Manual);
        assert!(manual.ends_with("_man.mp4"));
    }

    #[test]
    fn test_unique_clip_path_avoids_collision() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = unique_clip_path(dir.path(), 1_700_000_000.0, ClipReason::Motion);
        std::fs::write(&first, b"x").unwrap();
        let second = unique_clip_path(dir.path(), 1_700_000_000.0, ClipReason::Motion);
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-1.mp4"));
    }
}
