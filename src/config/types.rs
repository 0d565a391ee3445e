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

// Configuration types for the motion clip recorder

use crate::video::FrameRate;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecorderConfig {
    pub camera: CameraConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub clips: ClipConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Snapshot camera endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    pub snapshot_url: String,

    #[serde(default)]
    pub referer: Option<String>,

    #[serde(default)]
    pub cookie: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Consecutive fetch failures before the source is asked to recover
    #[serde(default = "default_failures_before_recover")]
    pub failures_before_recover: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_url: "http://localhost:8080/snapshot.jpg".to_string(),
            referer: None,
            cookie: None,
            request_timeout_seconds: default_request_timeout(),
            failures_before_recover: default_failures_before_recover(),
        }
    }
}

/// Frame-difference motion detector
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Width frames are downscaled to before comparison (0 = full size)
    #[serde(default = "default_proc_width")]
    pub proc_width: u32,

    /// Per-pixel grayscale difference that counts as change
    #[serde(default = "default_pixel_threshold")]
    pub pixel_threshold: u8,

    /// Fraction of changed pixels (0-1) that counts as motion
    #[serde(default = "default_min_changed_fraction")]
    pub min_changed_fraction: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            proc_width: default_proc_width(),
            pixel_threshold: default_pixel_threshold(),
            min_changed_fraction: default_min_changed_fraction(),
        }
    }
}

/// Clip timing, encoding and retention
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClipConfig {
    #[serde(default = "default_pre_roll")]
    pub pre_roll_seconds: f64,

    #[serde(default = "default_post_roll")]
    pub post_roll_seconds: f64,

    #[serde(default = "default_quiet_gap")]
    pub quiet_gap_seconds: f64,

    #[serde(default = "default_max_clip")]
    pub max_clip_seconds: f64,

    #[serde(default)]
    pub fps: FrameRate,

    #[serde(default = "default_codec")]
    pub codec: String,

    #[serde(default = "default_fallback_codec")]
    pub fallback_codec: String,

    /// Total size budget for the clip directory (0 disables the quota)
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,

    #[serde(default = "default_clip_dir")]
    pub clip_dir: String,

    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            pre_roll_seconds: default_pre_roll(),
            post_roll_seconds: default_post_roll(),
            quiet_gap_seconds: default_quiet_gap(),
            max_clip_seconds: default_max_clip(),
            fps: FrameRate::Auto,
            codec: default_codec(),
            fallback_codec: default_fallback_codec(),
            quota_bytes: default_quota_bytes(),
            clip_dir: default_clip_dir(),
            ffmpeg_binary: default_ffmpeg_binary(),
        }
    }
}

/// Command queue selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandConfig {
    /// "file" or "memory"
    #[serde(default = "default_command_backend")]
    pub backend: String,

    #[serde(default = "default_command_file")]
    pub file_path: String,

    #[serde(default)]
    pub armed_on_boot: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            backend: default_command_backend(),
            file_path: default_command_file(),
            armed_on_boot: false,
        }
    }
}

/// Where finished clips are handed off
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// "none", "log" or "http"
    #[serde(default = "default_upload_backend")]
    pub backend: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_upload_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            backend: default_upload_backend(),
            url: None,
            api_token: None,
            timeout_seconds: default_upload_timeout(),
            max_retries: default_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,  // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String,  // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_request_timeout() -> u64 { 10 }
fn default_failures_before_recover() -> u32 { 3 }
fn default_proc_width() -> u32 { 320 }
fn default_pixel_threshold() -> u8 { 25 }
fn default_min_changed_fraction() -> f64 { 0.01 }
fn default_pre_roll() -> f64 { 3.0 }
fn default_post_roll() -> f64 { 5.0 }
fn default_quiet_gap() -> f64 { 2.0 }
fn default_max_clip() -> f64 { 60.0 }
fn default_codec() -> String { "libx264".to_string() }
fn default_fallback_codec() -> String { "mpeg4".to_string() }
fn default_quota_bytes() -> u64 { 2 * 1024 * 1024 * 1024 }
fn default_clip_dir() -> String { "clips".to_string() }
fn default_ffmpeg_binary() -> String { "ffmpeg".to_string() }
fn default_command_backend() -> String { "file".to_string() }
fn default_command_file() -> String { "runtime/commands.json".to_string() }
fn default_upload_backend() -> String { "none".to_string() }
fn default_upload_timeout() -> u64 { 300 }
fn default_retries() -> u32 { 3 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
