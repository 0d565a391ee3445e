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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Clip length used when a manual request carries no usable duration.
pub const DEFAULT_CLIP_DURATION_SECONDS: f64 = 10.0;

/// Why a clip was started. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClipReason {
    Motion,
    Manual,
}

impl ClipReason {
    /// Short tag embedded in clip file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            ClipReason::Motion => "mov",
            ClipReason::Manual => "man",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClipReason::Motion => "motion",
            ClipReason::Manual => "manual",
        }
    }
}

/// Commands delivered to the recorder through a command queue
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    ForceClip {
        duration_seconds: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        issued_at: Option<f64>,
    },
    Arm,
    Disarm,
}

impl Command {
    pub fn force_clip(duration_seconds: f64) -> Self {
        Command::ForceClip {
            duration_seconds,
            issued_at: None,
        }
    }

    /// Lenient decoding of a queued command.
    ///
    /// Unknown types yield `None`. A missing or unparseable duration falls
    /// back to [`DEFAULT_CLIP_DURATION_SECONDS`]; numbers given as strings
    /// (including a comma decimal separator) are accepted.
    pub fn from_value(value: &Value) -> Option<Self> {
        let kind = value.get("type")?.as_str()?;
        match kind {
            "force_clip" => {
                let duration = value
                    .get("duration_seconds")
                    .or_else(|| value.get("duration_sec"))
                    .and_then(parse_seconds)
                    .unwrap_or(DEFAULT_CLIP_DURATION_SECONDS);
                let issued_at = value
                    .get("issued_at")
                    .or_else(|| value.get("ts"))
                    .and_then(parse_seconds);
                Some(Command::ForceClip {
                    duration_seconds: duration,
                    issued_at,
                })
            }
            "arm" => Some(Command::Arm),
            "disarm" => Some(Command::Disarm),
            _ => None,
        }
    }
}

fn parse_seconds(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_decimal(s)?,
        _ => return None,
    };
    seconds.is_finite().then_some(seconds)
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse::<f64>().ok()
}

/// Parse a chat message such as `/clip 15`, `/arm` or `/disarm`.
///
/// `/clip` without an argument or with an unparseable one requests the
/// default duration; a non-positive duration becomes one second.
pub fn parse_chat_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let word = parts.next()?.to_lowercase();
    // Chat clients may append "@botname" to the command word
    let word = word.split('@').next().unwrap_or_default();

    match word {
        "/clip" => {
            let mut duration = DEFAULT_CLIP_DURATION_SECONDS;
            if let Some(parsed) = parts.next().and_then(parse_decimal) {
                if parsed.is_finite() {
                    duration = if parsed <= 0.0 { 1.0 } else { parsed };
                }
            }
            Some(Command::force_clip(duration))
        }
        "/arm" => Some(Command::Arm),
        "/disarm" => Some(Command::Disarm),
        _ => None,
    }
}

/// Engine state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Recording,
}

/// Point-in-time view of the engine for logging and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub status: RecordingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ClipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub frames_written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_ts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extend_until: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_signal_ts: Option<f64>,
    pub buffered_frames: usize,
}

impl StatusSnapshot {
    pub fn idle(buffered_frames: usize) -> Self {
        Self {
            status: RecordingStatus::Idle,
            reason: None,
            output_path: None,
            frames_written: 0,
            open_ts: None,
            extend_until: None,
            last_signal_ts: None,
            buffered_frames,
        }
    }
}
