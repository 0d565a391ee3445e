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

// Writer traits used by the clip recording engine

use crate::error::Result;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Encode rate used when no explicit frame rate is configured.
///
/// Snapshot feeds arrive at an irregular rate, so the real capture rate is
/// never used for playback timing.
pub const FALLBACK_FPS: f64 = 12.0;

/// Target encode frame rate: a fixed value or `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(try_from = "FrameRateRepr", into = "FrameRateRepr")]
pub enum FrameRate {
    #[default]
    Auto,
    Fixed(f64),
}

impl FrameRate {
    pub fn resolve(self) -> f64 {
        match self {
            FrameRate::Fixed(fps) if fps.is_finite() && fps > 0.0 => fps,
            _ => FALLBACK_FPS,
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRate::Auto => write!(f, "auto"),
            FrameRate::Fixed(fps) => write!(f, "{}", fps),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FrameRateRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<FrameRateRepr> for FrameRate {
    type Error = String;

    fn try_from(repr: FrameRateRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            FrameRateRepr::Number(fps) => Ok(FrameRate::Fixed(fps)),
            FrameRateRepr::Text(text) if text.trim().eq_ignore_ascii_case("auto") => {
                Ok(FrameRate::Auto)
            }
            FrameRateRepr::Text(text) => text
                .trim()
                .parse::<f64>()
                .map(FrameRate::Fixed)
                .map_err(|_| format!("invalid fps '{}': expected a number or \"auto\"", text)),
        }
    }
}

impl From<FrameRate> for FrameRateRepr {
    fn from(rate: FrameRate) -> Self {
        match rate {
            FrameRate::Auto => FrameRateRepr::Text("auto".to_string()),
            FrameRate::Fixed(fps) => FrameRateRepr::Number(fps),
        }
    }
}

/// Everything a factory needs to open one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterSpec {
    pub path: PathBuf,
    pub codec: String,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// An open clip being encoded.
///
/// `release` consumes the writer, so a clip is finalized at most once.
pub trait VideoWriter: Send {
    /// Append one frame. Frames must match the size the writer was opened with.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the clip file.
    fn release(self: Box<Self>) -> Result<()>;
}

/// Opens video writers for new clips.
pub trait WriterFactory: Send + Sync {
    fn open(&self, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>>;

    /// Identifier for logs
    fn factory_type(&self) -> &str;
}
