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

// Error types for the clip recording engine and its collaborators

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the recorder internals.
///
/// The engine itself never surfaces these to callers: every variant is
/// logged at the engine boundary and discarded, so a failing disk or codec
/// degrades a clip instead of stopping the recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open video writer for {path} with codec '{codec}': {reason}")]
    WriterOpen {
        path: PathBuf,
        codec: String,
        reason: String,
    },

    #[error("failed to write frame: {0}")]
    Write(String),

    #[error("failed to close video writer: {0}")]
    Close(String),

    #[error("frame size {got_width}x{got_height} does not match writer size {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("frame source error: {0}")]
    Source(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("command queue error: {0}")]
    Queue(String),

    #[error("upload failed: {0}")]
    Upload(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
