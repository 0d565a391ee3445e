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

// Motion-triggered clip recorder for polled still-image cameras
//
// This recorder:
// - Polls a camera snapshot endpoint and keeps a pre-roll buffer of frames
// - Detects motion by frame differencing while the system is armed
// - Turns motion bursts and manual requests into bounded video clips
// - Keeps the clip directory under a disk quota
// - Hands finished clips to an upload sink

pub mod buffer;
pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod motion;
pub mod protocol;
pub mod quota;
pub mod recorder;
pub mod runner;
pub mod source;
pub mod upload;
pub mod video;

// Re-export main types
pub use buffer::PrerollBuffer;
pub use config::{load_config, load_config_with_env, RecorderConfig};
pub use control::{
    feed_chat_commands, ArmState, CommandQueue, FileCommandQueue, MemoryCommandQueue,
};
pub use error::RecorderError;
pub use frame::Frame;
pub use motion::{FrameDiffDetector, MotionDetector};
pub use protocol::{parse_chat_command, ClipReason, Command, RecordingStatus, StatusSnapshot};
pub use quota::{DiskQuota, QuotaReport};
pub use recorder::{ClipRecorder, ClipSettings, RecordingSession};
pub use runner::{Runner, StepOutcome};
pub use source::{FrameSource, SnapshotSource};
pub use upload::{ClipSink, HttpUploadSink, LogSink, SinkFactory};
pub use video::{FfmpegWriterFactory, FrameRate, VideoWriter, WriterFactory, WriterSpec};
