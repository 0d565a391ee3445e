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

// Video writer module
//
// Provides a trait-based abstraction over clip encoders so the recording
// engine can open, feed and release a clip without knowing how frames end
// up on disk. The default implementation pipes raw frames into ffmpeg.

pub mod ffmpeg;
pub mod writer;

pub use ffmpeg::FfmpegWriterFactory;
pub use writer::{FrameRate, VideoWriter, WriterFactory, WriterSpec, FALLBACK_FPS};
