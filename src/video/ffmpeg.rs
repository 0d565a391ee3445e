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

// ffmpeg-backed clip writer

use super::writer::{VideoWriter, WriterFactory, WriterSpec};
use crate::error::{RecorderError, Result};
use crate::frame::Frame;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Opens clips by spawning `ffmpeg` and streaming raw RGB24 frames to its stdin.
///
/// Codec availability is probed once with `ffmpeg -encoders`, so an
/// unsupported codec fails at open time instead of after the first write.
pub struct FfmpegWriterFactory {
    binary: String,
    encoders: OnceLock<Option<Vec<String>>>,
}

impl FfmpegWriterFactory {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            encoders: OnceLock::new(),
        }
    }

    /// Encoders reported by the ffmpeg binary, or `None` when it cannot run
    pub fn available_encoders(&self) -> Option<&[String]> {
        self.encoders
            .get_or_init(|| probe_encoders(&self.binary))
            .as_deref()
    }

    fn supports(&self, codec: &str) -> std::result::Result<(), String> {
        match self.available_encoders() {
            Some(encoders) if encoders.iter().any(|e| e == codec) => Ok(()),
            Some(_) => Err(format!("encoder '{}' not available in {}", codec, self.binary)),
            None => Err(format!("could not run '{}'", self.binary)),
        }
    }
}

impl Default for FfmpegWriterFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl WriterFactory for FfmpegWriterFactory {
    fn open(&self, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>> {
        let open_error = |reason: String| RecorderError::WriterOpen {
            path: spec.path.clone(),
            codec: spec.codec.clone(),
            reason,
        };

        self.supports(&spec.codec).map_err(open_error)?;

        let args = build_args(spec);
        debug!("Spawning {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| open_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| open_error("ffmpeg stdin not captured".to_string()))?;

        info!(
            "Opened ffmpeg writer for {} ({}, {} fps, {}x{})",
            spec.path.display(),
            spec.codec,
            spec.fps,
            spec.width,
            spec.height
        );

        Ok(Box::new(FfmpegWriter {
            child,
            stdin: Some(stdin),
            width: spec.width,
            height: spec.height,
            path: spec.path.clone(),
        }))
    }

    fn factory_type(&self) -> &str {
        "ffmpeg"
    }
}

/// Command line for encoding a raw RGB24 stream read from stdin.
pub fn build_args(spec: &WriterSpec) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-s".to_string(),
        format!("{}x{}", spec.width, spec.height),
        "-r".to_string(),
        format!("{}", spec.fps),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        spec.codec.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        spec.path.to_string_lossy().to_string(),
    ]
}

fn probe_encoders(binary: &str) -> Option<Vec<String>> {
    let output = match Command::new(binary)
        .arg("-hide_banner")
        .arg("-encoders")
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            warn!("Could not run '{}' to list encoders: {}", binary, e);
            return None;
        }
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let encoders = parse_encoder_list(&stdout);
    debug!("ffmpeg reports {} encoders", encoders.len());
    Some(encoders)
}

/// Extract encoder names from `ffmpeg -encoders` output.
///
/// The listing is a legend, a `------` separator, then one line per encoder
/// of the form ` V....D libx264   description`.
pub fn parse_encoder_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _flags = fields.next()?;
            fields.next().map(str::to_string)
        })
        .collect()
}

struct FfmpegWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    path: PathBuf,
}

impl VideoWriter for FfmpegWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(RecorderError::FrameSize {
                width: self.width,
                height: self.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::Write("writer already closed".to_string()))?;
        stdin
            .write_all(frame.data())
            .map_err(|e| RecorderError::Write(e.to_string()))
    }

    fn release(mut self: Box<Self>) -> Result<()> {
        // Closing stdin signals end of stream
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| RecorderError::Close(e.to_string()))?;
        if status.success() {
            debug!("ffmpeg finished {}", self.path.display());
            Ok(())
        } else {
            Err(RecorderError::Close(format!(
                "ffmpeg exited with {} for {}",
                status,
                self.path.display()
            )))
        }
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_encoder_list() {
        let encoders = parse_encoder_list(LISTING);
        assert_eq!(encoders, vec!["libx264", "mpeg4", "aac"]);
    }

    #[test]
    fn test_parse_encoder_list_without_separator() {
        assert!(parse_encoder_list("garbage output").is_empty());
    }

    #[test]
    fn test_build_args() {
        let spec = WriterSpec {
            path: PathBuf::from("/tmp/clip.mp4"),
            codec: "mpeg4".to_string(),
            fps: 12.0,
            width: 640,
            height: 480,
        };
        let args = build_args(&spec);
        let joined = args.join(" ");
        assert!(joined.contains("-s 640x480"));
        assert!(joined.contains("-r 12"));
        assert!(joined.contains("-c:v mpeg4"));
        assert_eq!(args.last().unwrap(), "/tmp/clip.mp4");
    }

    #[test]
    fn test_missing_binary_fails_open() {
        let factory = FfmpegWriterFactory::new("/nonexistent/ffmpeg-binary");
        let spec = WriterSpec {
            path: PathBuf::from("/tmp/never.mp4"),
            codec: "mpeg4".to_string(),
            fps: 12.0,
            width: 2,
            height: 2,
        };
        assert!(matches!(
            factory.open(&spec),
            Err(RecorderError::WriterOpen { .. })
        ));
    }
}
