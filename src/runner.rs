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

// Per-frame recorder loop
//
// One iteration: fetch a frame, feed the engine, drain commands, run the
// motion detector, tick. Finished clips go to the sink in the background.

use crate::control::{ArmState, CommandQueue};
use crate::frame::Frame;
use crate::motion::MotionDetector;
use crate::protocol::Command;
use crate::recorder::ClipRecorder;
use crate::source::FrameSource;
use crate::upload::{dispatch, ClipSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const RETRY_DELAY: Duration = Duration::from_millis(200);
const RECOVER_DELAY: Duration = Duration::from_millis(500);

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A frame was processed; carries the path of a clip closed on this step
    Frame(Option<PathBuf>),
    /// Fetching failed; the loop backed off
    FetchFailed { consecutive: u32 },
    /// Fetching failed often enough that the source was asked to recover
    Recovered,
}

pub struct Runner {
    source: Box<dyn FrameSource>,
    detector: Box<dyn MotionDetector>,
    commands: Arc<dyn CommandQueue>,
    armed: ArmState,
    recorder: ClipRecorder,
    sink: Option<Arc<dyn ClipSink>>,
    upload_retries: u32,
    failures_before_recover: u32,
    consecutive_failures: u32,
    uploads: Vec<JoinHandle<()>>,
}

impl Runner {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn MotionDetector>,
        commands: Arc<dyn CommandQueue>,
        armed: ArmState,
        recorder: ClipRecorder,
    ) -> Self {
        Self {
            source,
            detector,
            commands,
            armed,
            recorder,
            sink: None,
            upload_retries: 3,
            failures_before_recover: 3,
            consecutive_failures: 0,
            uploads: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ClipSink>, max_retries: u32) -> Self {
        self.sink = Some(sink);
        self.upload_retries = max_retries;
        self
    }

    pub fn with_failures_before_recover(mut self, failures: u32) -> Self {
        self.failures_before_recover = failures.max(1);
        self
    }

    pub fn recorder(&self) -> &ClipRecorder {
        &self.recorder
    }

    pub fn armed(&self) -> &ArmState {
        &self.armed
    }

    /// Run until the task is cancelled
    pub async fn run(&mut self) {
        info!(
            "Recorder loop started: source={}, commands={}, armed={}",
            self.source.describe(),
            self.commands.queue_type(),
            self.armed.is_armed()
        );
        loop {
            self.step().await;
        }
    }

    /// Fetch one frame and process it, backing off on failure
    pub async fn step(&mut self) -> StepOutcome {
        let frame = match self.source.fetch_frame().await {
            Ok(frame) => frame,
            Err(e) => return self.handle_fetch_failure(e).await,
        };
        self.consecutive_failures = 0;

        // Writer and quota I/O is blocking; keep it off the other tasks' workers
        let ts = now_seconds();
        let closed = match Handle::current().runtime_flavor() {
            RuntimeFlavor::CurrentThread => self.process_frame(ts, &frame),
            _ => tokio::task::block_in_place(|| self.process_frame(ts, &frame)),
        };
        if let Some(path) = &closed {
            self.hand_off(path.clone());
        }
        StepOutcome::Frame(closed)
    }

    async fn handle_fetch_failure(&mut self, error: crate::error::RecorderError) -> StepOutcome {
        self.consecutive_failures += 1;
        debug!(
            "Frame fetch failed ({} in a row): {}",
            self.consecutive_failures, error
        );

        if self.consecutive_failures >= self.failures_before_recover {
            warn!(
                "{} consecutive fetch failures from {}; recovering",
                self.consecutive_failures,
                self.source.describe()
            );
            if let Err(e) = self.source.recover().await {
                warn!("Source recovery failed: {}", e);
            }
            self.consecutive_failures = 0;
            tokio::time::sleep(RECOVER_DELAY).await;
            StepOutcome::Recovered
        } else {
            let consecutive = self.consecutive_failures;
            tokio::time::sleep(RETRY_DELAY).await;
            StepOutcome::FetchFailed { consecutive }
        }
    }

    /// Feed one frame through the engine: frame, commands, motion, tick.
    pub fn process_frame(&mut self, ts: f64, frame: &Frame) -> Option<PathBuf> {
        self.recorder.notify_frame(ts, frame);

        match self.commands.drain() {
            Ok(commands) => {
                for command in commands {
                    self.apply_command(ts, frame, command);
                }
            }
            Err(e) => warn!("Failed to drain {} command queue: {}", self.commands.queue_type(), e),
        }

        // The detector runs on every frame to keep its reference current
        let motion = self.detector.detect(frame);
        if motion && self.armed.is_armed() {
            self.recorder.notify_motion(ts, frame);
        }

        self.recorder.tick(ts)
    }

    fn apply_command(&mut self, ts: f64, frame: &Frame, command: Command) {
        match command {
            Command::ForceClip {
                duration_seconds, ..
            } => self.recorder.force_clip(ts, frame, duration_seconds),
            Command::Arm => self.armed.set(true),
            Command::Disarm => self.armed.set(false),
        }
    }

    fn hand_off(&mut self, path: PathBuf) {
        self.uploads.retain(|handle| !handle.is_finished());
        match &self.sink {
            Some(sink) => {
                let handle = dispatch(sink.clone(), path, self.upload_retries);
                self.uploads.push(handle);
            }
            None => info!("Clip finished: {}", path.display()),
        }
    }

    /// Close any open clip, hand it off, and wait for pending uploads
    pub async fn shutdown(&mut self) {
        let closed = match Handle::current().runtime_flavor() {
            RuntimeFlavor::CurrentThread => self.recorder.shutdown(now_seconds()),
            _ => tokio::task::block_in_place(|| self.recorder.shutdown(now_seconds())),
        };
        if let Some(path) = closed {
            self.hand_off(path);
        }
        for handle in self.uploads.drain(..) {
            let _ = handle.await;
        }
    }
}

/// Wall-clock seconds since the Unix epoch
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
