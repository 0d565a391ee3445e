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

// Recorder loop tests with scripted frame sources and detectors

mod common;

use async_trait::async_trait;
use common::{recorder_with, tagged_frame, test_settings, RecordingWriterFactory, BASE_TS};
use motion_clip_recorder::control::{ArmState, CommandQueue, MemoryCommandQueue};
use motion_clip_recorder::error::{RecorderError, Result};
use motion_clip_recorder::motion::MotionDetector;
use motion_clip_recorder::protocol::{ClipReason, Command};
use motion_clip_recorder::runner::{Runner, StepOutcome};
use motion_clip_recorder::source::FrameSource;
use motion_clip_recorder::upload::ClipSink;
use motion_clip_recorder::Frame;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Replays a fixed script of fetch results
struct ScriptedSource {
    script: VecDeque<Result<Frame>>,
    recoveries: Arc<AtomicU32>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn fetch_frame(&mut self) -> Result<Frame> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(RecorderError::Source("script exhausted".to_string())))
    }

    async fn recover(&mut self) -> Result<()> {
        self.recoveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Reports motion for frames whose tag is in the set
struct TagDetector {
    motion_tags: HashSet<u8>,
    calls: Arc<AtomicU32>,
}

impl TagDetector {
    fn new(tags: &[u8]) -> Self {
        Self {
            motion_tags: tags.iter().copied().collect(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl MotionDetector for TagDetector {
    fn detect(&mut self, frame: &Frame) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.motion_tags.contains(&frame.data()[0])
    }
}

#[derive(Default)]
struct CollectingSink {
    uploaded: Mutex<Vec<(PathBuf, HashMap<String, String>)>>,
}

#[async_trait]
impl ClipSink for CollectingSink {
    async fn upload(&self, path: &Path, labels: &HashMap<String, String>) -> Result<()> {
        self.uploaded
            .lock()
            .unwrap()
            .push((path.to_path_buf(), labels.clone()));
        Ok(())
    }

    fn sink_type(&self) -> &str {
        "collecting"
    }
}

fn idle_source() -> Box<dyn FrameSource> {
    Box::new(ScriptedSource {
        script: VecDeque::new(),
        recoveries: Arc::new(AtomicU32::new(0)),
    })
}

fn runner_with(
    dir: &TempDir,
    detector: TagDetector,
    armed: bool,
) -> (Runner, Arc<MemoryCommandQueue>, RecordingWriterFactory) {
    let (recorder, factory) = recorder_with(test_settings(dir.path()));
    let commands = Arc::new(MemoryCommandQueue::new());
    let runner = Runner::new(
        idle_source(),
        Box::new(detector),
        commands.clone(),
        ArmState::new(armed),
        recorder,
    );
    (runner, commands, factory)
}

#[test]
fn test_single_motion_burst_produces_one_clip() {
    let dir = TempDir::new().unwrap();
    let (mut runner, _commands, factory) = runner_with(&dir, TagDetector::new(&[0]), true);

    let mut closed = Vec::new();
    for t in 0..=20u8 {
        if let Some(path) = runner.process_frame(BASE_TS + t as f64, &tagged_frame(t)) {
            closed.push((t, path));
        }
    }

    // Opens at t=0; post-roll holds it to t=5 and the quiet gap has elapsed
    assert_eq!(closed.len(), 1);
    let (closed_at, path) = &closed[0];
    assert_eq!(*closed_at, 5);
    assert_eq!(factory.frames_for(path), vec![0, 1, 2, 3, 4, 5]);
    assert!(!runner.recorder().is_recording());
}

#[test]
fn test_motion_ignored_while_disarmed() {
    let dir = TempDir::new().unwrap();
    let detector = TagDetector::new(&[1, 2, 3]);
    let calls = detector.calls.clone();
    let (mut runner, _commands, factory) = runner_with(&dir, detector, false);

    for t in 0..10u8 {
        assert_eq!(runner.process_frame(BASE_TS + t as f64, &tagged_frame(t)), None);
    }

    assert!(factory.opens().is_empty());
    // Detector still sees every frame
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[test]
fn test_arm_and_disarm_commands() {
    let dir = TempDir::new().unwrap();
    let (mut runner, commands, factory) = runner_with(&dir, TagDetector::new(&[2, 20]), false);

    runner.process_frame(BASE_TS, &tagged_frame(0));
    commands.push(Command::Arm).unwrap();
    runner.process_frame(BASE_TS + 1.0, &tagged_frame(1));
    assert!(runner.armed().is_armed());

    runner.process_frame(BASE_TS + 2.0, &tagged_frame(2));
    assert!(runner.recorder().is_recording());

    commands.push(Command::Disarm).unwrap();
    for t in 3..=20u8 {
        runner.process_frame(BASE_TS + t as f64, &tagged_frame(t));
    }
    assert!(!runner.armed().is_armed());
    // Motion at t=20 arrived while disarmed
    assert_eq!(factory.opens().len(), 1);
    assert!(!runner.recorder().is_recording());
}

#[test]
fn test_force_clip_command_while_disarmed() {
    let dir = TempDir::new().unwrap();
    let (mut runner, commands, factory) = runner_with(&dir, TagDetector::new(&[]), false);

    for t in 0..3u8 {
        runner.process_frame(BASE_TS + t as f64, &tagged_frame(t));
    }
    commands.push(Command::force_clip(4.0)).unwrap();
    runner.process_frame(BASE_TS + 3.0, &tagged_frame(3));

    let session = runner.recorder().session().expect("manual clip open");
    assert_eq!(session.reason(), ClipReason::Manual);
    // post-roll of 5 outlasts the requested 4
    assert_eq!(session.extend_until(), BASE_TS + 8.0);
    let path = session.output_path().to_path_buf();

    let mut closed = None;
    for t in 4..=12u8 {
        if let Some(p) = runner.process_frame(BASE_TS + t as f64, &tagged_frame(t)) {
            closed = Some((t, p));
            break;
        }
    }
    assert_eq!(closed, Some((8, path.clone())));
    // Pre-roll covers t=0..=3, then live frames through t=8
    assert_eq!(factory.frames_for(&path), vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_commands_applied_once() {
    let dir = TempDir::new().unwrap();
    let (mut runner, commands, factory) = runner_with(&dir, TagDetector::new(&[]), false);

    commands.push(Command::force_clip(1.0)).unwrap();
    runner.process_frame(BASE_TS, &tagged_frame(0));
    assert!(commands.is_empty());

    runner.process_frame(BASE_TS + 30.0, &tagged_frame(1));
    runner.process_frame(BASE_TS + 31.0, &tagged_frame(2));
    assert_eq!(factory.opens().len(), 1);
}

#[tokio::test]
async fn test_step_backs_off_then_recovers() {
    let dir = TempDir::new().unwrap();
    let (recorder, _factory) = recorder_with(test_settings(dir.path()));
    let recoveries = Arc::new(AtomicU32::new(0));
    let source = ScriptedSource {
        script: VecDeque::from(vec![
            Err(RecorderError::Source("timeout".to_string())),
            Err(RecorderError::Source("timeout".to_string())),
            Err(RecorderError::Source("timeout".to_string())),
            Ok(tagged_frame(1)),
        ]),
        recoveries: recoveries.clone(),
    };

    let mut runner = Runner::new(
        Box::new(source),
        Box::new(TagDetector::new(&[])),
        Arc::new(MemoryCommandQueue::new()),
        ArmState::new(true),
        recorder,
    )
    .with_failures_before_recover(3);

    assert_eq!(runner.step().await, StepOutcome::FetchFailed { consecutive: 1 });
    assert_eq!(runner.step().await, StepOutcome::FetchFailed { consecutive: 2 });
    assert_eq!(runner.step().await, StepOutcome::Recovered);
    assert_eq!(recoveries.load(Ordering::SeqCst), 1);

    assert_eq!(runner.step().await, StepOutcome::Frame(None));
    assert_eq!(runner.recorder().buffer().len(), 1);
}

#[tokio::test]
async fn test_shutdown_uploads_open_clip() {
    let dir = TempDir::new().unwrap();
    let (recorder, _factory) = recorder_with(test_settings(dir.path()));
    let sink = Arc::new(CollectingSink::default());
    let commands = Arc::new(MemoryCommandQueue::new());

    let mut runner = Runner::new(
        idle_source(),
        Box::new(TagDetector::new(&[])),
        commands.clone(),
        ArmState::new(false),
        recorder,
    )
    .with_sink(sink.clone(), 0);

    commands.push(Command::force_clip(30.0)).unwrap();
    runner.process_frame(BASE_TS, &tagged_frame(0));
    assert!(runner.recorder().is_recording());

    runner.shutdown().await;

    assert!(!runner.recorder().is_recording());
    let uploaded = sink.uploaded.lock().unwrap();
    assert_eq!(uploaded.len(), 1);
    let (path, labels) = &uploaded[0];
    assert!(path.exists());
    assert_eq!(labels["reason"], "manual");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_step_on_multi_thread_runtime() {
    let dir = TempDir::new().unwrap();
    let (recorder, factory) = recorder_with(test_settings(dir.path()));
    let commands = Arc::new(MemoryCommandQueue::new());
    let source = ScriptedSource {
        script: VecDeque::from(vec![Ok(tagged_frame(1))]),
        recoveries: Arc::new(AtomicU32::new(0)),
    };

    let mut runner = Runner::new(
        Box::new(source),
        Box::new(TagDetector::new(&[])),
        commands.clone(),
        ArmState::new(false),
        recorder,
    );

    commands.push(Command::force_clip(5.0)).unwrap();
    assert_eq!(runner.step().await, StepOutcome::Frame(None));
    assert!(runner.recorder().is_recording());

    runner.shutdown().await;
    assert_eq!(factory.releases().len(), 1);
}
