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

// Shared test doubles for the recorder integration tests

#![allow(dead_code)]

use motion_clip_recorder::error::{RecorderError, Result};
use motion_clip_recorder::recorder::{ClipRecorder, ClipSettings};
use motion_clip_recorder::video::{VideoWriter, WriterFactory, WriterSpec};
use motion_clip_recorder::Frame;
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Base timestamp so generated clip names are realistic
pub const BASE_TS: f64 = 1_700_000_000.0;

/// 2x2 frame whose first byte identifies it
pub fn tagged_frame(tag: u8) -> Frame {
    Frame::filled(2, 2, [tag, 0, 0])
}

#[derive(Default)]
pub struct Journal {
    pub opens: Vec<WriterSpec>,
    pub frames: Vec<(PathBuf, u8)>,
    pub releases: Vec<PathBuf>,
}

/// Writer factory that writes raw frame bytes to the clip file and keeps a
/// journal of every call
#[derive(Clone, Default)]
pub struct RecordingWriterFactory {
    journal: Arc<Mutex<Journal>>,
    failing_codecs: Arc<Mutex<HashSet<String>>>,
    fail_writes: Arc<AtomicBool>,
    fail_release: Arc<AtomicBool>,
}

impl RecordingWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_codec(&self, codec: &str) {
        self.failing_codecs.lock().unwrap().insert(codec.to_string());
    }

    pub fn allow_all_codecs(&self) {
        self.failing_codecs.lock().unwrap().clear();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> Vec<WriterSpec> {
        self.journal.lock().unwrap().opens.clone()
    }

    pub fn releases(&self) -> Vec<PathBuf> {
        self.journal.lock().unwrap().releases.clone()
    }

    /// Tags of the frames written to `path`, in order
    pub fn frames_for(&self, path: &Path) -> Vec<u8> {
        self.journal
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, tag)| *tag)
            .collect()
    }
}

impl WriterFactory for RecordingWriterFactory {
    fn open(&self, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>> {
        self.journal.lock().unwrap().opens.push(spec.clone());

        if self.failing_codecs.lock().unwrap().contains(&spec.codec) {
            return Err(RecorderError::WriterOpen {
                path: spec.path.clone(),
                codec: spec.codec.clone(),
                reason: "codec unsupported".to_string(),
            });
        }

        let file = File::create(&spec.path)?;
        Ok(Box::new(RecordingWriter {
            file,
            path: spec.path.clone(),
            journal: self.journal.clone(),
            fail_writes: self.fail_writes.clone(),
            fail_release: self.fail_release.clone(),
        }))
    }

    fn factory_type(&self) -> &str {
        "recording"
    }
}

struct RecordingWriter {
    file: File,
    path: PathBuf,
    journal: Arc<Mutex<Journal>>,
    fail_writes: Arc<AtomicBool>,
    fail_release: Arc<AtomicBool>,
}

impl VideoWriter for RecordingWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RecorderError::Write("disk full".to_string()));
        }
        self.file.write_all(frame.data())?;
        self.journal
            .lock()
            .unwrap()
            .frames
            .push((self.path.clone(), frame.data()[0]));
        Ok(())
    }

    fn release(mut self: Box<Self>) -> Result<()> {
        self.journal.lock().unwrap().releases.push(self.path.clone());
        self.file.flush()?;
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(RecorderError::Close("trailer write failed".to_string()));
        }
        Ok(())
    }
}

/// Settings with quota disabled and clips under `dir`
pub fn test_settings(dir: &Path) -> ClipSettings {
    ClipSettings {
        pre_roll_seconds: 3.0,
        post_roll_seconds: 5.0,
        quiet_gap_seconds: 2.0,
        max_clip_seconds: 60.0,
        quota_bytes: 0,
        clip_dir: dir.to_path_buf(),
        ..ClipSettings::default()
    }
}

pub fn recorder_with(settings: ClipSettings) -> (ClipRecorder, RecordingWriterFactory) {
    let factory = RecordingWriterFactory::new();
    let recorder = ClipRecorder::new(settings, Arc::new(factory.clone())).unwrap();
    (recorder, factory)
}
