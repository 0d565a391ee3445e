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

use crate::frame::Frame;
use std::collections::VecDeque;
use tracing::trace;

/// Time-windowed buffer of recent frames used as clip pre-roll.
///
/// Entries are kept in insertion order and evicted from the oldest end once
/// they fall more than `window_seconds` behind the newest pushed timestamp.
/// The buffer is bounded by time only; a burst of frames inside the window
/// grows it without limit.
pub struct PrerollBuffer {
    window_seconds: f64,
    frames: VecDeque<(f64, Frame)>,
    newest_ts: Option<f64>,
}

impl PrerollBuffer {
    pub fn new(window_seconds: f64) -> Self {
        let window_seconds = if window_seconds.is_finite() {
            window_seconds.max(0.0)
        } else {
            0.0
        };
        Self {
            window_seconds,
            frames: VecDeque::new(),
            newest_ts: None,
        }
    }

    /// Store a copy of `frame` and evict everything older than `ts - window`.
    pub fn push(&mut self, ts: f64, frame: &Frame) {
        // A zero window keeps nothing
        if self.window_seconds <= 0.0 {
            self.frames.clear();
            return;
        }

        let went_backwards = self.newest_ts.is_some_and(|newest| ts < newest);
        self.frames.push_back((ts, frame.clone()));
        self.newest_ts = Some(ts);
        self.trim(ts, went_backwards);
    }

    fn trim(&mut self, now_ts: f64, went_backwards: bool) {
        let limit = now_ts - self.window_seconds;
        while self.frames.front().is_some_and(|(ts, _)| *ts < limit) {
            self.frames.pop_front();
        }
        // Out-of-order input can leave stale entries behind a fresh front
        if went_backwards {
            self.frames.retain(|(ts, _)| *ts >= limit);
        }
        trace!(
            "Pre-roll buffer holds {} frames (limit {:.3})",
            self.frames.len(),
            limit
        );
    }

    /// All buffered entries with a timestamp at or after `ts_from`, oldest first.
    pub fn get_since(&self, ts_from: f64) -> Vec<(f64, Frame)> {
        let mut entries: Vec<(f64, Frame)> = self
            .frames
            .iter()
            .filter(|(ts, _)| *ts >= ts_from)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        entries
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn oldest_ts(&self) -> Option<f64> {
        self.frames.front().map(|(ts, _)| *ts)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.newest_ts = None;
    }
}
