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

// Frame-difference motion detection

use crate::config::MotionConfig;
use crate::frame::Frame;
use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::{debug, trace};

/// Decides whether a frame shows motion.
///
/// The engine only consumes the boolean; how it is computed is up to the
/// implementation.
pub trait MotionDetector: Send {
    fn detect(&mut self, frame: &Frame) -> bool;
}

/// Compares each frame with the previous one in downscaled grayscale and
/// reports motion when enough pixels changed.
pub struct FrameDiffDetector {
    proc_width: u32,
    pixel_threshold: u8,
    min_changed_fraction: f64,
    previous: Option<GrayImage>,
}

impl FrameDiffDetector {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            proc_width: config.proc_width,
            pixel_threshold: config.pixel_threshold,
            min_changed_fraction: config.min_changed_fraction,
            previous: None,
        }
    }

    fn preprocess(&self, frame: &Frame) -> Option<GrayImage> {
        let rgb = frame.to_rgb_image()?;
        let (width, height) = rgb.dimensions();
        let rgb = if self.proc_width > 0 && self.proc_width < width {
            let ratio = self.proc_width as f64 / width as f64;
            let scaled_height = ((height as f64 * ratio) as u32).max(1);
            imageops::resize(&rgb, self.proc_width, scaled_height, FilterType::Triangle)
        } else {
            rgb
        };
        Some(imageops::grayscale(&rgb))
    }

    /// Fraction of pixels whose difference exceeds the threshold.
    pub fn changed_fraction(&self, previous: &GrayImage, current: &GrayImage) -> f64 {
        let total = current.as_raw().len();
        if total == 0 {
            return 0.0;
        }
        let changed = previous
            .as_raw()
            .iter()
            .zip(current.as_raw())
            .filter(|(a, b)| a.abs_diff(**b) > self.pixel_threshold)
            .count();
        changed as f64 / total as f64
    }
}

impl MotionDetector for FrameDiffDetector {
    fn detect(&mut self, frame: &Frame) -> bool {
        let Some(gray) = self.preprocess(frame) else {
            return false;
        };

        let motion = match &self.previous {
            Some(previous) if previous.dimensions() == gray.dimensions() => {
                let fraction = self.changed_fraction(previous, &gray);
                trace!("Changed pixel fraction {:.4}", fraction);
                fraction >= self.min_changed_fraction && fraction > 0.0
            }
            Some(_) => {
                debug!("Frame size changed, resetting motion reference");
                false
            }
            None => false,
        };

        self.previous = Some(gray);
        motion
    }
}
