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

// Configuration module for the motion clip recorder
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
    let mut config = load_config(path)?;

    // Allow environment variables to override config values
    if let Ok(url) = std::env::var("SNAPSHOT_URL") {
        config.camera.snapshot_url = url;
    }

    if let Ok(clip_dir) = std::env::var("CLIP_DIR") {
        config.clips.clip_dir = clip_dir;
    }

    if let Ok(upload_url) = std::env::var("UPLOAD_URL") {
        config.upload.url = Some(upload_url);
    }

    if let Ok(armed) = std::env::var("ARMED_ON_BOOT") {
        config.commands.armed_on_boot = parse_bool(&armed);
    }

    ConfigLoader::validate(&config).context("Invalid configuration after environment overrides")?;

    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}
