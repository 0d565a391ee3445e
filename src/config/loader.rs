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

// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<RecorderConfig> {
        // Substitute environment variables
        let content = Self::substitute_env_vars(content);

        // Parse YAML
        let config: RecorderConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        // Validate configuration
        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${CLIP_DIR:-clips} -> clips (if CLIP_DIR not set)
    fn substitute_env_vars(content: &str) -> String {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static pattern is valid")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        // Keep original if no default and var not found
                        format!("${{{}}}", var_name)
                    }
                }
            }
        })
        .to_string()
    }

    /// Validate configuration
    pub(crate) fn validate(config: &RecorderConfig) -> Result<()> {
        // Camera
        let url = config.camera.snapshot_url.trim();
        if url.is_empty() {
            bail!("camera.snapshot_url cannot be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("camera.snapshot_url must be an http(s) URL, got '{}'", url);
        }
        if config.camera.request_timeout_seconds == 0 {
            bail!("camera.request_timeout_seconds must be > 0");
        }
        if config.camera.failures_before_recover == 0 {
            bail!("camera.failures_before_recover must be > 0");
        }

        // Motion
        let fraction = config.motion.min_changed_fraction;
        if !(fraction.is_finite() && (0.0..=1.0).contains(&fraction)) {
            bail!("motion.min_changed_fraction must be between 0 and 1");
        }

        // Clip timing
        let clips = &config.clips;
        for (name, value) in [
            ("pre_roll_seconds", clips.pre_roll_seconds),
            ("post_roll_seconds", clips.post_roll_seconds),
            ("quiet_gap_seconds", clips.quiet_gap_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("clips.{} must be a non-negative number", name);
            }
        }
        if !clips.max_clip_seconds.is_finite() || clips.max_clip_seconds < 1.0 {
            bail!("clips.max_clip_seconds must be >= 1");
        }
        if let crate::video::FrameRate::Fixed(fps) = clips.fps {
            if !fps.is_finite() || fps <= 0.0 {
                bail!("clips.fps must be > 0 or \"auto\"");
            }
        }
        if clips.codec.trim().is_empty() {
            bail!("clips.codec cannot be empty");
        }
        if clips.fallback_codec.trim().is_empty() {
            bail!("clips.fallback_codec cannot be empty");
        }
        if clips.clip_dir.trim().is_empty() {
            bail!("clips.clip_dir cannot be empty");
        }

        // Command queue
        match config.commands.backend.as_str() {
            "memory" => {}
            "file" => {
                if config.commands.file_path.trim().is_empty() {
                    bail!("file command backend selected but commands.file_path is empty");
                }
            }
            unknown => bail!(
                "Unknown command backend: '{}'. Supported: file, memory",
                unknown
            ),
        }

        // Upload
        match config.upload.backend.as_str() {
            "none" | "log" => {}
            "http" => {
                if config.upload.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    bail!("http upload backend selected but upload.url missing");
                }
            }
            unknown => bail!(
                "Unknown upload backend: '{}'. Supported: none, log, http",
                unknown
            ),
        }

        // Logging
        if !matches!(config.logging.format.as_str(), "text" | "json") {
            bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MCR_TEST_VAR", "test_value");

        let input = "url: ${MCR_TEST_VAR}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "url: test_value");

        std::env::remove_var("MCR_TEST_VAR");
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::remove_var("MCR_TEST_VAR2");

        let input = "clip_dir: ${MCR_TEST_VAR2:-/var/clips}";
        let output = ConfigLoader::substitute_env_vars(input);
        assert_eq!(output, "clip_dir: /var/clips");
    }

    #[test]
    fn test_unset_var_without_default_kept() {
        std::env::remove_var("MCR_TEST_VAR3");
        let output = ConfigLoader::substitute_env_vars("token: ${MCR_TEST_VAR3}");
        assert_eq!(output, "token: ${MCR_TEST_VAR3}");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigLoader::validate(&RecorderConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_negative_pre_roll() {
        let mut config = RecorderConfig::default();
        config.clips.pre_roll_seconds = -1.0;

        let result = ConfigLoader::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("pre_roll_seconds"));
    }

    #[test]
    fn test_validation_max_clip_too_small() {
        let mut config = RecorderConfig::default();
        config.clips.max_clip_seconds = 0.5;

        let result = ConfigLoader::validate(&config);
        assert!(result.unwrap_err().to_string().contains("max_clip_seconds"));
    }

    #[test]
    fn test_validation_http_upload_requires_url() {
        let mut config = RecorderConfig::default();
        config.upload.backend = "http".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.unwrap_err().to_string().contains("upload.url"));
    }

    #[test]
    fn test_validation_unknown_command_backend() {
        let mut config = RecorderConfig::default();
        config.commands.backend = "redis".to_string();

        let result = ConfigLoader::validate(&config);
        assert!(result.unwrap_err().to_string().contains("Unknown command backend"));
    }
}
