// SPDX-License-Identifier: MPL-2.0-only

use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const NAME: &str = "cosmic-anim";
pub const CONFIG_FILE: &str = "config.ron";

/// Smallest command queue the player accepts.
pub const MIN_COMMAND_CAPACITY: usize = 4;

/// Playback settings for animated sources.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Setters)]
#[serde(deny_unknown_fields, default)]
#[must_use]
pub struct PlayerConfig {
    /// start playing as soon as the player is constructed
    pub autoplay: bool,
    /// lower bound for a frame's display duration, in milliseconds
    pub min_frame_duration_ms: u64,
    /// duration used for frames that declare no delay, in milliseconds
    pub default_frame_duration_ms: u64,
    /// number of control commands that may be queued for the decode worker
    pub command_capacity: usize,
    /// stop after the loop count stored in the animation instead of looping forever
    pub honor_loop_count: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay: true,
            min_frame_duration_ms: 20,
            default_frame_duration_ms: 100,
            command_capacity: 32,
            honor_loop_count: false,
        }
    }
}

impl PlayerConfig {
    /// Fallback in case the config file can't be loaded
    pub fn fallback() -> Self {
        Self::default()
    }

    /// Location of the config file under the user's config directory.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(NAME).join(CONFIG_FILE))
    }

    /// Load the user's config, or defaults when no config file exists.
    ///
    /// # Errors
    ///
    /// Fails if the config file exists but cannot be read or parsed.
    pub fn load() -> eyre::Result<Self> {
        match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load a config from a RON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not contain a valid config.
    pub fn load_from(path: &Path) -> eyre::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|why| eyre::eyre!("failed to read {}: {why}", path.display()))?;
        let config: Self = ron::de::from_str(&contents)
            .map_err(|why| eyre::eyre!("invalid config {}: {why}", path.display()))?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Write this config as RON, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> eyre::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, contents)?;
        Ok(())
    }

    #[must_use]
    pub fn min_frame_duration(&self) -> Duration {
        Duration::from_millis(self.min_frame_duration_ms)
    }

    #[must_use]
    pub fn default_frame_duration(&self) -> Duration {
        Duration::from_millis(self.default_frame_duration_ms.max(self.min_frame_duration_ms))
    }

    /// Command queue bound, never below [`MIN_COMMAND_CAPACITY`].
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.command_capacity.max(MIN_COMMAND_CAPACITY)
    }
}
