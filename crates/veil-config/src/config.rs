//! Top-level configuration with RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::settings::VolumetricSettings;

/// Top-level configuration for a host embedding the feature.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Volumetric lighting tuning.
    pub volumetrics: VolumetricSettings,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Freeze the noise offset for frame-to-frame comparison captures.
    pub freeze_noise: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            freeze_noise: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("veil.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.volumetrics.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `veil.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("veil.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    ///
    /// Reloaded volumetric settings are clamped rather than rejected, so a
    /// hand-edited file with a wild value degrades to the nearest legal one.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("veil.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let mut new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.volumetrics = new_config.volumetrics.clamped();

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_ron() {
        let config = Config::default();
        let text = ron::ser::to_string(&config).unwrap();
        let parsed: Config = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("veil.ron").exists());
    }

    #[test]
    fn test_save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            volumetrics: VolumetricSettings {
                pixel_samples: 64,
                texture_downscale: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        config.save(dir.path()).unwrap();

        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(loaded.volumetrics.pixel_samples, 64);
        assert_eq!(loaded.volumetrics.texture_downscale, 4);
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();

        // Unchanged file reports no changes.
        assert!(config.reload(dir.path()).unwrap().is_none());

        let mut edited = config.clone();
        edited.volumetrics.scattering = 0.5;
        edited.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap().unwrap();
        assert!((reloaded.volumetrics.scattering - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reload_clamps_wild_values() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();

        let mut edited = config.clone();
        edited.volumetrics.texture_downscale = 40;
        edited.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap().unwrap();
        assert_eq!(reloaded.volumetrics.texture_downscale, 5);
    }

    #[test]
    fn test_partial_file_parses_with_defaults() {
        // Missing fields fall back through #[serde(default)].
        let partial = "(volumetrics: (pixel_samples: 8))";
        let parsed: Config = ron::from_str(partial).unwrap();
        assert_eq!(parsed.volumetrics.pixel_samples, 8);
        assert_eq!(parsed.debug, DebugConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("veil.ron"),
            "(volumetrics: (texture_downscale: 0))",
        )
        .unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::OutOfRange { .. })
        ));
    }
}
