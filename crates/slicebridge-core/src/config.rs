use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Environment variable that overrides the configured engine path.
pub const ENGINE_ENV: &str = "SLICEBRIDGE_ENGINE";

/// Environment variable holding the tracing filter for the binaries.
pub const LOG_ENV: &str = "SLICEBRIDGE_LOG";

const APP_DIR: &str = "slicebridge";
const CONFIG_FILE: &str = "config.toml";

/// User configuration, stored as TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicerConfig {
    /// Path to the engine executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<PathBuf>,
    /// Command-line dialect; detected from `--help` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles_dir: Option<PathBuf>,
    pub debug_logging: bool,
}

impl SlicerConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.engine = config.engine.map(|p| expand_home(&p));
        config.default_profile = config.default_profile.map(|p| expand_home(&p));
        config.profiles_dir = config.profiles_dir.map(|p| expand_home(&p));
        Ok(config)
    }

    /// Load from the default location, then apply `SLICEBRIDGE_ENGINE`.
    pub fn load_default() -> Result<Self, CoreError> {
        let config = Self::load(&default_config_path()?)?;
        Ok(config.with_engine_override(std::env::var(ENGINE_ENV).ok()))
    }

    /// Replace the engine path when `engine` is non-empty.
    #[must_use]
    pub fn with_engine_override(mut self, engine: Option<String>) -> Self {
        if let Some(engine) = engine.filter(|e| !e.trim().is_empty()) {
            self.engine = Some(expand_home(Path::new(engine.trim())));
        }
        self
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("cannot serialize config: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }

    /// Configured profile directory, else `$XDG_DATA_HOME/slicebridge/profiles`.
    pub fn profiles_dir(&self) -> Result<PathBuf, CoreError> {
        if let Some(dir) = &self.profiles_dir {
            return Ok(dir.clone());
        }
        Ok(data_home()?.join(APP_DIR).join("profiles"))
    }
}

fn home_dir() -> Result<PathBuf, CoreError> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| CoreError::Config("HOME not set".to_owned()))
}

fn xdg_dir(var: &str, fallback: &str) -> Result<PathBuf, CoreError> {
    match std::env::var_os(var).filter(|v| !v.is_empty()) {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(home_dir()?.join(fallback)),
    }
}

fn data_home() -> Result<PathBuf, CoreError> {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// `$XDG_CONFIG_HOME/slicebridge/config.toml`, else under `~/.config`.
pub fn default_config_path() -> Result<PathBuf, CoreError> {
    Ok(xdg_dir("XDG_CONFIG_HOME", ".config")?
        .join(APP_DIR)
        .join(CONFIG_FILE))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match home_dir() {
            Ok(home) => home.join(rest),
            Err(_) => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = SlicerConfig {
            engine: Some(PathBuf::from("/usr/bin/slic3r")),
            dialect: Some("prusa".to_owned()),
            default_profile: None,
            profiles_dir: Some(dir.path().join("profiles")),
            debug_logging: true,
        };
        config.save(&path).unwrap();

        let loaded = SlicerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SlicerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SlicerConfig::default());
        assert!(config.engine.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "engine = \"/opt/slic3r/slic3r\"\n").unwrap();
        let config = SlicerConfig::load(&path).unwrap();
        assert_eq!(config.engine, Some(PathBuf::from("/opt/slic3r/slic3r")));
        assert!(!config.debug_logging);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "engine = [1, \n").unwrap();
        let err = SlicerConfig::load(&path).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn engine_override_replaces_configured_path() {
        let config = SlicerConfig {
            engine: Some(PathBuf::from("/usr/bin/slic3r")),
            ..SlicerConfig::default()
        };
        let config = config.with_engine_override(Some("/opt/prusa/prusa-slicer".to_owned()));
        assert_eq!(config.engine, Some(PathBuf::from("/opt/prusa/prusa-slicer")));

        let config = config.with_engine_override(Some("  ".to_owned()));
        assert_eq!(config.engine, Some(PathBuf::from("/opt/prusa/prusa-slicer")));
    }

    #[test]
    fn explicit_profiles_dir_wins() {
        let config = SlicerConfig {
            profiles_dir: Some(PathBuf::from("/srv/profiles")),
            ..SlicerConfig::default()
        };
        assert_eq!(config.profiles_dir().unwrap(), PathBuf::from("/srv/profiles"));
    }
}
