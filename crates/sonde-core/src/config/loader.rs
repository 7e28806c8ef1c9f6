//! Configuration file discovery and loading

use super::sonde_config::SondeConfig;
use crate::error::SondeError;
use crate::result::Result;
use std::path::{Path, PathBuf};

/// Config file names, in priority order
pub const CONFIG_FILE_NAMES: &[&str] = &[
    ".sonderc.json",
    ".sonderc.toml",
    "sonde.yaml",
    "sonde.yml",
    "sonde.json",
];

/// Configuration loader for discovering and loading config files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Auto-discover a config file by traversing upward from `start_path`
    ///
    /// Each directory is searched for [`CONFIG_FILE_NAMES`] in order, moving
    /// up until a config is found or the filesystem root is reached.
    pub fn auto_discover(start_path: &Path) -> Result<Option<PathBuf>> {
        let mut current = start_path
            .canonicalize()
            .map_err(|e| SondeError::config_error(format!("Invalid path: {e}")))?;

        loop {
            for filename in CONFIG_FILE_NAMES {
                let config_path = current.join(filename);
                if config_path.is_file() {
                    tracing::debug!("Found config: {}", config_path.display());
                    return Ok(Some(config_path));
                }
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<SondeConfig> {
        SondeConfig::load(path).map_err(|e| {
            SondeError::config_error(format!(
                "Failed to load config from '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Load config from an explicit path, or auto-discover one
    ///
    /// An explicit path must exist. When discovering, finding nothing is not
    /// an error: the defaults are returned and flags or environment variables
    /// are expected to fill them in.
    pub fn load(custom_path: Option<&Path>, start_dir: Option<&Path>) -> Result<SondeConfig> {
        if let Some(path) = custom_path {
            if !path.exists() {
                return Err(SondeError::config_error(format!(
                    "Config file not found: {}. Run 'sonde config init' to create one.",
                    path.display()
                )));
            }
            return Self::load_from_file(path);
        }

        let search_dir = start_dir.unwrap_or_else(|| Path::new("."));
        match Self::auto_discover(search_dir)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(SondeConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_temp_config(dir: &Path, filename: &str, content: &str) -> PathBuf {
        let path = dir.join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_auto_discover_from_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("runs/nightly");
        fs::create_dir_all(&nested).unwrap();
        create_temp_config(temp_dir.path(), "sonde.json", r#"{"patientId": "85"}"#);

        let found = ConfigLoader::auto_discover(&nested).unwrap();
        assert_eq!(found.unwrap().file_name().unwrap(), "sonde.json");
    }

    #[test]
    fn test_dotfile_takes_priority() {
        let temp_dir = TempDir::new().unwrap();
        create_temp_config(temp_dir.path(), "sonde.yaml", "patientId: a\n");
        create_temp_config(temp_dir.path(), ".sonderc.toml", "patientId = \"b\"\n");

        let found = ConfigLoader::auto_discover(temp_dir.path()).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), ".sonderc.toml");

        let config = ConfigLoader::load(None, Some(temp_dir.path())).unwrap();
        assert_eq!(config.patient_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Some(Path::new("nonexistent.json")), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_temp_config(temp_dir.path(), "sonde.json", r#"{ invalid json }"#);

        let result = ConfigLoader::load_from_file(&config_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        let temp_dir = TempDir::new().unwrap();
        create_temp_config(temp_dir.path(), "sonde.json", r#"{"patientId": "found"}"#);
        let explicit = create_temp_config(temp_dir.path(), "other.yml", "patientId: explicit\n");

        let config = ConfigLoader::load(Some(&explicit), Some(temp_dir.path())).unwrap();
        assert_eq!(config.patient_id.as_deref(), Some("explicit"));
    }
}
