//! Storage for named pipeline configuration profiles.
//!
//! Different tests (spontaneous nystagmus, caloric, rotary chair) want different
//! smoothing and tracking settings. Profiles are stored as JSON files in
//! ~/.vng_config/pipeline_profiles/ by default.

use crate::config::{ConfigError, PipelineConfig};
use std::path::{Path, PathBuf};

/// Configuration storage manager for pipeline profiles.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.vng_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.vng_config)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".vng_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn profiles_dir(&self) -> PathBuf {
        self.root_path.join("pipeline_profiles")
    }

    /// Filename for a profile; spaces and path separators are replaced
    fn profile_filename(&self, name: &str) -> PathBuf {
        let safe: String = name
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                c => c,
            })
            .collect();
        self.profiles_dir().join(format!("{safe}.json"))
    }

    /// Get a stored profile.
    ///
    /// Returns None if no profile with this name exists.
    /// Returns Some(Err) if the file exists but cannot be loaded.
    pub fn get_profile(&self, name: &str) -> Option<Result<PipelineConfig, ConfigError>> {
        let path = self.profile_filename(name);

        if !path.exists() {
            return None;
        }

        Some(PipelineConfig::load_from_file(&path))
    }

    /// Save a profile, creating the profiles directory if needed.
    ///
    /// Returns the path where the profile was saved.
    pub fn save_profile(&self, name: &str, config: &PipelineConfig) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(self.profiles_dir())?;

        let path = self.profile_filename(name);
        config.save_to_file(&path)?;
        Ok(path)
    }

    /// List the names of all stored profiles, sorted.
    pub fn list_profiles(&self) -> std::io::Result<Vec<String>> {
        let dir = self.profiles_dir();

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Delete a profile.
    ///
    /// Returns Ok(true) if the file was deleted, Ok(false) if it didn't exist.
    pub fn delete_profile(&self, name: &str) -> std::io::Result<bool> {
        let path = self.profile_filename(name);

        if !path.exists() {
            return Ok(false);
        }

        std::fs::remove_file(path)?;
        Ok(true)
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".vng_config")))
    }
}
