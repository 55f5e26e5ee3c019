use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hearing_assist_core::{AudioSettings, Result};

/// JSON file holding the user's last settings between runs.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the stored settings, falling back to defaults when nothing has
    /// been saved yet. Stored values are clamped into range.
    pub fn load(&self) -> Result<AudioSettings> {
        match fs::read_to_string(&self.path) {
            Ok(json) => {
                let settings = AudioSettings::from_json(&json)?.sanitized();
                tracing::info!(path = %self.path.display(), "loaded settings");
                Ok(settings)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no saved settings, using defaults");
                Ok(AudioSettings::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, settings: &AudioSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut json = settings.to_json_pretty()?;
        json.push('\n');
        fs::write(&self.path, json)?;
        tracing::info!(path = %self.path.display(), "saved settings");
        Ok(())
    }
}
