use crate::ProviderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Inventory snapshot consulted for external references.
    #[serde(default)]
    pub inventory: Option<PathBuf>,
    #[serde(default = "default_baker")]
    pub baker: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            inventory: None,
            baker: default_baker(),
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn with_inventory(mut self, path: impl Into<PathBuf>) -> Self {
        self.inventory = Some(path.into());
        self
    }

    /// Load config from `~/.config/cumulus/config.json`, falling back to
    /// defaults when the file does not exist.
    pub fn load_default() -> Result<Self, ProviderError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ProviderError::Config(format!("invalid provider config: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), ProviderError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_baker() -> String {
    "mock".to_owned()
}

fn default_config_path() -> Result<PathBuf, ProviderError> {
    let home =
        std::env::var("HOME").map_err(|_| ProviderError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/cumulus/config.json"))
}
