use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::error::{ParseError, QuireError, SerDeError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the note store and crash-recovery drafts.
    pub data_dir: Option<PathBuf>,
    /// Owner identity new notes are created under.
    pub owner: String,
    /// Quiet period before an edit is written to the store.
    pub debounce_ms: u64,
    /// How long the "saved" status stays visible after a write.
    pub saved_flash_ms: u64,
    /// Character that opens the block command menu.
    pub trigger_char: char,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl Config {
    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self, QuireError> {
        loader.load().await
    }

    /// Loads the configuration, falling back to defaults when the source does not exist.
    pub async fn load_or_default(loader: &impl Loader) -> Result<Self, QuireError> {
        match loader.load().await {
            Ok(config) => Ok(config),
            Err(e) if e.is_not_found() => {
                tracing::debug!("no configuration found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<(), QuireError> {
        saver.save(self).await
    }

    /// Resolve the data directory, defaulting to `.quire` under the working directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".quire"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            owner: "local".to_owned(),
            debounce_ms: 1000,
            saved_flash_ms: 2000,
            trigger_char: '/',
            log_level: None,
        }
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(&self) -> impl Future<Output = Result<Config, QuireError>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(&self, config: &Config) -> impl Future<Output = Result<(), QuireError>> + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// [`Config`] data is serialized according to the file extension;
    /// `.json` and `.toml` are supported.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

impl Loader for FileStore {
    async fn load(&self) -> Result<Config, QuireError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let src = std::fs::read_to_string(&self.path)?;
                serde_json::from_str(&src)
                    .map_err(|e| ParseError::from_json(e, self.name(), src.clone()).into())
            }
            Some("toml") => {
                let src = std::fs::read_to_string(&self.path)?;
                toml::from_str(&src)
                    .map_err(|e| ParseError::from_toml(e, self.name(), src.clone()).into())
            }
            _ => Err(QuireError::Config(format!(
                "unsupported configuration format: {}",
                self.name()
            ))),
        }
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &Config) -> Result<(), QuireError> {
        let contents = match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(config).map_err(SerDeError::from)?,
            Some("toml") => toml::to_string_pretty(config).map_err(SerDeError::from)?,
            _ => {
                return Err(QuireError::Config(format!(
                    "unsupported configuration format: {}",
                    self.name()
                )));
            }
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("config.toml"));
        let config = Config {
            owner: "ana".into(),
            debounce_ms: 250,
            ..Config::default()
        };
        config.save(&store).await.unwrap();
        let loaded = Config::load(&store).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "owner": "ben" }"#).unwrap();
        let loaded = Config::load(&FileStore::new(&path)).await.unwrap();
        assert_eq!(loaded.owner, "ben");
        assert_eq!(loaded.debounce_ms, 1000);
        assert_eq!(loaded.trigger_char, '/');
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.toml"));
        assert!(Config::load(&store).await.is_err());
        assert_eq!(Config::load_or_default(&store).await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn test_bad_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"\n").unwrap();
        let err = Config::load(&FileStore::new(&path)).await.unwrap_err();
        assert!(matches!(err, QuireError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unknown_extension() {
        let store = FileStore::new("config.yaml");
        assert!(matches!(
            Config::load(&store).await,
            Err(QuireError::Config(_))
        ));
    }
}
