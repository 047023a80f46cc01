//! Persisted settings store.
//!
//! Source of truth for the server configuration document. Reads are
//! validated as a whole; writes always re-read the file first (to
//! tolerate external edits) and rewrite the entire document in one
//! write, preserving unrelated entries and unknown fields verbatim.

use std::path::{Path, PathBuf};

use mcphub_core::{McpSettings, ServerConfig, SettingsError};

/// Filename of the settings document inside the settings directory.
pub const SETTINGS_FILE_NAME: &str = "mcp_settings.json";

/// Store for the `mcpServers` settings document.
#[derive(Debug, Clone)]
pub struct McpSettingsStore {
    path: PathBuf,
}

impl McpSettingsStore {
    /// Create a store backed by an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store at the platform default location
    /// (`<config dir>/mcphub/mcp_settings.json`).
    pub fn at_default_location() -> Result<Self, SettingsError> {
        let base = dirs::config_dir().ok_or_else(|| SettingsError::Io {
            path: SETTINGS_FILE_NAME.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no platform config directory",
            ),
        })?;
        Ok(Self::new(base.join("mcphub").join(SETTINGS_FILE_NAME)))
    }

    /// Path to the settings file, ensuring the directory exists and
    /// seeding an empty document when the file is absent.
    pub async fn path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        if tokio::fs::metadata(&self.path).await.is_err() {
            tokio::fs::write(&self.path, McpSettings::empty_document())
                .await
                .map_err(|e| self.io_error(e))?;
            tracing::info!(path = %self.path.display(), "Seeded empty MCP settings file");
        }

        Ok(self.path.clone())
    }

    /// Raw path without touching the filesystem.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Read and schema-validate the document.
    ///
    /// Any parse or validation failure leaves caller state untouched;
    /// a partial document is never returned.
    pub async fn read(&self) -> Result<Vec<(String, ServerConfig)>, SettingsError> {
        self.read_document().await?.validated_entries()
    }

    /// Patch the named entry and rewrite the whole document.
    ///
    /// The file is re-read first so external edits to other entries
    /// survive. Returns the updated config for the caller's in-memory
    /// state.
    pub async fn mutate<F>(&self, name: &str, patch: F) -> Result<ServerConfig, SettingsError>
    where
        F: FnOnce(&mut ServerConfig),
    {
        let mut doc = self.read_document().await?;

        let raw = doc
            .mcp_servers
            .get(name)
            .ok_or_else(|| SettingsError::ServerNotFound(name.to_string()))?;

        let mut config: ServerConfig =
            serde_json::from_value(raw.clone()).map_err(|e| SettingsError::InvalidServer {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        patch(&mut config);

        config
            .validate()
            .map_err(|reason| SettingsError::InvalidServer {
                name: name.to_string(),
                reason,
            })?;

        let value = serde_json::to_value(&config).map_err(|e| SettingsError::Parse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        doc.mcp_servers.insert(name.to_string(), value);

        self.write_document(&doc).await?;
        Ok(config)
    }

    async fn read_document(&self) -> Result<McpSettings, SettingsError> {
        let path = self.path().await?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| self.io_error(e))?;

        serde_json::from_str(&contents).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn write_document(&self, doc: &McpSettings) -> Result<(), SettingsError> {
        let contents = serde_json::to_string_pretty(doc).map_err(|e| SettingsError::Parse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Whole document in a single write; never a partial file.
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
