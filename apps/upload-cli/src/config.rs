//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/ledger/upload.toml`
//! - macOS: `~/Library/Application Support/ledger/upload.toml`
//! - Windows: `%APPDATA%/ledger/upload.toml`
//!
//! The access token is never stored; it comes from `LEDGER_TOKEN`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use ledger_upload::UploadConfig;
use serde::{Deserialize, Serialize};

use crate::Args;

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "LEDGER_TOKEN";

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server origin the upload routes live under.
    #[serde(default = "default_server")]
    pub server: String,

    /// Remote directory files are uploaded into (`""` is the root).
    #[serde(default)]
    pub destination: String,

    /// Content type for every file; guessed from the extension when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Upload pipeline tunables.
    #[serde(default)]
    pub upload: UploadConfig,
}

fn default_server() -> String {
    "http://localhost:8080".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server(),
            destination: String::new(),
            content_type: None,
            upload: UploadConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// The default file is created when missing; an explicit path must
    /// exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        let path = config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(server) = &args.server {
            self.server = server.clone();
        }
        if let Some(destination) = &args.destination {
            self.destination = destination.clone();
        }
        if let Some(content_type) = &args.content_type {
            self.content_type = Some(content_type.clone());
        }
        if let Some(chunk_size) = args.chunk_size {
            self.upload.chunk_size = chunk_size;
        }
        if let Some(concurrency) = args.concurrency {
            self.upload.max_concurrent_uploads = concurrency;
        }
    }
}

/// Reads the bearer token from the environment.
pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty())
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("ledger")
            .join("upload.toml"))
    }

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("ledger")
            .join("upload.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("ledger").join("upload.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/ledger/upload.toml"))
    }
}
