//! Local credential store for the bearer token
//!
//! The token is issued elsewhere; this module only reads it (and lets the CLI
//! write or clear it) so every outgoing request can carry
//! `Authorization: Bearer <token>`.

use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Key the bearer token is stored under
const TOKEN_KEY: &str = "auth_token";

/// File name of the key/value store inside the credentials directory
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Clone)]
enum Source {
    /// JSON key/value file on disk
    File(PathBuf),
    /// Token supplied up front (CLI flag, env var, tests)
    Fixed(Option<String>),
}

/// Read access to the persisted bearer credential
#[derive(Debug, Clone)]
pub struct CredentialStore {
    source: Source,
}

impl CredentialStore {
    /// Creates a store backed by the XDG config directory
    ///
    /// Uses `~/.config/fetchcache/credentials.json` on Linux, or the equivalent
    /// path elsewhere. Returns `None` if no home directory can be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "fetchcache")?;
        Some(Self::with_dir(project_dirs.config_dir().to_path_buf()))
    }

    /// Creates a store backed by `credentials.json` inside `dir`
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            source: Source::File(dir.join(CREDENTIALS_FILE)),
        }
    }

    /// Creates a store that always yields the given token
    pub fn fixed(token: Option<String>) -> Self {
        Self {
            source: Source::Fixed(token),
        }
    }

    /// Returns the current bearer token, if any
    ///
    /// A missing or unreadable file is treated as "not logged in".
    pub fn token(&self) -> Option<String> {
        match &self.source {
            Source::Fixed(token) => token.clone(),
            Source::File(_) => self.read_all().remove(TOKEN_KEY),
        }
        .filter(|token| !token.is_empty())
    }

    /// Persists a new bearer token
    pub fn set_token(&self, token: &str) -> std::io::Result<()> {
        let mut values = self.read_all();
        values.insert(TOKEN_KEY.to_string(), token.to_string());
        self.write_all(&values)
    }

    /// Removes the stored bearer token
    pub fn clear_token(&self) -> std::io::Result<()> {
        let mut values = self.read_all();
        values.remove(TOKEN_KEY);
        self.write_all(&values)
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let Source::File(path) = &self.source else {
            return BTreeMap::new();
        };
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> std::io::Result<()> {
        let Source::File(path) = &self.source else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "fixed credentials cannot be written",
            ));
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}
