//! Listener and sender configuration.
//!
//! Values come from built-in defaults, then an optional TOML file with
//! `[listen]` and `[send]` tables, then command-line flags.

use crate::error::{RelocError, Result};
use crate::protocol::{DEFAULT_HOST, DEFAULT_PORT, MAX_MANIFEST_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn home_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(profile) = std::env::var("USERPROFILE") {
            return PathBuf::from(profile);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home);
    }
    PathBuf::from(".")
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("Reloc");
        }
    }
    home_dir().join(".config").join("reloc")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("reloc.toml")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
    /// Destination root; received trees land underneath it.
    pub root: PathBuf,
    /// Run the accept loop on a worker thread instead of the caller's.
    #[serde(rename = "async")]
    pub is_async: bool,
    pub use_log: bool,
    pub log_dir: PathBuf,
    pub preserve_mtime: bool,
    pub max_manifest_bytes: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            root: home_dir(),
            is_async: false,
            use_log: false,
            log_dir: PathBuf::from("logs"),
            preserve_mtime: true,
            max_manifest_bytes: MAX_MANIFEST_SIZE,
        }
    }
}

impl ListenConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.root.exists() {
            return Err(RelocError::NotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(RelocError::Config(format!(
                "destination root is not a directory: {}",
                self.root.display()
            )));
        }
        if self.host.trim().is_empty() {
            return Err(RelocError::Config("listen host is empty".into()));
        }
        if self.max_manifest_bytes == 0 {
            return Err(RelocError::Config("max_manifest_bytes must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    pub host: String,
    pub port: u16,
    /// Connect/write timeout in seconds; absent means wait indefinitely.
    pub timeout_secs: Option<f64>,
    /// Write the manifest on a worker thread; `transmit` returns right after connecting.
    #[serde(rename = "async")]
    pub is_async: bool,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_secs: None,
            is_async: false,
        }
    }
}

impl SendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Result<Option<Duration>> {
        match self.timeout_secs {
            None => Ok(None),
            Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
            Some(secs) => Err(RelocError::Config(format!("invalid timeout: {}", secs))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub listen: ListenConfig,
    pub send: SendConfig,
}

impl FileConfig {
    pub fn from_toml(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| RelocError::Config(e.to_string()))
    }

    /// Load `path`, or the default location when `path` is `None`. A missing
    /// default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (p, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path(), false),
        };
        match std::fs::read_to_string(&p) {
            Ok(data) => Self::from_toml(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RelocError::NotFound(p)),
            Err(e) => Err(RelocError::io(p, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let c = ListenConfig::default();
        assert_eq!(c.port, 1750);
        assert_eq!(c.host, "localhost");
        assert_eq!(c.root, home_dir());
        assert!(!c.is_async);
        assert!(!c.use_log);
        assert_eq!(SendConfig::default().target(), "localhost:1750");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = FileConfig::from_toml(
            r#"
            [listen]
            port = 9000
            async = true

            [send]
            host = "10.0.0.5"
            timeout_secs = 7.5
            "#,
        )
        .unwrap();
        assert_eq!(c.listen.port, 9000);
        assert!(c.listen.is_async);
        assert_eq!(c.listen.host, "localhost");
        assert_eq!(c.send.host, "10.0.0.5");
        assert_eq!(c.send.port, 1750);
        assert_eq!(c.send.connect_timeout().unwrap(), Some(Duration::from_millis(7500)));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(FileConfig::from_toml("[listen]\nport = \"x\""), Err(RelocError::Config(_))));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("none.toml");
        assert!(matches!(FileConfig::load(Some(&p)), Err(RelocError::NotFound(_))));
    }

    #[test]
    fn test_load_file() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("reloc.toml");
        std::fs::write(&p, "[listen]\nuse_log = true\n").unwrap();
        assert!(FileConfig::load(Some(&p)).unwrap().listen.use_log);
    }

    #[test]
    fn test_validate_root() {
        let tmp = TempDir::new().unwrap();
        let mut c = ListenConfig {
            root: tmp.path().join("missing"),
            ..ListenConfig::default()
        };
        assert!(matches!(c.validate(), Err(RelocError::NotFound(_))));
        std::fs::write(tmp.path().join("file"), "x").unwrap();
        c.root = tmp.path().join("file");
        assert!(matches!(c.validate(), Err(RelocError::Config(_))));
        c.root = tmp.path().to_path_buf();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_invalid_timeout() {
        let c = SendConfig {
            timeout_secs: Some(-1.0),
            ..SendConfig::default()
        };
        assert!(c.connect_timeout().is_err());
    }
}
