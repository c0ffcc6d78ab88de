//! Startup configuration, loaded from the INI file described in the
//! `cache-server` section (`cache-dir`, `database`, `hostname`,
//! `server-port`, `deploy-port`, `key`).
//!
//! A missing file or a missing key is a fatal startup error, matching the
//! original tool's `config.py` behavior.

use std::fmt;
use std::path::{Path, PathBuf};

use ini::Ini;

use crate::error::{Error, Result};

const SECTION: &str = "cache-server";

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub database: PathBuf,
    pub server_hostname: String,
    pub server_port: u16,
    pub deploy_port: u16,
    /// Symmetric key used to sign/verify bearer tokens for caches, agents,
    /// and workspaces (HMAC-SHA256, matching the original's JWT `HS256`).
    pub key: String,
}

/// Severity level for a configuration issue, mirrored from the teacher's
/// config-validation convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Load and parse the INI config file at `path`. Fatal (returns `Err`)
    /// if the file is missing or any required key is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }

        let ini = Ini::load_from_file(path)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        let section = ini
            .section(Some(SECTION))
            .ok_or_else(|| Error::Config(format!("missing section [{SECTION}]")))?;

        let get = |key: &str| -> Result<String> {
            section
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| Error::Config(format!("missing key '{key}' in [{SECTION}]")))
        };

        let server_port: u16 = get("server-port")?
            .parse()
            .map_err(|_| Error::Config("server-port must be a valid port number".into()))?;
        let deploy_port: u16 = get("deploy-port")?
            .parse()
            .map_err(|_| Error::Config("deploy-port must be a valid port number".into()))?;

        Ok(Config {
            cache_dir: PathBuf::from(get("cache-dir")?),
            database: PathBuf::from(get("database")?),
            server_hostname: get("hostname")?,
            server_port,
            deploy_port,
            key: get("key")?,
        })
    }

    /// Validate semantic constraints beyond "key present" (ambient-stack
    /// convention: collect issues rather than failing on the first one).
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server_port == self.deploy_port {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server-port/deploy-port".into(),
                message: "server-port and deploy-port must differ".into(),
            });
        }

        if self.server_hostname.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "hostname".into(),
                message: "hostname must not be empty".into(),
            });
        }

        if self.key.len() < 16 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "key".into(),
                message: "signing key is short; prefer at least 16 bytes of entropy".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_conf(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache-server.conf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.conf");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn missing_key_is_fatal() {
        let (_dir, path) = write_conf(
            "[cache-server]\ncache-dir = /tmp/caches\ndatabase = /tmp/db.sqlite\n",
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn full_config_parses() {
        let (_dir, path) = write_conf(
            "[cache-server]\n\
             cache-dir = /tmp/caches\n\
             database = /tmp/db.sqlite\n\
             hostname = cache.example.com\n\
             server-port = 8080\n\
             deploy-port = 8081\n\
             key = supersecretsigningkey\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.deploy_port, 8081);
        assert_eq!(config.server_hostname, "cache.example.com");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn same_ports_is_error() {
        let (_dir, path) = write_conf(
            "[cache-server]\n\
             cache-dir = /tmp/caches\n\
             database = /tmp/db.sqlite\n\
             hostname = cache.example.com\n\
             server-port = 8080\n\
             deploy-port = 8080\n\
             key = supersecretsigningkey\n",
        );
        let config = Config::load(&path).unwrap();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }
}
