//! Server configuration: TOML file + environment/CLI overrides.

use relay_core::{RelayError, RelayResult};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_true")]
    pub echo_to_sender: bool,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            echo_to_sender: true,
            shutdown_timeout: default_shutdown_timeout(),
            send_queue: default_send_queue(),
        }
    }
}

fn default_port() -> u16 {
    3001
}
fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_shutdown_timeout() -> u64 {
    5
}
fn default_send_queue() -> usize {
    256
}

/// Values supplied on the command line or through the environment.
///
/// `None` (or an empty list) leaves the file value in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub allowed_origins: Vec<String>,
    pub no_echo: bool,
    pub shutdown_timeout: Option<u64>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// Listen address.
    pub bind: IpAddr,
    /// Origins allowed to upgrade; `"*"` admits any.
    pub allowed_origins: Vec<String>,
    /// Deliver a user's message back to its sender too.
    pub echo_to_sender: bool,
    /// How long shutdown waits for sessions to close.
    pub shutdown_timeout: Duration,
    /// Outbound lines queued per session before it is disconnected as too slow.
    pub send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_section(ServerSection::default())
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply overrides.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> RelayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let mut config = Self::from_section(file_config.server);
        config.apply(overrides);
        if config.send_queue == 0 {
            return Err(RelayError::Config("send_queue must be at least 1".into()));
        }
        Ok(config)
    }

    fn from_section(section: ServerSection) -> Self {
        Self {
            port: section.port,
            bind: section.bind,
            allowed_origins: section.allowed_origins,
            echo_to_sender: section.echo_to_sender,
            shutdown_timeout: Duration::from_secs(section.shutdown_timeout),
            send_queue: section.send_queue,
        }
    }

    fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if !overrides.allowed_origins.is_empty() {
            self.allowed_origins = overrides.allowed_origins;
        }
        if overrides.no_echo {
            self.echo_to_sender = false;
        }
        if let Some(secs) = overrides.shutdown_timeout {
            self.shutdown_timeout = Duration::from_secs(secs);
        }
    }

    /// Socket address the listener binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse(content: &str) -> RelayResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| RelayError::Config(format!("config parse error: {e}")))
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("~/.chat-relay/config.toml")
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.bind_addr().to_string(), "0.0.0.0:3001");
        assert_eq!(cfg.allowed_origins, vec!["http://localhost:3000"]);
        assert!(cfg.echo_to_sender);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(cfg.send_queue, 256);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = parse("[server]\nport = 4000\n").unwrap();
        let cfg = ServerConfig::from_section(file.server);
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let err = parse("[server]\nport = \"not a number\"\n").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = ServerConfig::load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(cfg.port, 3001);
    }

    #[test]
    fn zero_send_queue_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nsend_queue = 0\n").unwrap();
        let err = ServerConfig::load(Some(&path), Overrides::default()).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[server]\nport = 4000\nallowed_origins = [\"https://a.example\"]\n\
             echo_to_sender = true"
        )
        .unwrap();

        let cfg = ServerConfig::load(
            Some(&path),
            Overrides {
                port: Some(5000),
                allowed_origins: vec!["https://b.example".into()],
                no_echo: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.allowed_origins, vec!["https://b.example"]);
        assert!(!cfg.echo_to_sender);
    }

    #[test]
    fn tilde_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/x.toml")), home.join("x.toml"));
        }
        assert_eq!(expand_tilde(Path::new("/etc/x.toml")), PathBuf::from("/etc/x.toml"));
    }
}
