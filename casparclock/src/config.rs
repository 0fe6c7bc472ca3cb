use anyhow::{bail, Context, Result};
use caspar_amcp::{
    Target, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_WRITE_TIMEOUT_MS,
};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
const CONFIG_FILE: &str = "casparclock.toml";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Mock,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub transport: TransportKind,
    pub caspar: CasparConfig,
    pub clock: ClockConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CasparConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub channel: u32,
    pub layer: u32,
    pub template: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClockConfig {
    pub auto_update: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for CasparConfig {
    fn default() -> Self {
        let target = Target::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            channel: target.channel,
            layer: target.layer,
            template: target.template,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { auto_update: true }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl CasparConfig {
    pub fn target(&self) -> Target {
        Target {
            channel: self.channel,
            layer: self.layer,
            template: self.template.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Values taken from the command line and environment. They win over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub mock: bool,
    pub no_auto_update: bool,
}

impl Config {
    /// Reject values that parse but would make the controller unusable
    pub fn validate(&self) -> Result<()> {
        if self.caspar.connect_timeout_ms == 0 {
            bail!("caspar.connect_timeout_ms must be greater than 0");
        }
        if self.caspar.write_timeout_ms == 0 {
            bail!("caspar.write_timeout_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(host) = overrides.host {
            self.caspar.host = host;
        }
        if let Some(port) = overrides.port {
            self.caspar.port = port;
        }
        if let Some(bind) = overrides.bind {
            self.server.bind = bind;
        }
        if overrides.mock {
            self.transport = TransportKind::Mock;
        }
        if overrides.no_auto_update {
            self.clock.auto_update = false;
        }
        self
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "casparclock", "casparclock")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Load the TOML config.
///
/// An explicit path must exist. Without one, the per-user config directory is
/// checked and defaults are used when nothing is there.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    let config: Config = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file at {:?}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file at {:?}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[caspar]\nport = 6250\n").unwrap();
        assert_eq!(config.caspar.port, 6250);
        assert_eq!(config.caspar.host, "localhost");
        assert_eq!(config.caspar.connect_timeout_ms, 5_000);
        assert_eq!(config.caspar.write_timeout_ms, 5_000);
        assert_eq!(config.caspar.target(), Target::default());
        assert!(config.clock.auto_update);
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.transport, TransportKind::Tcp);
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("casparclock.toml");
        fs::write(
            &path,
            r#"
transport = "mock"

[caspar]
host = "playout-1"
channel = 2
layer = 10
template = "news/LOWER"

[clock]
auto_update = false
"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.transport, TransportKind::Mock);
        assert_eq!(config.caspar.host, "playout-1");
        assert_eq!(config.caspar.port, DEFAULT_PORT);
        assert_eq!(config.caspar.target().layer, 10);
        assert_eq!(config.caspar.target().template, "news/LOWER");
        assert!(!config.clock.auto_update);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn invalid_transport_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        fs::write(&path, "transport = \"carrier-pigeon\"\n").expect("write config");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (key, line) in [
            ("connect_timeout_ms", "[caspar]\nconnect_timeout_ms = 0\n"),
            ("write_timeout_ms", "[caspar]\nwrite_timeout_ms = 0\n"),
        ] {
            let path = dir.path().join(format!("{key}.toml"));
            fs::write(&path, line).expect("write config");
            let err = load_config(Some(&path)).unwrap_err();
            assert!(err.to_string().contains("Invalid config file"), "{err:#}");
            assert!(format!("{err:#}").contains(key), "{err:#}");
        }
    }

    #[test]
    fn overrides_win_over_file_values() {
        let config = Config::default().apply(Overrides {
            host: Some("10.0.0.5".to_string()),
            port: Some(5251),
            bind: Some("0.0.0.0:8080".to_string()),
            mock: true,
            no_auto_update: true,
        });
        assert_eq!(config.caspar.host, "10.0.0.5");
        assert_eq!(config.caspar.port, 5251);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.transport, TransportKind::Mock);
        assert!(!config.clock.auto_update);
    }
}
