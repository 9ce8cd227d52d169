//! Pipeline configuration
//!
//! One TOML file describes every capture stream of a process plus where
//! their counters are published:
//!
//! ```toml
//! [stats]
//! sink = "proclog"
//! proclog_dir = "/dev/shm/bifrost"
//!
//! [[streams]]
//! name = "tbn0"
//! protocol = "tbn"
//! nsrc = 32
//! bind = "0.0.0.0:${TBN_PORT}"
//! span_ntime = 16
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stream_ring::Guarantee;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_MTU: usize = 9000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_BACKLOG: usize = 16;
pub const DEFAULT_PROCLOG_DIR: &str = "/dev/shm/bifrost";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub stats: StatsConfig,
}

/// One logical stream: a socket, its protocol, and the ring it feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    /// Protocol name, resolved to a codec when the stream is opened
    pub protocol: String,
    pub nsrc: usize,
    /// Wire source id that maps to source index 0
    #[serde(default)]
    pub src0: u32,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    /// Packet times per span
    #[serde(default = "default_span_ntime")]
    pub span_ntime: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Spans retained by the ring
    #[serde(default = "default_backlog")]
    pub backlog: usize,
    #[serde(default)]
    pub guarantee: Guarantee,
    pub bind: Option<String>,
    pub connect: Option<String>,
    pub multicast_group: Option<Ipv4Addr>,
    pub multicast_interface: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    None,
    #[default]
    Log,
    Proclog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub sink: SinkKind,
    pub proclog_dir: PathBuf,
    /// Publish counters every this many spans
    pub interval_spans: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            proclog_dir: PathBuf::from(DEFAULT_PROCLOG_DIR),
            interval_spans: 1,
        }
    }
}

fn default_mtu() -> usize {
    DEFAULT_MTU
}

fn default_span_ntime() -> u64 {
    1
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_backlog() -> usize {
    DEFAULT_BACKLOG
}

impl StreamConfig {
    /// Stream with every optional field at its default
    pub fn new(name: impl Into<String>, protocol: impl Into<String>, nsrc: usize) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            nsrc,
            src0: 0,
            mtu: DEFAULT_MTU,
            span_ntime: default_span_ntime(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            backlog: DEFAULT_BACKLOG,
            guarantee: Guarantee::default(),
            bind: None,
            connect: None,
            multicast_group: None,
            multicast_interface: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn bind_addr(&self) -> ConfigResult<Option<SocketAddr>> {
        self.parse_addr("bind", self.bind.as_deref())
    }

    pub fn connect_addr(&self) -> ConfigResult<Option<SocketAddr>> {
        self.parse_addr("connect", self.connect.as_deref())
    }

    fn parse_addr(&self, field: &str, value: Option<&str>) -> ConfigResult<Option<SocketAddr>> {
        value
            .map(|addr| {
                addr.parse().map_err(|e| {
                    ConfigError::invalid(
                        format!("streams.{}.{}", self.name, field),
                        format!("'{}': {}", addr, e),
                    )
                })
            })
            .transpose()
    }

    fn validate(&self) -> ConfigResult<()> {
        let field = |f: &str| format!("streams.{}.{}", self.name, f);
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("streams.name", "must not be empty"));
        }
        let non_zero = [
            ("nsrc", self.nsrc as u64),
            ("mtu", self.mtu as u64),
            ("span_ntime", self.span_ntime),
            ("timeout_ms", self.timeout_ms),
            ("backlog", self.backlog as u64),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::invalid(field(name), "must be non-zero"));
            }
        }
        self.bind_addr()?;
        self.connect_addr()?;
        if self.multicast_group.is_some_and(|g| !g.is_multicast()) {
            return Err(ConfigError::invalid(
                field("multicast_group"),
                "not a multicast address",
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Load, expand `${VAR}` references, and validate
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            streams = config.streams.len(),
            "loaded pipeline config"
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let mut config: Self = toml::from_str(text)?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for stream in &self.streams {
            stream.validate()?;
            if !names.insert(stream.name.as_str()) {
                return Err(ConfigError::invalid(
                    format!("streams.{}", stream.name),
                    "duplicate stream name",
                ));
            }
        }
        if self.stats.sink == SinkKind::Proclog && self.stats.proclog_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                "stats.proclog_dir",
                "required for the proclog sink",
            ));
        }
        if self.stats.interval_spans == 0 {
            return Err(ConfigError::invalid("stats.interval_spans", "must be non-zero"));
        }
        Ok(())
    }

    pub fn stream(&self, name: &str) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Expand environment variables in addresses and paths
    pub fn expand_env_vars(&mut self) -> ConfigResult<()> {
        for stream in &mut self.streams {
            let prefix = format!("streams.{}", stream.name);
            expand_opt(&format!("{prefix}.bind"), &mut stream.bind)?;
            expand_opt(&format!("{prefix}.connect"), &mut stream.connect)?;
        }
        let dir = self.stats.proclog_dir.to_string_lossy().into_owned();
        self.stats.proclog_dir = PathBuf::from(expand("stats.proclog_dir", &dir)?);
        Ok(())
    }
}

fn expand(field: &str, value: &str) -> ConfigResult<String> {
    let expanded = shellexpand::env(value)
        .map_err(|e| ConfigError::invalid(field, e.to_string()))?;
    if expanded != value {
        debug!(field, value, expanded = %expanded, "expanded environment reference");
    }
    Ok(expanded.into_owned())
}

fn expand_opt(field: &str, value: &mut Option<String>) -> ConfigResult<()> {
    if let Some(v) = value {
        *v = expand(field, v)?;
    }
    Ok(())
}
