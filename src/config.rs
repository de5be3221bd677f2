use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};

/// Top-level configuration for the haproxy-statsd bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HAProxy statistics endpoint configuration.
    pub haproxy: HaproxyConfig,

    /// Statsd sink configuration.
    pub statsd: StatsdConfig,

    /// Pause between the end of one poll cycle and the start of the next.
    /// Either whole seconds (`10`) or a duration string (`10s`, `500ms`).
    /// Zero polls back-to-back.
    #[serde(deserialize_with = "deserialize_interval")]
    pub poll_interval: Duration,

    /// Prometheus health metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// HAProxy statistics endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HaproxyConfig {
    /// CSV stats URL (e.g., "http://127.0.0.1:8080/haproxy?stats;csv").
    pub url: String,

    /// Basic auth username. Authentication is sent when either the username
    /// or the password is non-empty.
    #[serde(default)]
    pub username: String,

    /// Basic auth password.
    #[serde(default)]
    pub password: String,

    /// Request timeout, covering connect and body read. Default: 10s.
    #[serde(default = "default_haproxy_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Statsd sink configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsdConfig {
    /// Statsd UDP address (host:port).
    pub address: String,

    /// Prefix prepended to every metric name. May be empty.
    pub prefix: String,

    /// Per-datagram send timeout. Default: 1s.
    #[serde(default = "default_statsd_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Prometheus health metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Serve /metrics and /healthz. Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// Listen address. Default: ":9090".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_haproxy_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_statsd_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_health_addr() -> String {
    ":9090".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_health_addr(),
        }
    }
}

/// Reads a bare integer as seconds, anything else as a humantime duration.
fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Interval {
        Seconds(u64),
        Human(#[serde(with = "humantime_serde")] Duration),
    }

    Ok(match Interval::deserialize(deserializer)? {
        Interval::Seconds(secs) => Duration::from_secs(secs),
        Interval::Human(duration) => duration,
    })
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML (or JSON) file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        Self::from_yaml(&data).with_context(|| format!("loading config file {}", path.display()))
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("parsing config")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.haproxy.url.is_empty() {
            bail!("haproxy.url is required");
        }

        reqwest::Url::parse(&self.haproxy.url)
            .with_context(|| format!("haproxy.url {:?} is not a valid URL", self.haproxy.url))?;

        if self.haproxy.timeout.is_zero() {
            bail!("haproxy.timeout must be positive");
        }

        if self.statsd.address.is_empty() {
            bail!("statsd.address is required");
        }

        validate_host_port(&self.statsd.address)
            .with_context(|| format!("statsd.address {:?}", self.statsd.address))?;

        if self.statsd.timeout.is_zero() {
            bail!("statsd.timeout must be positive");
        }

        if self.health.enabled && self.health.addr.is_empty() {
            bail!("health.addr is required when health.enabled is true");
        }

        Ok(())
    }
}

/// Checks that `addr` has the shape `host:port` with a numeric port.
fn validate_host_port(addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .context("expected host:port")?;

    if host.is_empty() {
        bail!("missing host");
    }

    port.parse::<u16>()
        .with_context(|| format!("invalid port {port:?}"))?;

    Ok(())
}
