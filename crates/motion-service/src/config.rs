use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use motion_protocol as proto;
use motion_transport::MulticastConfig;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub status: StatusSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_multicast_group")]
    pub multicast_group: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    #[serde(default = "default_target_port")]
    pub target_port: u16,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Pin the socket to this local address instead of auto-detecting it
    #[serde(default)]
    pub primary_address: Option<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            multicast_group: default_multicast_group(),
            bind_port: default_bind_port(),
            target_port: default_target_port(),
            ttl: default_ttl(),
            primary_address: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_repeat_delay_ms")]
    pub repeat_delay_ms: u64,
    #[serde(default = "default_restart_backoff_ms")]
    pub restart_backoff_ms: u64,
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    #[serde(default = "default_repeat_count")]
    pub default_repeat_count: u32,
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: usize,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            repeat_delay_ms: default_repeat_delay_ms(),
            restart_backoff_ms: default_restart_backoff_ms(),
            start_delay_ms: default_start_delay_ms(),
            default_repeat_count: default_repeat_count(),
            outbound_capacity: default_outbound_capacity(),
            inbound_capacity: default_inbound_capacity(),
            receive_buffer_size: default_receive_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    /// 0 disables the periodic ping
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_payload")]
    pub payload: String,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            payload: default_poll_payload(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusSection {
    /// 0 disables the status log
    #[serde(default = "default_status_interval")]
    pub interval_secs: u64,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            interval_secs: default_status_interval(),
        }
    }
}

fn default_multicast_group() -> String { proto::MULTICAST_GROUP.to_string() }
fn default_bind_port() -> u16 { proto::BIND_PORT }
fn default_target_port() -> u16 { proto::TARGET_PORT }
fn default_ttl() -> u32 { proto::MULTICAST_TTL }
fn default_repeat_delay_ms() -> u64 { proto::REPEAT_DELAY_MS }
fn default_restart_backoff_ms() -> u64 { proto::RESTART_BACKOFF_MS }
fn default_start_delay_ms() -> u64 { proto::START_DELAY_MS }
fn default_repeat_count() -> u32 { proto::DEFAULT_REPEAT_COUNT }
fn default_outbound_capacity() -> usize { proto::OUTBOUND_QUEUE_CAPACITY }
fn default_inbound_capacity() -> usize { proto::INBOUND_QUEUE_CAPACITY }
fn default_receive_buffer_size() -> usize { proto::RECEIVE_BUFFER_SIZE }
fn default_poll_interval() -> u64 { proto::POLL_INTERVAL_SECS }
fn default_poll_payload() -> String { proto::POLL_PAYLOAD.to_string() }
fn default_status_interval() -> u64 { 60 }

impl ServiceConfig {
    /// Read `path`, or fall back to defaults if it does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Validated transport settings.
    pub fn multicast(&self) -> anyhow::Result<MulticastConfig> {
        let group: Ipv4Addr = self
            .network
            .multicast_group
            .parse()
            .with_context(|| format!("invalid multicast_group {:?}", self.network.multicast_group))?;
        if !group.is_multicast() {
            bail!("multicast_group {} is not a multicast address", group);
        }

        let t = &self.transport;
        if t.outbound_capacity == 0 || t.inbound_capacity == 0 {
            bail!("queue capacities must be at least 1");
        }
        if t.receive_buffer_size == 0 {
            bail!("receive_buffer_size must be at least 1");
        }

        Ok(MulticastConfig {
            group,
            bind_port: self.network.bind_port,
            target_port: self.network.target_port,
            ttl: self.network.ttl,
            repeat_delay: Duration::from_millis(t.repeat_delay_ms),
            restart_backoff: Duration::from_millis(t.restart_backoff_ms),
            start_delay: Duration::from_millis(t.start_delay_ms),
            default_repeat_count: t.default_repeat_count,
            outbound_capacity: t.outbound_capacity,
            inbound_capacity: t.inbound_capacity,
            receive_buffer_size: t.receive_buffer_size,
        })
    }

    pub fn primary_address(&self) -> anyhow::Result<Option<Ipv4Addr>> {
        self.network
            .primary_address
            .as_deref()
            .map(|addr| {
                addr.parse()
                    .with_context(|| format!("invalid primary_address {:?}", addr))
            })
            .transpose()
    }
}
