use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use motion_protocol as proto;

/// Runtime settings of the multicast manager.
/// `Default` yields the values every Motion gateway expects on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastConfig {
    pub group: Ipv4Addr,
    pub bind_port: u16,
    pub target_port: u16,
    pub ttl: u32,
    /// Pause between repeats of the same packet
    pub repeat_delay: Duration,
    /// Cooldown before the supervisor rebuilds a failed socket
    pub restart_backoff: Duration,
    /// Delay between `start()` and the first socket attempt
    pub start_delay: Duration,
    pub default_repeat_count: u32,
    pub outbound_capacity: usize,
    pub inbound_capacity: usize,
    pub receive_buffer_size: usize,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group: proto::MULTICAST_GROUP_ADDR,
            bind_port: proto::BIND_PORT,
            target_port: proto::TARGET_PORT,
            ttl: proto::MULTICAST_TTL,
            repeat_delay: Duration::from_millis(proto::REPEAT_DELAY_MS),
            restart_backoff: Duration::from_millis(proto::RESTART_BACKOFF_MS),
            start_delay: Duration::from_millis(proto::START_DELAY_MS),
            default_repeat_count: proto::DEFAULT_REPEAT_COUNT,
            outbound_capacity: proto::OUTBOUND_QUEUE_CAPACITY,
            inbound_capacity: proto::INBOUND_QUEUE_CAPACITY,
            receive_buffer_size: proto::RECEIVE_BUFFER_SIZE,
        }
    }
}

impl MulticastConfig {
    /// Where outbound datagrams are addressed.
    pub fn target(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.target_port)
    }
}
