pub mod curtain_motor;
pub mod error;
pub mod message;
pub mod registry;

pub use curtain_motor::{CurtainMotor, HeartbeatData};
pub use error::DecodeError;
pub use message::{InboundMessage, MessageType, OutboundPacket};
pub use registry::{DeviceRegistry, HeartbeatSink};

use std::net::Ipv4Addr;

/// Multicast group every motor and gateway listens on
pub const MULTICAST_GROUP_ADDR: Ipv4Addr = Ipv4Addr::new(238, 0, 0, 18);
/// `MULTICAST_GROUP_ADDR` in text form, for config defaults
pub const MULTICAST_GROUP: &str = "238.0.0.18";

/// Local port the bridge binds and joins the group on
pub const BIND_PORT: u16 = 32101;
/// Port outbound requests are addressed to
pub const TARGET_PORT: u16 = 32100;

/// Multicast TTL for outbound datagrams
pub const MULTICAST_TTL: u32 = 5;

/// Send defaults
pub const DEFAULT_REPEAT_COUNT: u32 = 3;
pub const REPEAT_DELAY_MS: u64 = 500;

/// Transport lifecycle timing
pub const START_DELAY_MS: u64 = 5;
pub const RESTART_BACKOFF_MS: u64 = 1000;

/// Queue and buffer sizes
pub const OUTBOUND_QUEUE_CAPACITY: usize = 50;
pub const INBOUND_QUEUE_CAPACITY: usize = 100;
pub const RECEIVE_BUFFER_SIZE: usize = 102_400;

/// Periodic device ping sent by the service
pub const POLL_INTERVAL_SECS: u64 = 5;
pub const POLL_PAYLOAD: &str = r#"{"":""}"#;
