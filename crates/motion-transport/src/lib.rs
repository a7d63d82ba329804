//! Multicast transport for Motion curtain motors.
//!
//! [`MulticastManager`] owns the single multicast socket, a bounded outbound
//! queue drained by the send worker, a bounded inbound queue filled by the
//! receive worker and drained by the consumer, and the supervisor that
//! rebuilds the socket whenever I/O on it fails.

pub mod address;
pub mod config;
mod consumer;
pub mod error;
pub mod health;
pub mod interfaces;
pub mod manager;
pub mod queue;
mod receiver;
pub mod scheduler;
mod sender;
pub mod transport;

pub use address::{AddressProvider, LocalAddressProvider};
pub use config::MulticastConfig;
pub use consumer::{dispatch, Dispatched};
pub use error::{StartError, TransportError, WorkerExit};
pub use health::{CountersSnapshot, TransportCounters};
pub use interfaces::{select_candidates, InterfaceCandidate};
pub use manager::{LinkState, MulticastManager};
pub use queue::{BoundedQueue, InboundQueue, OutboundQueue};
pub use scheduler::Scheduler;
pub use transport::{Transport, TransportFactory, UdpTransportFactory};
