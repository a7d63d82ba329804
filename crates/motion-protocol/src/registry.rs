/// Device registry: the sink decoded heartbeats are delivered to.
/// One `CurtainMotor` is kept per MAC address for the lifetime of the process.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::info;

use crate::curtain_motor::CurtainMotor;
use crate::error::DecodeError;

/// Receives heartbeat frames from the transport's consumer task.
pub trait HeartbeatSink: Send + Sync {
    /// Apply one decoded heartbeat object. An error means the frame was (at
    /// least partly) unusable; the caller logs it and moves on.
    fn on_heartbeat(&self, message: &Map<String, Value>) -> Result<(), DecodeError>;
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, CurtainMotor>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mac: &str) -> Option<CurtainMotor> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mac)
            .cloned()
    }

    /// All tracked motors, ordered by MAC.
    pub fn snapshot(&self) -> Vec<CurtainMotor> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HeartbeatSink for DeviceRegistry {
    fn on_heartbeat(&self, message: &Map<String, Value>) -> Result<(), DecodeError> {
        let mac = match message.get("mac") {
            Some(Value::String(mac)) if !mac.is_empty() => mac.clone(),
            _ => return Err(DecodeError::MissingMac),
        };

        let mut devices = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let motor = devices.entry(mac).or_insert_with_key(|mac| {
            info!(mac = %mac, "New curtain motor discovered");
            CurtainMotor::new()
        });
        motor.apply_heartbeat(message)
    }
}
