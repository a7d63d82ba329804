use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Value held by every numeric field until the first heartbeat sets it.
pub const UNKNOWN: i32 = -1;

/// Last known state of one curtain motor.
/// Heartbeats are applied sparsely: a field absent from the frame keeps its
/// previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurtainMotor {
    /// Hex MAC as reported by the device (e.g. "483fda1eb16e")
    pub mac: String,
    /// Vendor device type code (e.g. "22000000")
    pub device_type: String,
    pub control_mode: i32,
    pub rssi: i32,
    /// Position 0-100
    pub current_position: i32,
    pub target_position: i32,
    pub current_state: i32,
    pub operation: i32,
    pub switch_mode: i32,
    pub direction: i32,
    /// Bit per `data` field a heartbeat has carried, in `DATA_FIELDS` order.
    /// A reported `-1` sets its bit; an `UNKNOWN` default does not.
    #[serde(skip)]
    reported: u8,
}

/// Wire names of the heartbeat `data` fields, in the order they are applied.
const DATA_FIELDS: [&str; 8] = [
    "controlMode",
    "RSSI",
    "currentPosition",
    "targetPosition",
    "currentState",
    "operation",
    "switchMode",
    "direction",
];

impl Default for CurtainMotor {
    fn default() -> Self {
        Self {
            mac: String::new(),
            device_type: String::new(),
            control_mode: UNKNOWN,
            rssi: UNKNOWN,
            current_position: UNKNOWN,
            target_position: UNKNOWN,
            current_state: UNKNOWN,
            operation: UNKNOWN,
            switch_mode: UNKNOWN,
            direction: UNKNOWN,
            reported: 0,
        }
    }
}

/// The `data` object of a heartbeat frame. Only the fields that were present
/// are `Some`; serializing skips the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_mode: Option<i32>,
    #[serde(rename = "RSSI", default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_mode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<i32>,
}

impl CurtainMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the fields of a heartbeat frame.
    ///
    /// Fields are written one at a time in a fixed order (`mac`,
    /// `deviceType`, then the `data` fields as listed in `DATA_FIELDS`),
    /// whatever their order on the wire. If a field has the wrong type the
    /// error is returned and every field written before it stays applied.
    pub fn apply_heartbeat(&mut self, message: &Map<String, Value>) -> Result<(), DecodeError> {
        if let Some(mac) = string_field(message, "mac")? {
            self.mac = mac.to_string();
        }
        if let Some(device_type) = string_field(message, "deviceType")? {
            self.device_type = device_type.to_string();
        }

        let data = match message.get("data") {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(data)) => data,
            Some(_) => {
                return Err(DecodeError::WrongType {
                    field: "data",
                    expected: "object",
                })
            }
        };

        let slots: [&mut i32; 8] = [
            &mut self.control_mode,
            &mut self.rssi,
            &mut self.current_position,
            &mut self.target_position,
            &mut self.current_state,
            &mut self.operation,
            &mut self.switch_mode,
            &mut self.direction,
        ];
        for (bit, (field, slot)) in DATA_FIELDS.into_iter().zip(slots).enumerate() {
            if let Some(value) = int_field(data, field)? {
                *slot = value;
                self.reported |= 1 << bit;
            }
        }

        Ok(())
    }

    /// Render the stored integers back into the wire `data` shape, leaving out
    /// fields no heartbeat has carried.
    pub fn heartbeat_data(&self) -> HeartbeatData {
        let known = |bit: u8, v: i32| (self.reported & (1 << bit) != 0).then_some(v);
        HeartbeatData {
            control_mode: known(0, self.control_mode),
            rssi: known(1, self.rssi),
            current_position: known(2, self.current_position),
            target_position: known(3, self.target_position),
            current_state: known(4, self.current_state),
            operation: known(5, self.operation),
            switch_mode: known(6, self.switch_mode),
            direction: known(7, self.direction),
        }
    }

    /// True once any heartbeat has identified the device.
    pub fn is_identified(&self) -> bool {
        !self.mac.is_empty()
    }
}

fn string_field<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn int_field(obj: &Map<String, Value>, field: &'static str) -> Result<Option<i32>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Some)
            .ok_or(DecodeError::WrongType {
                field,
                expected: "integer",
            }),
    }
}
