//! Wire protocol spoken by devices.
//!
//! Every inbound text frame carries one JSON object. A frame whose `TYPE`
//! is `DEVICE_INFO` announces the device:
//!
//! ```json
//! {"TYPE":"DEVICE_INFO","NAME":"pixel-7","PROCESS":"com.example.app"}
//! ```
//!
//! A frame without `TYPE` is a log event:
//!
//! ```json
//! {"logLevel":4,"tag":"net","timeMills":1700000000000,"message":"connected"}
//! ```

use devlog_store::{LogLevel, NewRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Key of the frame type marker.
pub const TYPE_KEY: &str = "TYPE";

/// Frame type of an identity announcement.
pub const DEVICE_INFO: &str = "DEVICE_INFO";

/// Identity announcement sent once after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device identity
    #[serde(rename = "NAME")]
    pub name: String,
    /// Process emitting the logs, if announced
    #[serde(rename = "PROCESS", default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
}

impl DeviceInfo {
    /// Creates an announcement.
    #[must_use]
    pub fn new(name: impl Into<String>, process: Option<String>) -> Self {
        Self {
            name: name.into(),
            process,
        }
    }
}

/// A single log line sent by an identified device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Raw severity ordinal
    pub log_level: i64,
    /// Short label
    pub tag: String,
    /// Epoch milliseconds on the device
    #[serde(rename = "timeMills", alias = "timeMillis")]
    pub time_millis: i64,
    /// Message body
    pub message: String,
}

impl LogEvent {
    /// Attaches the connection identity and validates the level.
    ///
    /// Over-long fields are truncated by [`NewRecord::new`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] if the level is not one of
    /// the stored severities.
    pub fn into_record(self, user: &str, process: &str) -> Result<NewRecord, ProtocolError> {
        let level =
            LogLevel::try_from(self.log_level).map_err(|e| ProtocolError::InvalidField {
                field: "logLevel",
                reason: e.to_string(),
            })?;
        Ok(NewRecord::new(
            user,
            process,
            level,
            self.tag,
            self.time_millis,
            self.message,
        ))
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Identity announcement.
    DeviceInfo(DeviceInfo),
    /// Log event.
    LogEvent(LogEvent),
}

impl InboundFrame {
    /// Decodes one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object of a known shape,
    /// carries an unknown `TYPE`, or announces an empty device name.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = match value.get(TYPE_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(kind)) => Some(kind.clone()),
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        match kind.as_deref() {
            None => Ok(Self::LogEvent(serde_json::from_value(value)?)),
            Some(DEVICE_INFO) => {
                let info: DeviceInfo = serde_json::from_value(value)?;
                if info.name.trim().is_empty() {
                    return Err(ProtocolError::InvalidField {
                        field: "NAME",
                        reason: "must not be empty".into(),
                    });
                }
                Ok(Self::DeviceInfo(info))
            }
            Some(other) => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    /// Encodes the frame the way a device sends it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let value = match self {
            Self::DeviceInfo(info) => {
                let mut value = serde_json::to_value(info)?;
                if let Value::Object(map) = &mut value {
                    map.insert(TYPE_KEY.to_string(), Value::String(DEVICE_INFO.to_string()));
                }
                value
            }
            Self::LogEvent(event) => serde_json::to_value(event)?,
        };
        Ok(value.to_string())
    }
}

/// Text sent to a device right after the handshake.
#[must_use]
pub fn greeting(connections: usize) -> String {
    format!("You are connected! There are {connections} users here.")
}
