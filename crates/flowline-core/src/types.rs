use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Payload carried by events, activity completions and data objects
///
/// This is a wrapper around a JSON value with a few helpers for
/// reading it back in typed form.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DataPacket {
    /// The inner JSON value
    pub value: serde_json::Value,
}

impl DataPacket {
    /// Create a new data packet from a JSON value
    #[inline]
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Create a null data packet
    #[inline]
    pub fn null() -> Self {
        Self {
            value: serde_json::Value::Null,
        }
    }

    /// Get the inner JSON value
    #[inline]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Take ownership of the inner JSON value
    #[inline]
    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Check if the data packet is null
    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Try to read the packet as a string
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Try to read the packet as a number
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// Try to read the packet as a boolean
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    /// Extract a top-level field of an object payload
    pub fn field(&self, name: &str) -> Option<DataPacket> {
        self.value.get(name).cloned().map(Self::new)
    }

    /// Try to convert the data packet to a specific type
    pub fn to<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value(self.value.clone())
    }

    /// Create a data packet from a serializable value
    pub fn from_serializable<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
    {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Create a data packet holding a string
    #[inline]
    pub fn from_string(s: &str) -> Self {
        Self::new(serde_json::Value::String(s.to_string()))
    }
}

impl From<serde_json::Value> for DataPacket {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// Log level for activity logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - very detailed information
    Trace,
    /// Debug level - debug information
    Debug,
    /// Info level - general information
    Info,
    /// Warn level - warnings
    Warn,
    /// Error level - errors
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::TRACE {
            LogLevel::Trace
        } else if level == tracing::Level::DEBUG {
            LogLevel::Debug
        } else if level == tracing::Level::INFO {
            LogLevel::Info
        } else if level == tracing::Level::WARN {
            LogLevel::Warn
        } else {
            LogLevel::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_data_packet_field() {
        let packet = DataPacket::new(json!({"amount": 10, "currency": "EUR"}));
        assert_eq!(packet.field("amount"), Some(DataPacket::new(json!(10))));
        assert_eq!(packet.field("missing"), None);
        assert_eq!(DataPacket::from_string("x").field("amount"), None);
    }

    #[test]
    fn test_data_packet_typed_conversion() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Order {
            id: u32,
            total: f64,
        }

        let order = Order { id: 7, total: 12.5 };
        let packet = DataPacket::from_serializable(&order).unwrap();
        assert_eq!(packet.as_value()["id"], 7);

        let back: Order = packet.to().unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn test_data_packet_default_is_null() {
        assert!(DataPacket::default().is_null());
        assert_eq!(DataPacket::default(), DataPacket::null());
    }

    #[test]
    fn test_log_level_round_trip_through_tracing() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            let tracing_level: tracing::Level = level.into();
            assert_eq!(LogLevel::from(tracing_level), level);
        }
    }
}
