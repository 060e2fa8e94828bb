use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
use crate::error::{Error, Result};

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SessionConfig {
    pub stop: StopConfig,
    pub watchdog: WatchdogConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct StopConfig {
    /// How long `stop` waits for the stopped user to acknowledge.
    #[cfg_attr(feature = "serde", serde(rename = "ack_timeout_ms", with = "millis"))]
    pub ack_timeout: Duration,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct WatchdogConfig {
    /// Period between checksum broadcasts from the host.
    #[cfg_attr(feature = "serde", serde(rename = "interval_ms", with = "millis"))]
    pub interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_WATCHDOG_INTERVAL,
        }
    }
}

#[cfg(feature = "serde")]
impl SessionConfig {
    /// Parses a JSON config; missing fields fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
