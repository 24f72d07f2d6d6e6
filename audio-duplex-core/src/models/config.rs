use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::DuplexError;

/// Enumerated latency/stability trade-off.
///
/// Each preset bundles the ring buffer duration (added latency ceiling) with
/// the hardware period requested from the OS streams. Small buffers mean low
/// delay but little headroom for scheduling jitter; large buffers ride out
/// Bluetooth stutter and OS hiccups at the cost of audible delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyPreset {
    /// ~20 ms buffer, 5 ms period.
    Lowest,
    /// ~50 ms buffer, 10 ms period.
    Low,
    /// ~100 ms buffer, 20 ms period.
    Balanced,
    /// ~250 ms buffer, 50 ms period.
    High,
    /// ~500 ms buffer, 100 ms period.
    Highest,
}

impl LatencyPreset {
    /// Map a 1..=5 level (as exposed by UI/CLI layers) to a preset.
    pub fn from_level(level: u8) -> Result<Self, DuplexError> {
        match level {
            1 => Ok(Self::Lowest),
            2 => Ok(Self::Low),
            3 => Ok(Self::Balanced),
            4 => Ok(Self::High),
            5 => Ok(Self::Highest),
            other => Err(DuplexError::InvalidConfiguration(format!(
                "latency preset level out of range: {other}"
            ))),
        }
    }

    /// Total ring buffer duration.
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(match self {
            Self::Lowest => 20,
            Self::Low => 50,
            Self::Balanced => 100,
            Self::High => 250,
            Self::Highest => 500,
        })
    }

    /// Hardware period requested from the OS streams.
    pub fn stream_period(&self) -> Duration {
        Duration::from_millis(match self {
            Self::Lowest => 5,
            Self::Low => 10,
            Self::Balanced => 20,
            Self::High => 50,
            Self::Highest => 100,
        })
    }
}

impl Default for LatencyPreset {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Configuration for a duplication session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Opaque OS id of the device to capture from (loopback when it is a
    /// render endpoint, direct capture when it is a capture endpoint).
    pub source_id: String,

    /// Opaque OS id of the device to play the duplicate onto.
    pub destination_id: String,

    /// Latency/stability trade-off for buffer sizing and stream periods.
    pub latency: LatencyPreset,
}

impl SessionConfig {
    pub fn new(source_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            latency: LatencyPreset::default(),
        }
    }

    pub fn with_latency(mut self, latency: LatencyPreset) -> Self {
        self.latency = latency;
        self
    }

    pub fn validate(&self) -> Result<(), DuplexError> {
        if self.source_id.is_empty() {
            return Err(DuplexError::InvalidConfiguration(
                "source device id is not set".into(),
            ));
        }
        if self.destination_id.is_empty() {
            return Err(DuplexError::InvalidConfiguration(
                "destination device id is not set".into(),
            ));
        }
        if self.source_id == self.destination_id {
            return Err(DuplexError::InvalidConfiguration(
                "source and destination must be distinct devices".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_mapping() {
        assert_eq!(LatencyPreset::from_level(1).unwrap(), LatencyPreset::Lowest);
        assert_eq!(LatencyPreset::from_level(5).unwrap(), LatencyPreset::Highest);
        assert!(LatencyPreset::from_level(0).is_err());
        assert!(LatencyPreset::from_level(6).is_err());
    }

    #[test]
    fn presets_span_spec_range() {
        assert_eq!(LatencyPreset::Lowest.buffer_duration(), Duration::from_millis(20));
        assert_eq!(LatencyPreset::Highest.buffer_duration(), Duration::from_millis(500));
        // Period never exceeds the buffer it feeds.
        for level in 1..=5 {
            let p = LatencyPreset::from_level(level).unwrap();
            assert!(p.stream_period() < p.buffer_duration());
        }
    }

    #[test]
    fn validate_rejects_empty_ids() {
        assert!(SessionConfig::new("X", "").validate().is_err());
        assert!(SessionConfig::new("", "Y").validate().is_err());
        assert!(SessionConfig::new("X", "X").validate().is_err());
        assert!(SessionConfig::new("X", "Y").validate().is_ok());
    }
}
