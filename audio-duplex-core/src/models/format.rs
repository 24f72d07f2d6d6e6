use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Negotiated PCM stream format.
///
/// Fixed for the lifetime of one start/stop cycle; a format change under an
/// active stream is a fault, never a renegotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Bits per sample (16, 24, or 32).
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// A format a stream can actually carry: non-zero rate and channel count,
    /// whole-byte sample width. Backends can report degenerate formats for
    /// half-initialized or misbehaving drivers; callers gate on this before
    /// deriving buffer sizes from the format.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0
            && self.channels > 0
            && self.bits_per_sample > 0
            && self.bits_per_sample % 8 == 0
    }

    /// Bytes per interleaved frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Bytes per second of audio in this format.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    /// Bytes covering `duration` of audio, rounded up to a whole frame.
    pub fn bytes_for_duration(&self, duration: Duration) -> usize {
        let frame = self.bytes_per_frame().max(1);
        let raw = (self.bytes_per_second() as u128 * duration.as_millis()) / 1000;
        let raw = raw as usize;
        raw.div_ceil(frame) * frame
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_48k() -> AudioFormat {
        AudioFormat {
            sample_rate: 48_000,
            channels: 2,
            bits_per_sample: 32,
        }
    }

    #[test]
    fn validity_rejects_degenerate_formats() {
        assert!(stereo_48k().is_valid());
        assert!(!AudioFormat { sample_rate: 0, ..stereo_48k() }.is_valid());
        assert!(!AudioFormat { channels: 0, ..stereo_48k() }.is_valid());
        assert!(!AudioFormat { bits_per_sample: 0, ..stereo_48k() }.is_valid());
        assert!(!AudioFormat { bits_per_sample: 12, ..stereo_48k() }.is_valid());
    }

    #[test]
    fn frame_and_rate_math() {
        let fmt = stereo_48k();
        assert_eq!(fmt.bytes_per_frame(), 8);
        assert_eq!(fmt.bytes_per_second(), 384_000);
    }

    #[test]
    fn duration_rounds_up_to_frame() {
        let fmt = AudioFormat {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
        };
        let bytes = fmt.bytes_for_duration(Duration::from_millis(100));
        assert_eq!(bytes % fmt.bytes_per_frame(), 0);
        // 44100 * 4 bytes/s * 0.1s = 17640 exactly
        assert_eq!(bytes, 17_640);
    }

    #[test]
    fn duration_zero_is_zero() {
        assert_eq!(stereo_48k().bytes_for_duration(Duration::ZERO), 0);
    }
}
