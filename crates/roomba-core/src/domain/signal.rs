//! Wi-Fi signal quality and its publish hysteresis.
//!
//! RSSI is reported often and is noisy; a new quality value is published
//! only when it moves more than [`QUALITY_HYSTERESIS`] points away from the
//! last *published* value.

/// Minimum change, in percentage points, that triggers a publish.
pub const QUALITY_HYSTERESIS: u8 = 15;

/// Converts RSSI in dBm to a 0–100 quality: `clamp(2 * (rssi + 100), 0, 100)`.
pub fn rssi_to_quality(rssi: f64) -> u8 {
    let quality = (2.0 * (rssi + 100.0)).clamp(0.0, 100.0);
    // Truncation matches the integer conversion the hub expects.
    quality as u8
}

/// Quality tracking for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalQualityState {
    last_published: Option<u8>,
    latest: Option<u8>,
}

impl SignalQualityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a reading and returns the value to publish, if any.
    ///
    /// The first reading is always published.
    pub fn observe(&mut self, quality: u8) -> Option<u8> {
        self.latest = Some(quality);
        let publish = match self.last_published {
            None => true,
            Some(previous) => quality.abs_diff(previous) > QUALITY_HYSTERESIS,
        };
        if publish {
            self.last_published = Some(quality);
            Some(quality)
        } else {
            None
        }
    }

    pub fn last_published(&self) -> Option<u8> {
        self.last_published
    }

    pub fn latest(&self) -> Option<u8> {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rssi_to_quality_formula_and_clamp() {
        assert_eq!(rssi_to_quality(-100.0), 0);
        assert_eq!(rssi_to_quality(-120.0), 0);
        assert_eq!(rssi_to_quality(-75.0), 50);
        assert_eq!(rssi_to_quality(-50.0), 100);
        assert_eq!(rssi_to_quality(0.0), 100);
        assert_eq!(rssi_to_quality(-62.5), 75);
    }

    #[test]
    fn test_rssi_to_quality_is_monotonic() {
        let mut previous = 0;
        for rssi in -100..=0 {
            let q = rssi_to_quality(f64::from(rssi));
            assert!(q >= previous, "quality dropped at rssi {rssi}");
            previous = q;
        }
    }

    #[test]
    fn test_first_reading_is_published() {
        let mut state = SignalQualityState::new();
        assert_eq!(state.observe(4), Some(4));
        assert_eq!(state.last_published(), Some(4));
    }

    #[test]
    fn test_identical_readings_publish_once() {
        let mut state = SignalQualityState::new();
        assert_eq!(state.observe(60), Some(60));
        for _ in 0..10 {
            assert_eq!(state.observe(60), None);
        }
    }

    #[test]
    fn test_publish_only_beyond_hysteresis() {
        let mut state = SignalQualityState::new();
        state.observe(50);
        assert_eq!(state.observe(65), None);
        assert_eq!(state.observe(35), None);
        assert_eq!(state.observe(66), Some(66));
        assert_eq!(state.observe(50), Some(50));
    }

    #[test]
    fn test_baseline_is_last_published_not_last_read() {
        let mut state = SignalQualityState::new();
        state.observe(50);
        // Two 10-point moves: neither exceeds 15 from the published 50,
        // even though the second is 20 away from the previous reading.
        assert_eq!(state.observe(60), None);
        assert_eq!(state.observe(40), None);
        assert_eq!(state.latest(), Some(40));
        assert_eq!(state.last_published(), Some(50));
    }
}
