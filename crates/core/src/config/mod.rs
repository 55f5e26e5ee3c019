use serde::{Deserialize, Serialize};

use crate::host::{CaptureConstraints, REQUESTED_SAMPLE_RATE};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate requested from the capture device.
    pub sample_rate: u32,
    /// Depth of the capture-to-output ring buffer.
    pub latency_ms: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl AudioConfig {
    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
            auto_gain_control: self.auto_gain_control,
            sample_rate: self.sample_rate,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: REQUESTED_SAMPLE_RATE,
            latency_ms: 50,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }
}
