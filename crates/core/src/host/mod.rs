//! Seam between the pipeline controller and the host audio subsystem.
//!
//! The controller never touches samples. It asks an [`AudioHost`] for a
//! capture session, hands it a [`SignalGraph`] to run between capture and the
//! default output, and later releases both sessions.

mod cpal_host;

use serde::{Deserialize, Serialize};

use crate::{Result, SignalGraph};

pub use cpal_host::{CpalCapture, CpalHost, CpalOutput};

/// Sample rate requested from the capture device.
pub const REQUESTED_SAMPLE_RATE: u32 = 44_100;

/// What the pipeline asks of the capture device.
///
/// The application wants raw ambient sound: its own equaliser and gain stage
/// are the only processing applied, so device-side processing is off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
}

impl CaptureConstraints {
    /// Unprocessed capture at [`REQUESTED_SAMPLE_RATE`].
    pub fn raw() -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            sample_rate: REQUESTED_SAMPLE_RATE,
        }
    }

    pub fn requests_device_processing(&self) -> bool {
        self.echo_cancellation || self.noise_suppression || self.auto_gain_control
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::raw()
    }
}

/// An acquired capture device. Dropping it must also release the device, but
/// the controller always calls [`release`](CaptureSession::release).
pub trait CaptureSession {
    /// Rate the device actually runs at, which may differ from the request.
    fn sample_rate(&self) -> u32;

    fn device_name(&self) -> &str;

    fn release(self) -> Result<()>;
}

/// A bound output sink running the signal graph.
pub trait OutputSession {
    fn device_name(&self) -> &str;

    fn release(self) -> Result<()>;
}

/// Host audio subsystem.
pub trait AudioHost {
    type Capture: CaptureSession;
    type Output: OutputSession;

    /// Acquires the default capture device.
    ///
    /// Fails with [`HearingError::CaptureUnavailable`] when no device exists
    /// or access is refused. May block while the platform asks the user for
    /// permission.
    ///
    /// [`HearingError::CaptureUnavailable`]: crate::HearingError::CaptureUnavailable
    fn open_capture(&mut self, constraints: &CaptureConstraints) -> Result<Self::Capture>;

    /// Connects `capture` through `graph` to the default output device and
    /// starts audio flowing. The graph is moved onto the audio thread.
    fn open_output(
        &mut self,
        capture: &mut Self::Capture,
        graph: SignalGraph,
    ) -> Result<Self::Output>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_constraints_disable_device_processing() {
        let constraints = CaptureConstraints::raw();
        assert!(!constraints.requests_device_processing());
        assert_eq!(constraints.sample_rate, 44_100);
        assert_eq!(constraints, CaptureConstraints::default());
    }
}
