//! Lifecycle and live parameter control of the hearing-assist pipeline.
//!
//! A [`PipelineController`] is either idle, holding nothing, or running, in
//! which case it exclusively owns one capture session, one output session, the
//! filter bank handles and the gain handle. Every start builds all of them
//! fresh; every stop releases all of them.

use std::fmt;

use serde::Serialize;

use crate::filter::{clamp_band_gain, Band, FilterBank};
use crate::gain::{volume_to_multiplier, GainStage};
use crate::graph::{GraphNode, SignalGraph};
use crate::host::{AudioHost, CaptureConstraints, CaptureSession, CpalHost, OutputSession};
use crate::settings::AudioSettings;
use crate::{AudioConfig, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Running => f.write_str("running"),
        }
    }
}

/// Live resources held by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub filters: usize,
    pub gain_stages: usize,
    pub capture_sessions: usize,
    pub output_sessions: usize,
}

/// Everything a running pipeline owns.
struct Pipeline<H: AudioHost> {
    capture: H::Capture,
    output: H::Output,
    bank: FilterBank,
    gain: GainStage,
    sample_rate: u32,
    topology: Vec<GraphNode>,
}

pub struct PipelineController<H: AudioHost> {
    host: H,
    constraints: CaptureConstraints,
    pipeline: Option<Pipeline<H>>,
}

impl PipelineController<CpalHost> {
    /// Controller over the platform's default audio devices.
    pub fn with_config(config: &AudioConfig) -> Self {
        Self::with_constraints(CpalHost::new(config), config.capture_constraints())
    }
}

impl<H: AudioHost> PipelineController<H> {
    /// Controller requesting raw capture at 44.1 kHz.
    pub fn new(host: H) -> Self {
        Self::with_constraints(host, CaptureConstraints::raw())
    }

    pub fn with_constraints(host: H, constraints: CaptureConstraints) -> Self {
        Self {
            host,
            constraints,
            pipeline: None,
        }
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    /// Acquires the capture device and builds the signal graph.
    ///
    /// The new graph starts with every band flat and the gain at the 30 %
    /// multiplier, whatever the previous run ended with. Calling this while
    /// running changes nothing. On error the controller stays idle and holds
    /// no resources.
    pub fn start(&mut self) -> Result<()> {
        if self.pipeline.is_some() {
            tracing::debug!("start ignored, pipeline already running");
            return Ok(());
        }

        let mut capture = self.host.open_capture(&self.constraints).map_err(|err| {
            tracing::warn!(%err, "failed to acquire capture device");
            err
        })?;
        let sample_rate = capture.sample_rate();
        if sample_rate != self.constraints.sample_rate {
            tracing::info!(
                requested = self.constraints.sample_rate,
                actual = sample_rate,
                "capture running at device rate"
            );
        }

        let bank = FilterBank::new();
        let gain = GainStage::default();
        let graph = SignalGraph::new(sample_rate, &bank, &gain);
        let topology = graph.topology();

        let output = match self.host.open_output(&mut capture, graph) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(%err, "failed to bind output, releasing capture");
                if let Err(release_err) = capture.release() {
                    tracing::warn!(err = %release_err, "failed to release capture");
                }
                return Err(err);
            }
        };

        tracing::info!(
            capture = capture.device_name(),
            output = output.device_name(),
            sample_rate,
            multiplier = gain.multiplier(),
            "pipeline running"
        );

        self.pipeline = Some(Pipeline {
            capture,
            output,
            bank,
            gain,
            sample_rate,
            topology,
        });
        Ok(())
    }

    /// Tears the graph down and releases both devices. Safe in any state.
    pub fn stop(&mut self) {
        let Some(pipeline) = self.pipeline.take() else {
            tracing::debug!("stop ignored, pipeline idle");
            return;
        };

        let Pipeline {
            capture,
            output,
            bank,
            gain,
            ..
        } = pipeline;

        if let Err(err) = output.release() {
            tracing::warn!(%err, "failed to release output");
        }
        if let Err(err) = capture.release() {
            tracing::warn!(%err, "failed to release capture");
        }
        drop(bank);
        drop(gain);

        tracing::info!("pipeline stopped");
    }

    /// Sets the output volume in percent. Out-of-range input is clamped so
    /// the multiplier never exceeds 2.0. Without a running pipeline the value
    /// is discarded.
    pub fn set_volume(&self, percent: f32) {
        let multiplier = volume_to_multiplier(percent);
        match &self.pipeline {
            Some(pipeline) => {
                pipeline.gain.set_multiplier(multiplier);
                tracing::debug!(percent, multiplier, "volume updated");
            }
            None => tracing::debug!(percent, "volume ignored, pipeline idle"),
        }
    }

    /// Sets one band's gain in dB, clamped to +/-12. Unknown frequencies and
    /// non-finite gains are ignored.
    pub fn set_band_gain(&self, frequency: u32, gain_db: f32) {
        let Some(band) = Band::from_hz(frequency) else {
            tracing::debug!(frequency, "no band at this frequency");
            return;
        };
        let Some(gain_db) = clamp_band_gain(gain_db) else {
            tracing::debug!(%band, gain_db, "non-finite band gain ignored");
            return;
        };
        match &self.pipeline {
            Some(pipeline) => {
                pipeline.bank.set_gain_db(band, gain_db);
                tracing::debug!(%band, gain_db, "band gain updated");
            }
            None => tracing::debug!(%band, "band gain ignored, pipeline idle"),
        }
    }

    /// Applies `(frequency, gain_db)` pairs, skipping unknown frequencies.
    pub fn set_equalizer<I>(&self, gains: I)
    where
        I: IntoIterator<Item = (u32, f32)>,
    {
        for (frequency, gain_db) in gains {
            self.set_band_gain(frequency, gain_db);
        }
    }

    /// Pushes the volume and every band gain of `settings` to the live graph.
    pub fn apply_settings(&self, settings: &AudioSettings) {
        self.set_volume(settings.volume as f32);
        self.set_equalizer(
            settings
                .band_gains
                .iter()
                .map(|(band, gain_db)| (band.hz(), gain_db)),
        );
    }

    pub fn state(&self) -> PipelineState {
        if self.pipeline.is_some() {
            PipelineState::Running
        } else {
            PipelineState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Current gain multiplier, if running.
    pub fn multiplier(&self) -> Option<f32> {
        self.pipeline.as_ref().map(|pipeline| pipeline.gain.multiplier())
    }

    pub fn band_gain(&self, frequency: u32) -> Option<f32> {
        let band = Band::from_hz(frequency)?;
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.bank.gain_db(band))
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.pipeline.as_ref().map(|pipeline| pipeline.sample_rate)
    }

    pub fn capture_device(&self) -> Option<&str> {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.capture.device_name())
    }

    /// Node order of the live graph; empty while idle.
    pub fn topology(&self) -> Vec<GraphNode> {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.topology.clone())
            .unwrap_or_default()
    }

    pub fn resources(&self) -> ResourceUsage {
        match &self.pipeline {
            Some(pipeline) => ResourceUsage {
                filters: pipeline.bank.len(),
                gain_stages: 1,
                capture_sessions: 1,
                output_sessions: 1,
            },
            None => ResourceUsage::default(),
        }
    }
}

impl<H: AudioHost> Drop for PipelineController<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<H: AudioHost> fmt::Debug for PipelineController<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineController")
            .field("state", &self.state())
            .field("constraints", &self.constraints)
            .field("resources", &self.resources())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::HearingError;

    #[derive(Default)]
    struct MockState {
        capture_rate: u32,
        deny_capture: bool,
        deny_output: bool,
        fail_release: bool,
        captures_opened: usize,
        captures_live: usize,
        outputs_live: usize,
        last_constraints: Option<CaptureConstraints>,
        graph: Option<SignalGraph>,
    }

    #[derive(Clone)]
    struct MockHost {
        state: Arc<Mutex<MockState>>,
    }

    impl MockHost {
        fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    capture_rate: 44_100,
                    ..MockState::default()
                })),
            }
        }

        fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }

        /// Runs `block` through the graph the output sink currently holds.
        fn render(&self, block: &mut [f32]) {
            self.with(|state| {
                state
                    .graph
                    .as_mut()
                    .expect("no graph bound to output")
                    .process(block)
            });
        }
    }

    struct MockCapture {
        state: Arc<Mutex<MockState>>,
        sample_rate: u32,
    }

    impl CaptureSession for MockCapture {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn device_name(&self) -> &str {
            "mock microphone"
        }

        fn release(self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.captures_live -= 1;
            if state.fail_release {
                return Err(HearingError::msg("capture release failed"));
            }
            Ok(())
        }
    }

    struct MockOutput {
        state: Arc<Mutex<MockState>>,
    }

    impl OutputSession for MockOutput {
        fn device_name(&self) -> &str {
            "mock headphones"
        }

        fn release(self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.outputs_live -= 1;
            state.graph = None;
            if state.fail_release {
                return Err(HearingError::msg("output release failed"));
            }
            Ok(())
        }
    }

    impl AudioHost for MockHost {
        type Capture = MockCapture;
        type Output = MockOutput;

        fn open_capture(&mut self, constraints: &CaptureConstraints) -> Result<MockCapture> {
            let mut state = self.state.lock().unwrap();
            state.last_constraints = Some(constraints.clone());
            if state.deny_capture {
                return Err(HearingError::capture_unavailable("permission denied"));
            }
            state.captures_opened += 1;
            state.captures_live += 1;
            Ok(MockCapture {
                state: Arc::clone(&self.state),
                sample_rate: state.capture_rate,
            })
        }

        fn open_output(
            &mut self,
            _capture: &mut MockCapture,
            graph: SignalGraph,
        ) -> Result<MockOutput> {
            let mut state = self.state.lock().unwrap();
            if state.deny_output {
                return Err(HearingError::output_unavailable("no headphones"));
            }
            state.outputs_live += 1;
            state.graph = Some(graph);
            Ok(MockOutput {
                state: Arc::clone(&self.state),
            })
        }
    }

    fn controller() -> (PipelineController<MockHost>, MockHost) {
        let host = MockHost::new();
        (PipelineController::new(host.clone()), host)
    }

    fn assert_close(actual: Option<f32>, expected: f32) {
        let actual = actual.expect("pipeline should be running");
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn start_builds_full_graph_at_safe_volume() {
        let (mut controller, host) = controller();
        controller.start().unwrap();

        assert_eq!(controller.state(), PipelineState::Running);
        assert_close(controller.multiplier(), 0.6);
        for band in Band::ALL {
            assert_eq!(controller.band_gain(band.hz()), Some(0.0));
        }

        let mut expected = vec![GraphNode::Capture];
        expected.extend(Band::ALL.map(GraphNode::Filter));
        expected.extend([GraphNode::Gain, GraphNode::Output]);
        assert_eq!(controller.topology(), expected);

        assert_eq!(
            controller.resources(),
            ResourceUsage {
                filters: 6,
                gain_stages: 1,
                capture_sessions: 1,
                output_sessions: 1,
            }
        );
        assert_eq!(controller.sample_rate(), Some(44_100));
        assert_eq!(controller.capture_device(), Some("mock microphone"));
        host.with(|state| {
            assert_eq!(state.last_constraints, Some(CaptureConstraints::raw()));
            assert_eq!((state.captures_live, state.outputs_live), (1, 1));
        });
    }

    #[test]
    fn start_while_running_keeps_existing_graph() {
        let (mut controller, host) = controller();
        controller.start().unwrap();
        controller.set_volume(50.0);
        controller.set_band_gain(4_000, -3.0);

        controller.start().unwrap();

        assert_close(controller.multiplier(), 1.0);
        assert_eq!(controller.band_gain(4_000), Some(-3.0));
        host.with(|state| assert_eq!(state.captures_opened, 1));
    }

    #[test]
    fn stop_is_idempotent_from_any_state() {
        let (mut controller, host) = controller();
        controller.stop();
        assert_eq!(controller.state(), PipelineState::Idle);

        controller.start().unwrap();
        controller.stop();
        controller.stop();

        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(controller.resources(), ResourceUsage::default());
        assert!(controller.topology().is_empty());
        assert_eq!(controller.multiplier(), None);
        host.with(|state| {
            assert_eq!((state.captures_live, state.outputs_live), (0, 0));
            assert!(state.graph.is_none());
        });
    }

    #[test]
    fn volume_is_clamped_to_the_safety_ceiling() {
        let (mut controller, _host) = controller();
        controller.start().unwrap();

        controller.set_volume(150.0);
        assert_close(controller.multiplier(), 2.0);
        controller.set_volume(100.0);
        assert_close(controller.multiplier(), 2.0);
        controller.set_volume(45.0);
        assert_close(controller.multiplier(), 0.9);
        controller.set_volume(-10.0);
        assert_close(controller.multiplier(), 0.0);
        controller.set_volume(f32::NAN);
        assert_close(controller.multiplier(), 0.0);
    }

    #[test]
    fn band_gain_is_clamped_and_isolated() {
        let (mut controller, _host) = controller();
        controller.start().unwrap();

        controller.set_band_gain(1_000, 20.0);
        assert_eq!(controller.band_gain(1_000), Some(12.0));
        controller.set_band_gain(250, -40.0);
        assert_eq!(controller.band_gain(250), Some(-12.0));

        for hz in [500, 2_000, 4_000, 8_000] {
            assert_eq!(controller.band_gain(hz), Some(0.0), "{hz} Hz");
        }
    }

    #[test]
    fn unknown_band_and_non_finite_gain_change_nothing() {
        let (mut controller, _host) = controller();
        controller.start().unwrap();
        controller.set_band_gain(2_000, 4.0);
        let before: Vec<_> = Band::ALL
            .iter()
            .map(|band| controller.band_gain(band.hz()))
            .collect();

        controller.set_band_gain(1_500, 6.0);
        controller.set_band_gain(2_000, f32::NAN);

        let after: Vec<_> = Band::ALL
            .iter()
            .map(|band| controller.band_gain(band.hz()))
            .collect();
        assert_eq!(before, after);
        assert_eq!(controller.band_gain(1_500), None);
    }

    #[test]
    fn default_settings_scenario() {
        let (mut controller, _host) = controller();
        controller.start().unwrap();
        controller.apply_settings(&AudioSettings::default());

        assert_close(controller.multiplier(), 0.6);
        for (hz, expected) in [
            (250, 0.0),
            (500, 6.0),
            (1_000, 0.0),
            (2_000, 6.0),
            (4_000, 0.0),
            (8_000, 6.0),
        ] {
            assert_eq!(controller.band_gain(hz), Some(expected), "{hz} Hz");
        }
    }

    #[test]
    fn set_equalizer_skips_unknown_frequencies() {
        let (mut controller, _host) = controller();
        controller.start().unwrap();
        controller.set_equalizer([(500, 3.0), (3_000, 9.0), (8_000, -2.5)]);

        assert_eq!(controller.band_gain(500), Some(3.0));
        assert_eq!(controller.band_gain(8_000), Some(-2.5));
        assert_eq!(controller.band_gain(2_000), Some(0.0));
    }

    #[test]
    fn updates_while_idle_are_discarded() {
        let (mut controller, _host) = controller();
        controller.set_volume(100.0);
        controller.set_band_gain(500, 9.0);
        assert_eq!(controller.multiplier(), None);

        controller.start().unwrap();
        assert_close(controller.multiplier(), 0.6);
        assert_eq!(controller.band_gain(500), Some(0.0));
    }

    #[test]
    fn restart_builds_a_fresh_graph() {
        let (mut controller, _host) = controller();
        controller.start().unwrap();
        controller.set_volume(90.0);
        controller.set_band_gain(250, 8.0);
        controller.stop();

        controller.start().unwrap();
        assert_close(controller.multiplier(), 0.6);
        assert_eq!(controller.band_gain(250), Some(0.0));
    }

    #[test]
    fn repeated_cycles_leak_nothing() {
        let (mut controller, host) = controller();
        for cycle in 0..50 {
            controller.start().unwrap();
            assert_eq!(controller.resources().capture_sessions, 1, "cycle {cycle}");
            controller.stop();
            host.with(|state| {
                assert_eq!(state.captures_live, 0, "cycle {cycle}");
                assert_eq!(state.outputs_live, 0, "cycle {cycle}");
                assert!(state.graph.is_none());
            });
        }
        host.with(|state| assert_eq!(state.captures_opened, 50));
    }

    #[test]
    fn denied_capture_leaves_controller_idle() {
        let (mut controller, host) = controller();
        host.with(|state| state.deny_capture = true);

        let err = controller.start().unwrap_err();
        assert!(err.is_capture_unavailable());
        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(controller.resources(), ResourceUsage::default());

        controller.stop();
        assert_eq!(controller.state(), PipelineState::Idle);

        host.with(|state| state.deny_capture = false);
        controller.start().unwrap();
        assert!(controller.is_running());
    }

    #[test]
    fn output_failure_releases_capture() {
        let (mut controller, host) = controller();
        host.with(|state| state.deny_output = true);

        let err = controller.start().unwrap_err();
        assert!(matches!(err, HearingError::OutputUnavailable(_)));
        assert_eq!(controller.state(), PipelineState::Idle);
        host.with(|state| {
            assert_eq!(state.captures_opened, 1);
            assert_eq!(state.captures_live, 0);
        });
    }

    #[test]
    fn release_failures_still_reach_idle() {
        let (mut controller, host) = controller();
        controller.start().unwrap();
        host.with(|state| state.fail_release = true);

        controller.stop();
        assert_eq!(controller.state(), PipelineState::Idle);
        host.with(|state| {
            assert_eq!((state.captures_live, state.outputs_live), (0, 0));
        });
    }

    #[test]
    fn parameter_writes_reach_the_rendered_audio() {
        let (mut controller, host) = controller();
        controller.start().unwrap();

        controller.set_volume(100.0);
        let mut block = [0.25_f32; 64];
        host.render(&mut block);
        assert!(block.iter().all(|sample| (sample - 0.5).abs() < 1e-5));

        controller.set_volume(0.0);
        let mut block = [0.25_f32; 64];
        host.render(&mut block);
        assert!(block.iter().all(|sample| *sample == 0.0));
    }

    #[test]
    fn graph_follows_device_sample_rate() {
        let (mut controller, host) = controller();
        host.with(|state| state.capture_rate = 48_000);
        controller.start().unwrap();

        assert_eq!(controller.sample_rate(), Some(48_000));
        host.with(|state| {
            assert_eq!(state.graph.as_ref().map(SignalGraph::sample_rate), Some(48_000));
        });
    }

    #[test]
    fn volume_written_while_audio_thread_renders() {
        let (mut controller, host) = controller();
        controller.start().unwrap();
        controller.set_volume(100.0);

        let renderer = host.clone();
        let audio = std::thread::spawn(move || {
            let mut loud_blocks = 0_usize;
            loop {
                let mut block = [0.25_f32; 128];
                renderer.render(&mut block);
                if block.iter().all(|sample| *sample == 0.0) {
                    return loud_blocks;
                }
                // Each block sees exactly one multiplier.
                assert!(block.iter().all(|sample| (sample - 0.5).abs() < 1e-5));
                loud_blocks += 1;
                std::thread::yield_now();
            }
        });

        std::thread::sleep(std::time::Duration::from_millis(5));
        controller.set_volume(0.0);

        let loud_blocks = audio.join().unwrap();
        assert!(loud_blocks > 0);
        assert_close(controller.multiplier(), 0.0);
    }

    #[test]
    fn dropping_the_controller_stops_it() {
        let (mut controller, host) = controller();
        controller.start().unwrap();
        drop(controller);

        host.with(|state| {
            assert_eq!((state.captures_live, state.outputs_live), (0, 0));
        });
    }
}
