use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig, SupportedStreamConfigRange,
};
use rtrb::{Consumer, Producer, RingBuffer};

use super::{AudioHost, CaptureConstraints, CaptureSession, OutputSession};
use crate::{AudioConfig, HearingError, Result, SignalGraph};

/// Smallest capture ring, in mono samples, regardless of configured latency.
const MIN_RING_CAPACITY: usize = 1_024;

/// Largest block, in frames, handed to the signal graph in one call.
const MAX_BLOCK_FRAMES: usize = 4_096;

/// [`AudioHost`] backed by the platform's default `cpal` host.
///
/// Capture frames are down-mixed to mono in the input callback and pushed into
/// a lock-free ring. The output callback drains the ring, runs the signal
/// graph and copies the result onto every output channel.
pub struct CpalHost {
    host: cpal::Host,
    latency_ms: u32,
}

impl CpalHost {
    pub fn new(config: &AudioConfig) -> Self {
        let host = cpal::default_host();
        tracing::debug!(host = ?host.id(), latency_ms = config.latency_ms, "using cpal host");
        Self {
            host,
            latency_ms: config.latency_ms,
        }
    }

    fn ring_capacity(&self, sample_rate: u32) -> usize {
        let samples = sample_rate as usize * self.latency_ms as usize / 1_000;
        samples.max(MIN_RING_CAPACITY)
    }
}

impl fmt::Debug for CpalHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalHost")
            .field("host", &self.host.id())
            .field("latency_ms", &self.latency_ms)
            .finish()
    }
}

impl AudioHost for CpalHost {
    type Capture = CpalCapture;
    type Output = CpalOutput;

    fn open_capture(&mut self, constraints: &CaptureConstraints) -> Result<CpalCapture> {
        if constraints.requests_device_processing() {
            tracing::warn!(
                ?constraints,
                "cpal exposes raw device input; requested device processing is not applied"
            );
        }

        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| HearingError::capture_unavailable("no default input device"))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown input".to_string());

        let ranges = device
            .supported_input_configs()
            .map_err(|err| HearingError::capture_unavailable(err.to_string()))?;
        let supported = match pick_config(ranges, constraints.sample_rate) {
            Some(config) => config,
            None => {
                let fallback = device
                    .default_input_config()
                    .map_err(|err| HearingError::capture_unavailable(err.to_string()))?;
                tracing::warn!(
                    requested = constraints.sample_rate,
                    actual = fallback.sample_rate().0,
                    "capture device cannot run at the requested rate, using its default"
                );
                fallback
            }
        };

        let sample_rate = supported.sample_rate().0;
        let channels = usize::from(supported.channels());
        let format = supported.sample_format();
        let config: StreamConfig = supported.config();

        let (producer, consumer) = RingBuffer::<f32>::new(self.ring_capacity(sample_rate));
        let stream = match format {
            SampleFormat::F32 => build_capture_stream::<f32>(&device, &config, channels, producer),
            SampleFormat::I16 => build_capture_stream::<i16>(&device, &config, channels, producer),
            SampleFormat::U16 => build_capture_stream::<u16>(&device, &config, channels, producer),
            other => {
                return Err(HearingError::capture_unavailable(format!(
                    "unsupported capture sample format {other:?}"
                )))
            }
        }
        .map_err(|err| HearingError::capture_unavailable(err.to_string()))?;

        stream
            .play()
            .map_err(|err| HearingError::capture_unavailable(err.to_string()))?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels,
            ?format,
            "capture stream started"
        );

        Ok(CpalCapture {
            stream,
            reader: Some(consumer),
            sample_rate,
            device_name,
        })
    }

    fn open_output(&mut self, capture: &mut CpalCapture, graph: SignalGraph) -> Result<CpalOutput> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| HearingError::output_unavailable("no default output device"))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown output".to_string());

        let ranges = device
            .supported_output_configs()
            .map_err(|err| HearingError::output_unavailable(err.to_string()))?;
        let supported = pick_config(ranges, capture.sample_rate).ok_or_else(|| {
            HearingError::output_unavailable(format!(
                "output device cannot run at the capture rate of {} Hz",
                capture.sample_rate
            ))
        })?;

        let reader = capture
            .reader
            .take()
            .ok_or_else(|| HearingError::msg("capture stream is already connected to an output"))?;

        let channels = usize::from(supported.channels());
        let format = supported.sample_format();
        let config: StreamConfig = supported.config();

        let stream = match format {
            SampleFormat::F32 => {
                build_output_stream::<f32>(&device, &config, channels, reader, graph)
            }
            SampleFormat::I16 => {
                build_output_stream::<i16>(&device, &config, channels, reader, graph)
            }
            SampleFormat::U16 => {
                build_output_stream::<u16>(&device, &config, channels, reader, graph)
            }
            other => {
                return Err(HearingError::output_unavailable(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        }
        .map_err(|err| HearingError::output_unavailable(err.to_string()))?;

        stream
            .play()
            .map_err(|err| HearingError::output_unavailable(err.to_string()))?;

        tracing::info!(
            device = %device_name,
            sample_rate = capture.sample_rate,
            channels,
            ?format,
            "output stream started"
        );

        Ok(CpalOutput {
            stream,
            device_name,
        })
    }
}

/// Live capture stream. Until connected it also holds the read end of the
/// capture ring.
pub struct CpalCapture {
    stream: Stream,
    reader: Option<Consumer<f32>>,
    sample_rate: u32,
    device_name: String,
}

impl CaptureSession for CpalCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn release(self) -> Result<()> {
        let paused = self.stream.pause();
        drop(self.stream);
        tracing::debug!(device = %self.device_name, "capture stream released");
        paused.map_err(|err| HearingError::msg(format!("failed to pause capture: {err}")))
    }
}

impl fmt::Debug for CpalCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalCapture")
            .field("device", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("connected", &self.reader.is_none())
            .finish()
    }
}

/// Live output stream; owns the signal graph through its callback.
pub struct CpalOutput {
    stream: Stream,
    device_name: String,
}

impl OutputSession for CpalOutput {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn release(self) -> Result<()> {
        let paused = self.stream.pause();
        drop(self.stream);
        tracing::debug!(device = %self.device_name, "output stream released");
        paused.map_err(|err| HearingError::msg(format!("failed to pause output: {err}")))
    }
}

impl fmt::Debug for CpalOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalOutput")
            .field("device", &self.device_name)
            .finish()
    }
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Picks a configuration that can run at `sample_rate`, preferring float
/// samples and then the fewest channels.
fn pick_config<I>(ranges: I, sample_rate: u32) -> Option<SupportedStreamConfig>
where
    I: Iterator<Item = SupportedStreamConfigRange>,
{
    let rate = SampleRate(sample_rate);
    ranges
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter_map(|range| format_rank(range.sample_format()).map(|rank| (rank, range)))
        .min_by_key(|(rank, range)| (*rank, range.channels()))
        .map(|(_, range)| range.with_sample_rate(rate))
}

fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut producer: Producer<f32>,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks(channels) {
                let sum: f32 = frame.iter().map(|&sample| sample.to_sample::<f32>()).sum();
                // A full ring means output has stalled; dropping keeps the
                // callback non-blocking.
                let _ = producer.push(sum / frame.len() as f32);
            }
        },
        |err| tracing::error!(%err, "capture stream error"),
        None,
    )
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut reader: Consumer<f32>,
    mut graph: SignalGraph,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = channels.max(1);
    let mut block = vec![0.0_f32; MAX_BLOCK_FRAMES];
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            render_interleaved(data, channels, &mut block, &mut reader, &mut graph);
        },
        |err| tracing::error!(%err, "output stream error"),
        None,
    )
}

/// Fills an interleaved output buffer from the capture ring through `graph`.
///
/// Oversized callbacks are split into `scratch`-sized blocks so nothing is
/// allocated on the audio thread. Underruns play silence.
fn render_interleaved<T>(
    data: &mut [T],
    channels: usize,
    scratch: &mut [f32],
    reader: &mut Consumer<f32>,
    graph: &mut SignalGraph,
) where
    T: SizedSample + FromSample<f32>,
{
    let frames_per_block = scratch.len().max(1);
    for chunk in data.chunks_mut(channels * frames_per_block) {
        let frames = chunk.len() / channels;
        let block = &mut scratch[..frames];
        for sample in block.iter_mut() {
            *sample = reader.pop().unwrap_or(0.0);
        }

        graph.process(block);

        for (frame, value) in chunk.chunks_mut(channels).zip(block.iter()) {
            frame.fill(T::from_sample(*value));
        }
    }
}
