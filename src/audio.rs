//! Platform audio plumbing for both engines.
//!
//! The synthesizer renders mono blocks through an [`AudioOutput`]; the
//! analyzer receives mono capture through an [`AudioInput`]. The cpal
//! implementations talk to real devices, the offline ones back tests and the
//! WAV renderer.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use log::{debug, error, info};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use crate::error::{AnalyzerError, SynthError};

pub const PREFERRED_SAMPLE_RATE: u32 = 48_000;
/// Largest mono scratch block allocated for an output stream. Longer
/// callbacks are rendered in several passes.
const MAX_BLOCK_FRAMES: usize = 4096;

/// Fills a block of mono samples. Runs on the realtime audio thread.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

pub trait AudioOutput {
    type Stream;

    /// Acquires the device and reports the sample rate the graph must run at.
    fn prepare(&mut self) -> Result<u32, SynthError>;

    /// Starts pulling audio from `render`. Dropping the stream stops it.
    fn play(&mut self, render: RenderFn) -> Result<Self::Stream, SynthError>;

    fn halt(&mut self, stream: Self::Stream);
}

/// Capture source for the analyzer. Delivers the first channel only.
pub trait AudioInput {
    type Stream;

    /// Opens the source and returns the live stream, the consumer end of its
    /// sample ring and the capture sample rate.
    fn open(&mut self) -> Result<(Self::Stream, HeapConsumer<f32>, u32), AnalyzerError>;

    fn close(&mut self, stream: Self::Stream);
}

#[derive(Default)]
pub struct CpalOutput {
    prepared: Option<(cpal::Device, cpal::SupportedStreamConfig)>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioOutput for CpalOutput {
    type Stream = cpal::Stream;

    fn prepare(&mut self) -> Result<u32, SynthError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(SynthError::NoOutputDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let config = choose_config(device.supported_output_configs()?, PREFERRED_SAMPLE_RATE)
            .ok_or(SynthError::UnsupportedConfig)?;
        let sample_rate = config.sample_rate().0;
        info!(
            "output device {device_name}: {} Hz, {} channels, {:?}",
            sample_rate,
            config.channels(),
            config.sample_format()
        );
        self.prepared = Some((device, config));
        Ok(sample_rate)
    }

    fn play(&mut self, render: RenderFn) -> Result<Self::Stream, SynthError> {
        let (device, config) = self.prepared.take().ok_or(SynthError::NoOutputDevice)?;
        let channels = config.channels() as usize;
        let frames = block_frames(config.buffer_size());
        let stream_config: cpal::StreamConfig = config.clone().into();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_output_stream::<f32>,
            cpal::SampleFormat::I16 => build_output_stream::<i16>,
            cpal::SampleFormat::U16 => build_output_stream::<u16>,
            other => return Err(SynthError::UnsupportedFormat(other.to_string())),
        }(&device, &stream_config, channels, frames, render, stream_error)?;
        stream.play()?;
        Ok(stream)
    }

    fn halt(&mut self, stream: Self::Stream) {
        if let Err(err) = stream.pause() {
            debug!("pausing output stream: {err}");
        }
        drop(stream);
    }
}

/// Default input device through cpal.
///
/// cpal opens the raw capture path; no echo cancellation, noise suppression
/// or gain control sits between the device and the analyzer.
#[derive(Default)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioInput for CpalInput {
    type Stream = cpal::Stream;

    fn open(&mut self) -> Result<(Self::Stream, HeapConsumer<f32>, u32), AnalyzerError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AnalyzerError::NoInputDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let config = choose_config(device.supported_input_configs()?, PREFERRED_SAMPLE_RATE)
            .ok_or(AnalyzerError::UnsupportedConfig)?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let capacity = (sample_rate as usize).saturating_mul(2);
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();

        let stream_config: cpal::StreamConfig = config.clone().into();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_input_stream::<f32>,
            cpal::SampleFormat::I16 => build_input_stream::<i16>,
            cpal::SampleFormat::U16 => build_input_stream::<u16>,
            other => return Err(AnalyzerError::UnsupportedFormat(other.to_string())),
        }(&device, &stream_config, channels, producer, stream_error)?;
        stream.play()?;
        info!("input device {device_name}: {sample_rate} Hz, {channels} channels");
        Ok((stream, consumer, sample_rate))
    }

    fn close(&mut self, stream: Self::Stream) {
        if let Err(err) = stream.pause() {
            debug!("pausing input stream: {err}");
        }
        drop(stream);
    }
}

/// Picks the config closest to `target_rate`, preferring `f32` samples.
fn choose_config(
    ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<cpal::SupportedStreamConfig> {
    let mut best: Option<cpal::SupportedStreamConfig> = None;
    let mut best_score = i32::MIN;
    for range in ranges {
        let min = range.min_sample_rate().0;
        let max = range.max_sample_rate().0;
        let rate = if target_rate >= min && target_rate <= max {
            target_rate
        } else {
            min
        };
        let cfg = range.with_sample_rate(cpal::SampleRate(rate));

        let mut score = 0;
        if cfg.sample_rate().0 == target_rate {
            score += 2;
        }
        if cfg.sample_format() == cpal::SampleFormat::F32 {
            score += 1;
        }

        if score > best_score {
            best_score = score;
            best = Some(cfg);
        }
    }
    best
}

fn block_frames(buffer_size: &cpal::SupportedBufferSize) -> usize {
    match buffer_size {
        cpal::SupportedBufferSize::Range { max, .. } => (*max as usize).clamp(1, MAX_BLOCK_FRAMES),
        cpal::SupportedBufferSize::Unknown => MAX_BLOCK_FRAMES,
    }
}

/// Renders mono into `mono` and copies it to every channel of `data`,
/// in as many passes as the scratch block needs.
fn fill_interleaved<T>(data: &mut [T], channels: usize, mono: &mut [f32], render: &mut RenderFn)
where
    T: Sample + FromSample<f32>,
{
    let channels = channels.max(1);
    if mono.is_empty() {
        return;
    }
    for chunk in data.chunks_mut(channels * mono.len()) {
        let block = &mut mono[..chunk.len().div_ceil(channels)];
        render(block);
        for (frame, &s) in chunk.chunks_mut(channels).zip(block.iter()) {
            let value = T::from_sample(s);
            for out in frame.iter_mut() {
                *out = value;
            }
        }
    }
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    frames: usize,
    mut render: RenderFn,
    err_fn: fn(cpal::StreamError),
) -> Result<cpal::Stream, SynthError>
where
    T: Sample + SizedSample + FromSample<f32>,
{
    let mut mono = vec![0.0f32; frames.max(1)];
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| fill_interleaved(data, channels, &mut mono, &mut render),
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut producer: HeapProducer<f32>,
    err_fn: fn(cpal::StreamError),
) -> Result<cpal::Stream, AnalyzerError>
where
    T: Sample + SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _| {
            for frame in data.chunks(channels.max(1)) {
                let s = frame[0].to_sample::<f32>();
                let _ = producer.push(s);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn stream_error(err: cpal::StreamError) {
    error!("stream error: {}", err);
}

#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    pub host: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub default_input: Option<String>,
    pub default_output: Option<String>,
}

pub fn list_devices() -> anyhow::Result<DeviceList> {
    let host = cpal::default_host();
    let names = |devices: Box<dyn Iterator<Item = cpal::Device>>| -> Vec<String> {
        devices
            .map(|d| d.name().unwrap_or_else(|_| "unknown".to_string()))
            .collect()
    };
    Ok(DeviceList {
        host: host.id().name().to_string(),
        inputs: names(Box::new(host.input_devices()?)),
        outputs: names(Box::new(host.output_devices()?)),
        default_input: host.default_input_device().and_then(|d| d.name().ok()),
        default_output: host.default_output_device().and_then(|d| d.name().ok()),
    })
}

type RenderSlot = Arc<Mutex<Option<RenderFn>>>;

/// Output that renders only when pulled. Clones share the same slot, so a
/// caller can keep a handle while the synthesizer owns another.
#[derive(Clone)]
pub struct OfflineOutput {
    sample_rate: u32,
    slot: RenderSlot,
    fail_play: bool,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            slot: Arc::new(Mutex::new(None)),
            fail_play: false,
        }
    }

    /// An output whose stream can never be started.
    #[cfg(test)]
    pub(crate) fn unavailable(sample_rate: u32) -> Self {
        Self {
            fail_play: true,
            ..Self::new(sample_rate)
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_playing(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Renders `frames` samples, or `None` when nothing is playing.
    pub fn pull(&self, frames: usize) -> Option<Vec<f32>> {
        let mut slot = self.slot.lock().ok()?;
        let render = slot.as_mut()?;
        let mut block = vec![0.0f32; frames];
        render(&mut block);
        Some(block)
    }
}

pub struct OfflineStream {
    slot: RenderSlot,
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl AudioOutput for OfflineOutput {
    type Stream = OfflineStream;

    fn prepare(&mut self) -> Result<u32, SynthError> {
        Ok(self.sample_rate)
    }

    fn play(&mut self, render: RenderFn) -> Result<Self::Stream, SynthError> {
        if self.fail_play {
            return Err(SynthError::NoOutputDevice);
        }
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(render);
        }
        Ok(OfflineStream {
            slot: Arc::clone(&self.slot),
        })
    }

    fn halt(&mut self, stream: Self::Stream) {
        drop(stream);
    }
}

/// Input that replays a fixed buffer once per open.
#[derive(Debug, Clone)]
pub struct BufferInput {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    denied: bool,
}

impl BufferInput {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            denied: false,
        }
    }

    /// An input whose acquisition always fails, as with a refused microphone.
    pub fn denied(sample_rate: u32) -> Self {
        Self {
            denied: true,
            ..Self::new(Vec::new(), sample_rate)
        }
    }
}

impl AudioInput for BufferInput {
    type Stream = ();

    fn open(&mut self) -> Result<(Self::Stream, HeapConsumer<f32>, u32), AnalyzerError> {
        if self.denied {
            return Err(AnalyzerError::NoInputDevice);
        }
        let rb = HeapRb::<f32>::new(self.samples.len().max(1));
        let (mut producer, consumer) = rb.split();
        producer.push_slice(&self.samples);
        Ok(((), consumer, self.sample_rate))
    }

    fn close(&mut self, _stream: Self::Stream) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_output_renders_only_while_playing() {
        let mut output = OfflineOutput::new(8_000);
        assert!(output.pull(16).is_none());

        let stream = output
            .play(Box::new(|block: &mut [f32]| block.fill(0.25)))
            .unwrap();
        assert!(output.is_playing());
        assert_eq!(output.pull(4), Some(vec![0.25; 4]));

        output.halt(stream);
        assert!(!output.is_playing());
        assert!(output.pull(4).is_none());
    }

    #[test]
    fn long_callbacks_render_in_passes() {
        let mut counter = 0.0f32;
        let mut render: RenderFn = Box::new(move |block: &mut [f32]| {
            for s in block.iter_mut() {
                counter += 1.0;
                *s = counter;
            }
        });
        let mut mono = vec![0.0f32; 3];
        let mut data = vec![0.0f32; 14];
        fill_interleaved(&mut data, 2, &mut mono, &mut render);
        assert_eq!(
            data,
            vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0, 6.0, 6.0, 7.0, 7.0]
        );
        assert_eq!(mono.len(), 3);
    }

    #[test]
    fn scratch_block_follows_the_device_range() {
        let range = cpal::SupportedBufferSize::Range { min: 64, max: 1024 };
        assert_eq!(block_frames(&range), 1024);
        let huge = cpal::SupportedBufferSize::Range { min: 1, max: u32::MAX };
        assert_eq!(block_frames(&huge), MAX_BLOCK_FRAMES);
        assert_eq!(block_frames(&cpal::SupportedBufferSize::Unknown), MAX_BLOCK_FRAMES);
    }

    #[test]
    fn unavailable_output_refuses_to_play() {
        let mut output = OfflineOutput::unavailable(8_000);
        assert_eq!(output.prepare().unwrap(), 8_000);
        assert!(matches!(
            output.play(Box::new(|_: &mut [f32]| {})),
            Err(SynthError::NoOutputDevice)
        ));
    }

    #[test]
    fn buffer_input_replays_samples() {
        let mut input = BufferInput::new(vec![0.1, 0.2, 0.3], 16_000);
        let ((), mut consumer, rate) = input.open().unwrap();
        assert_eq!(rate, 16_000);
        let got: Vec<f32> = consumer.pop_iter().collect();
        assert_eq!(got, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn denied_input_reports_missing_device() {
        let mut input = BufferInput::denied(16_000);
        assert!(matches!(input.open(), Err(AnalyzerError::NoInputDevice)));
    }
}
