//! cpal-backed microphone
//!
//! cpal::Stream is not Send, so each acquired stream lives on its own
//! thread. The thread opens the device, reports readiness back to the async
//! caller, and then waits for a command. On stop it encodes everything it
//! captured as a single 16-bit mono WAV chunk followed by `Stopped`.
//!
//! cpal exposes raw input only; echo cancellation and noise suppression
//! requests are logged and otherwise ignored.

use super::{AcquiredStream, CaptureConstraints, CaptureEvent, MediaDevices, StreamControl};
use crate::error::CaptureError;
use std::io::Cursor;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot};

/// Commands sent to the capture thread
enum CaptureCommand {
    Stop,
    Release,
}

/// Parameters for building an audio input stream
struct StreamBuildParams {
    samples: Arc<Mutex<Vec<f32>>>,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
}

/// Host microphones via cpal
#[derive(Debug, Default)]
pub struct CpalDevices;

impl CpalDevices {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl MediaDevices for CpalDevices {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<AcquiredStream, CaptureError> {
        let constraints = constraints.clone();
        let (event_tx, event_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = oneshot::channel();

        thread::Builder::new()
            .name("speechcoach-capture".to_string())
            .spawn(move || capture_thread(constraints, event_tx, cmd_rx, ready_tx))
            .map_err(|e| {
                CaptureError::CaptureUnavailable(format!("Failed to start capture thread: {}", e))
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(AcquiredStream {
                events: event_rx,
                control: Box::new(CpalStreamControl { commands: cmd_tx }),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::CaptureUnavailable(
                "Capture thread exited during setup".to_string(),
            )),
        }
    }
}

struct CpalStreamControl {
    commands: std::sync::mpsc::Sender<CaptureCommand>,
}

impl StreamControl for CpalStreamControl {
    fn stop(&mut self) {
        // The thread may already be gone after a duration auto-stop
        let _ = self.commands.send(CaptureCommand::Stop);
    }

    fn release(&mut self) {
        let _ = self.commands.send(CaptureCommand::Release);
    }
}

fn capture_thread(
    constraints: CaptureConstraints,
    events: mpsc::Sender<CaptureEvent>,
    commands: std::sync::mpsc::Receiver<CaptureCommand>,
    ready: oneshot::Sender<Result<(), CaptureError>>,
) {
    use cpal::traits::StreamTrait;

    let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
    let stream = match open_stream(&constraints, samples.clone(), events.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(map_play_error(e)));
        return;
    }

    if ready.send(Ok(())).is_err() {
        tracing::debug!("Capture requester went away before the stream started");
        return;
    }
    tracing::debug!("Audio capture thread started");

    let command = match commands.recv_timeout(constraints.max_duration) {
        Ok(command) => command,
        Err(RecvTimeoutError::Timeout) => {
            tracing::info!(
                "Maximum recording duration ({}s) reached, stopping",
                constraints.max_duration.as_secs()
            );
            CaptureCommand::Stop
        }
        Err(RecvTimeoutError::Disconnected) => CaptureCommand::Release,
    };

    // Dropping the stream closes the device
    drop(stream);

    match command {
        CaptureCommand::Stop => {
            let collected = std::mem::take(
                &mut *samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
            );
            tracing::debug!(
                "Audio capture stopped: {} samples ({:.2}s)",
                collected.len(),
                collected.len() as f32 / constraints.sample_rate as f32
            );

            if !collected.is_empty() {
                match encode_wav(&collected, constraints.sample_rate) {
                    Ok(wav) => {
                        let _ = events.blocking_send(CaptureEvent::Chunk(wav));
                    }
                    Err(e) => {
                        let _ = events.blocking_send(CaptureEvent::Failed(e));
                        return;
                    }
                }
            }
            let _ = events.blocking_send(CaptureEvent::Stopped);
        }
        CaptureCommand::Release => tracing::debug!("Capture released without finalizing"),
    }

    tracing::debug!("Audio capture thread stopped");
}

fn open_stream(
    constraints: &CaptureConstraints,
    samples: Arc<Mutex<Vec<f32>>>,
    events: mpsc::Sender<CaptureEvent>,
) -> Result<cpal::Stream, CaptureError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    if constraints.echo_cancellation || constraints.noise_suppression {
        tracing::debug!("Echo cancellation and noise suppression are not available through cpal");
    }

    let host = cpal::default_host();
    let device = if constraints.device == "default" {
        host.default_input_device()
            .ok_or_else(|| CaptureError::DeviceNotFound("default".to_string()))?
    } else {
        find_input_device(&host, &constraints.device)?
    };

    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("Using audio device: {}", device_name);

    let supported_config = device
        .default_input_config()
        .map_err(map_default_config_error)?;

    let source_channels = supported_config.channels() as usize;
    let sample_format = supported_config.sample_format();
    tracing::debug!(
        "Device config: {} Hz, {} channel(s), format: {:?}",
        supported_config.sample_rate().0,
        source_channels,
        sample_format
    );

    let stream_config = cpal::StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let params = StreamBuildParams {
        samples,
        source_rate: supported_config.sample_rate().0,
        target_rate: constraints.sample_rate,
        source_channels,
    };

    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
        let _ = events.try_send(CaptureEvent::Failed(err.to_string()));
    };

    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, params, err_fn),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, params, err_fn),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, params, err_fn),
        format => Err(CaptureError::CaptureUnavailable(format!(
            "Unsupported sample format: {:?}",
            format
        ))),
    }
}

/// Find an input device by exact, case-insensitive, then substring match
fn find_input_device(host: &cpal::Host, wanted: &str) -> Result<cpal::Device, CaptureError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let mut devices: Vec<(String, cpal::Device)> = host
        .input_devices()
        .map_err(|e| CaptureError::CaptureUnavailable(e.to_string()))?
        .filter_map(|d| d.name().ok().map(|name| (name, d)))
        .collect();

    let names: Vec<&str> = devices.iter().map(|(name, _)| name.as_str()).collect();
    match match_device_name(&names, wanted) {
        Some(index) => {
            let (name, device) = devices.swap_remove(index);
            tracing::debug!("Matched audio device '{}' for '{}'", name, wanted);
            Ok(device)
        }
        None if names.is_empty() => Err(CaptureError::DeviceNotFound(wanted.to_string())),
        None => Err(CaptureError::DeviceNotFound(format!(
            "{} (available: {})",
            wanted,
            names.join(", ")
        ))),
    }
}

/// Index of the device matching `wanted`
///
/// Tries, in order: exact match, case-insensitive match, then a
/// case-insensitive substring match, so both full backend names and short
/// names like "analog-stereo" work.
fn match_device_name(names: &[&str], wanted: &str) -> Option<usize> {
    let wanted_lower = wanted.to_lowercase();

    names
        .iter()
        .position(|name| *name == wanted)
        .or_else(|| {
            names
                .iter()
                .position(|name| name.to_lowercase() == wanted_lower)
        })
        .or_else(|| {
            names
                .iter()
                .position(|name| name.to_lowercase().contains(&wanted_lower))
        })
}

/// Backend errors mentioning access problems are permission failures
fn classify_backend_error(description: &str) -> CaptureError {
    let lower = description.to_lowercase();
    if ["permission", "denied", "not authorized", "access"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::CaptureUnavailable(description.to_string())
    }
}

fn map_default_config_error(e: cpal::DefaultStreamConfigError) -> CaptureError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceNotFound("device is no longer available".to_string())
        }
        cpal::DefaultStreamConfigError::BackendSpecific { err } => {
            classify_backend_error(&err.description)
        }
        other => CaptureError::CaptureUnavailable(other.to_string()),
    }
}

fn map_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceNotFound("device is no longer available".to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend_error(&err.description),
        other => CaptureError::CaptureUnavailable(other.to_string()),
    }
}

fn map_play_error(e: cpal::PlayStreamError) -> CaptureError {
    match e {
        cpal::PlayStreamError::DeviceNotAvailable => {
            CaptureError::DeviceNotFound("device is no longer available".to_string())
        }
        cpal::PlayStreamError::BackendSpecific { err } => classify_backend_error(&err.description),
        #[allow(unreachable_patterns)]
        other => CaptureError::CaptureUnavailable(other.to_string()),
    }
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: StreamBuildParams,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let StreamBuildParams {
        samples,
        source_rate,
        target_rate,
        source_channels,
    } = params;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = resample(&mono, source_rate, target_rate);
                if let Ok(mut guard) = samples.lock() {
                    guard.extend_from_slice(&resampled);
                }
            },
            err_fn,
            None,
        )
        .map_err(map_build_error)
}

/// Linear interpolation resampling
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

/// Encode mono f32 samples as 16-bit PCM WAV
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, String> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| format!("Failed to create WAV writer: {}", e))?;

    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| format!("Failed to write sample: {}", e))?;
    }

    writer
        .finalize()
        .map_err(|e| format!("Failed to finalize WAV: {}", e))?;

    Ok(buffer.into_inner())
}
