//! Capture controller
//!
//! Owns the microphone lifecycle for one practice session:
//! `idle -> start -> recording -> stop -> stopped`, and from `stopped` a new
//! start goes straight back to `recording`, discarding the previous take.
//!
//! Events from the stream are drained by a collector task. The device is
//! held by a [`DeviceGuard`] shared between the controller and that task,
//! so it is released on every exit path: normal stop, stream error, a second
//! start, or the controller being dropped.

use super::{
    AcquiredStream, CaptureConstraints, CaptureEvent, MediaDevices, Recording, StreamControl,
    RECORDING_MIME_TYPE,
};
use crate::error::CaptureError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long to wait for the stream to finalize after stop
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the controller is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Stopped,
}

/// Releases the device exactly once, at the latest when dropped
struct DeviceGuard {
    control: Box<dyn StreamControl>,
    released: bool,
}

impl DeviceGuard {
    fn new(control: Box<dyn StreamControl>) -> Self {
        Self {
            control,
            released: false,
        }
    }

    fn stop(&mut self) {
        if !self.released {
            self.control.stop();
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.control.release();
            tracing::debug!("Capture device released");
        }
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn lock(guard: &Mutex<DeviceGuard>) -> MutexGuard<'_, DeviceGuard> {
    guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A recording in progress
struct ActiveCapture {
    device: Arc<Mutex<DeviceGuard>>,
    collector: JoinHandle<Result<Vec<Vec<u8>>, CaptureError>>,
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        self.collector.abort();
        lock(&self.device).release();
    }
}

/// Drain stream events until the stream stops, fails or goes away
async fn collect(
    mut events: mpsc::Receiver<CaptureEvent>,
    device: Arc<Mutex<DeviceGuard>>,
) -> Result<Vec<Vec<u8>>, CaptureError> {
    let mut chunks = Vec::new();

    let outcome = loop {
        match events.recv().await {
            Some(CaptureEvent::Chunk(chunk)) => {
                if !chunk.is_empty() {
                    tracing::trace!("Captured chunk of {} bytes", chunk.len());
                    chunks.push(chunk);
                }
            }
            Some(CaptureEvent::Stopped) => break Ok(()),
            Some(CaptureEvent::Failed(cause)) => {
                tracing::error!("Capture stream failed: {}", cause);
                break Err(CaptureError::RecordingFailed(cause));
            }
            None => {
                break Err(CaptureError::RecordingFailed(
                    "capture stream closed before it finished".to_string(),
                ))
            }
        }
    };

    lock(&device).release();
    outcome.map(|()| chunks)
}

/// Drives one microphone at a time
pub struct CaptureController {
    devices: Arc<dyn MediaDevices>,
    constraints: CaptureConstraints,
    active: Option<ActiveCapture>,
    last: Option<Arc<Recording>>,
    stop_timeout: Duration,
}

impl CaptureController {
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: CaptureConstraints) -> Self {
        Self {
            devices,
            constraints,
            active: None,
            last: None,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    /// Override how long stop waits for the stream to finalize
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn state(&self) -> CaptureState {
        match (&self.active, &self.last) {
            (Some(_), _) => CaptureState::Recording,
            (None, Some(_)) => CaptureState::Stopped,
            (None, None) => CaptureState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// True when the live stream has already ended on its own (error or
    /// duration limit); `stop_recording` then returns its outcome at once
    pub fn stream_finished(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.collector.is_finished())
    }

    /// The last assembled recording, if any
    pub fn last_recording(&self) -> Option<Arc<Recording>> {
        self.last.clone()
    }

    /// Acquire the microphone and start accumulating chunks
    ///
    /// Any previous stream and recording are discarded first, so their
    /// device handle is released before the new one is requested.
    pub async fn start_recording(&mut self) -> Result<(), CaptureError> {
        self.discard();

        tracing::debug!(
            "Requesting microphone '{}' (echo_cancellation={}, noise_suppression={})",
            self.constraints.device,
            self.constraints.echo_cancellation,
            self.constraints.noise_suppression
        );
        let AcquiredStream { events, control } = self.devices.acquire(&self.constraints).await?;

        let device = Arc::new(Mutex::new(DeviceGuard::new(control)));
        let collector = tokio::spawn(collect(events, device.clone()));
        self.active = Some(ActiveCapture { device, collector });

        tracing::info!("Recording started");
        Ok(())
    }

    /// Finalize the stream and assemble the recording
    ///
    /// Returns `Ok(None)` when nothing is being recorded.
    pub async fn stop_recording(&mut self) -> Result<Option<Arc<Recording>>, CaptureError> {
        let Some(mut active) = self.active.take() else {
            tracing::debug!("Stop requested while idle; ignoring");
            return Ok(None);
        };

        lock(&active.device).stop();

        let outcome = match tokio::time::timeout(self.stop_timeout, &mut active.collector).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(CaptureError::RecordingFailed(format!(
                "capture task ended unexpectedly: {}",
                e
            ))),
            Err(_) => Err(CaptureError::RecordingFailed(format!(
                "stream did not finish within {}s",
                self.stop_timeout.as_secs()
            ))),
        };
        // Releases the device whatever happened above
        drop(active);

        let chunks = outcome?;
        if chunks.is_empty() {
            return Err(CaptureError::RecordingFailed(
                "No audio was captured. Check your microphone and try again.".to_string(),
            ));
        }

        let recording = Arc::new(Recording::from_chunks(chunks, RECORDING_MIME_TYPE));
        tracing::info!(
            "Recording stopped: {} bytes in {} chunk(s)",
            recording.len(),
            recording.chunk_count()
        );
        self.last = Some(recording.clone());
        Ok(Some(recording))
    }

    /// Drop any live stream and the last recording
    pub fn discard(&mut self) {
        if self.active.take().is_some() {
            tracing::debug!("Discarded live capture");
        }
        self.last = None;
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.discard();
    }
}
