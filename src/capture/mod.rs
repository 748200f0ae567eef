//! Microphone capture
//!
//! The host audio subsystem is reached through two narrow traits so the
//! [`CaptureController`](controller::CaptureController) can be driven by a
//! real cpal device or a scripted fake:
//!
//! - [`MediaDevices::acquire`] opens a permission-gated, audio-only stream
//! - the returned [`AcquiredStream`] delivers [`CaptureEvent`]s over a
//!   channel and is controlled with [`StreamControl::stop`] and
//!   [`StreamControl::release`]

pub mod controller;
pub mod cpal_device;

#[cfg(test)]
pub(crate) mod fake;

use crate::config::AudioConfig;
use crate::error::CaptureError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use controller::{CaptureController, CaptureState};

/// MIME type of every assembled recording
pub const RECORDING_MIME_TYPE: &str = "audio/wav";

/// File name used for the recording part of an upload
pub const RECORDING_FILE_NAME: &str = "speech.wav";

/// What to ask the host for when acquiring the microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Device name, or "default"
    pub device: String,
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// The stream finalizes itself after this long
    pub max_duration: Duration,
}

impl CaptureConstraints {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            device: config.device.clone(),
            sample_rate: config.sample_rate,
            echo_cancellation: config.echo_cancellation,
            noise_suppression: config.noise_suppression,
            max_duration: Duration::from_secs(config.max_duration_secs as u64),
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

/// Notification from a live capture stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Encoded audio became available
    Chunk(Vec<u8>),
    /// The stream finished finalizing; no more chunks follow
    Stopped,
    /// The stream hit a runtime error
    Failed(String),
}

/// Control handle for an acquired stream
pub trait StreamControl: Send {
    /// Ask the stream to finalize; it answers with remaining chunks and `Stopped`
    fn stop(&mut self);

    /// Stop every underlying track and give the device back
    fn release(&mut self);
}

/// A stream handed out by [`MediaDevices::acquire`]
pub struct AcquiredStream {
    pub events: mpsc::Receiver<CaptureEvent>,
    pub control: Box<dyn StreamControl>,
}

/// Host capability for opening audio input streams
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, constraints: &CaptureConstraints)
        -> Result<AcquiredStream, CaptureError>;
}

/// A finished recording: the captured chunks joined into one blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    data: Vec<u8>,
    mime_type: String,
    chunk_count: usize,
}

impl Recording {
    /// Join chunks in the order they were captured
    pub fn from_chunks(chunks: Vec<Vec<u8>>, mime_type: &str) -> Self {
        let chunk_count = chunks.len();
        Self {
            data: chunks.concat(),
            mime_type: mime_type.to_string(),
            chunk_count,
        }
    }

    /// Wrap audio that was already assembled elsewhere (e.g. a WAV file on disk)
    pub fn from_bytes(data: Vec<u8>, mime_type: &str) -> Self {
        Self {
            data,
            mime_type: mime_type.to_string(),
            chunk_count: 1,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }
}

/// Factory function to create the host capture capability
pub fn create_media_devices() -> Arc<dyn MediaDevices> {
    Arc::new(cpal_device::CpalDevices::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_joins_chunks_in_order() {
        let recording = Recording::from_chunks(
            vec![vec![1, 2], vec![3], vec![4, 5, 6]],
            RECORDING_MIME_TYPE,
        );
        assert_eq!(recording.data(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(recording.len(), 6);
        assert_eq!(recording.chunk_count(), 3);
        assert_eq!(recording.mime_type(), "audio/wav");
    }

    #[test]
    fn test_constraints_from_config() {
        let config = AudioConfig {
            max_duration_secs: 30,
            noise_suppression: false,
            ..AudioConfig::default()
        };
        let constraints = CaptureConstraints::from_config(&config);
        assert_eq!(constraints.max_duration, Duration::from_secs(30));
        assert!(constraints.echo_cancellation);
        assert!(!constraints.noise_suppression);
    }
}
