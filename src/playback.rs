//! Playback of the current recording through the default output device

use crate::capture::Recording;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::Arc;

/// Play a recording to the end without blocking the async runtime
pub async fn play_recording(recording: Arc<Recording>) -> Result<(), String> {
    tokio::task::spawn_blocking(move || play_blocking(recording.data()))
        .await
        .map_err(|e| format!("Playback task failed: {}", e))?
}

/// Decode and play WAV data, returning once it has finished
pub fn play_blocking(data: &[u8]) -> Result<(), String> {
    let source = Decoder::new(Cursor::new(data.to_vec()))
        .map_err(|e| format!("Failed to decode recording: {}", e))?;
    if let Some(duration) = source.total_duration() {
        tracing::debug!("Playing {:.1}s recording", duration.as_secs_f32());
    }

    // OutputStream is not Send; it must live on this thread until playback ends
    let (_stream, stream_handle) = OutputStream::try_default()
        .map_err(|e| format!("Failed to open audio output: {}", e))?;
    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| format!("Failed to create audio sink: {}", e))?;

    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}
