//! Scripted capture device for unit tests

use super::{AcquiredStream, CaptureConstraints, CaptureEvent, MediaDevices, StreamControl};
use crate::error::CaptureError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Behaviour of one acquired stream
pub(crate) enum Script {
    /// Deliver these chunks, then `Stopped` once stop is requested
    Chunks(Vec<Vec<u8>>),
    /// Deliver these chunks, then fail with the given cause
    FailAfter(Vec<Vec<u8>>, String),
    /// Refuse acquisition
    Deny(CaptureError),
    /// Never answer stop
    Hang,
}

/// Hands out scripted streams in order and logs acquire/stop/release
pub(crate) struct FakeDevices {
    scripts: Mutex<VecDeque<Script>>,
    log: Arc<Mutex<Vec<String>>>,
    acquired: Mutex<usize>,
    constraints: Mutex<Option<CaptureConstraints>>,
}

impl FakeDevices {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            log: Arc::new(Mutex::new(Vec::new())),
            acquired: Mutex::new(0),
            constraints: Mutex::new(None),
        })
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn release_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|e| e.starts_with("release"))
            .count()
    }

    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        self.constraints.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<AcquiredStream, CaptureError> {
        *self.constraints.lock().unwrap() = Some(constraints.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Deny(CaptureError::DeviceNotFound("fake".to_string())));

        let (tx, events) = mpsc::channel(32);
        let answers_stop = match script {
            Script::Deny(e) => return Err(e),
            Script::Chunks(chunks) => {
                for chunk in chunks {
                    tx.try_send(CaptureEvent::Chunk(chunk)).unwrap();
                }
                true
            }
            Script::FailAfter(chunks, cause) => {
                for chunk in chunks {
                    tx.try_send(CaptureEvent::Chunk(chunk)).unwrap();
                }
                tx.try_send(CaptureEvent::Failed(cause)).unwrap();
                true
            }
            Script::Hang => false,
        };

        let id = {
            let mut acquired = self.acquired.lock().unwrap();
            *acquired += 1;
            *acquired
        };
        self.log.lock().unwrap().push(format!("acquire {}", id));

        Ok(AcquiredStream {
            events,
            control: Box::new(FakeControl {
                id,
                tx: Some(tx),
                answers_stop,
                log: self.log.clone(),
            }),
        })
    }
}

struct FakeControl {
    id: usize,
    tx: Option<mpsc::Sender<CaptureEvent>>,
    answers_stop: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl StreamControl for FakeControl {
    fn stop(&mut self) {
        self.log.lock().unwrap().push(format!("stop {}", self.id));
        if let (true, Some(tx)) = (self.answers_stop, &self.tx) {
            let _ = tx.try_send(CaptureEvent::Stopped);
        }
    }

    fn release(&mut self) {
        self.log.lock().unwrap().push(format!("release {}", self.id));
        self.tx = None;
    }
}
