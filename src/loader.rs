//! Background decode worker.
//!
//! One dedicated thread fulfils decode requests FIFO. The worker never
//! touches the manager lock: jobs carry everything needed to decode, and
//! finished results sit in a completion list the manager tick drains.
//! Cancellation is implicit: a completion whose buffer no longer exists
//! is simply skipped by the drain.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sound::BufferId;
use crate::source::create_source;
use crate::types::{AudioFormat, PcmSpec, SourceMode};

/// One queued decode request.
pub(crate) struct DecodeJob {
    pub buffer: BufferId,
    pub path: PathBuf,
    pub format: AudioFormat,
    pub source_mode: SourceMode,
}

/// Result of a finished decode, waiting for the tick to install it.
pub(crate) struct DecodeCompletion {
    pub buffer: BufferId,
    pub result: Result<(PcmSpec, Vec<u8>)>,
}

/// The async loader: a job channel, a worker thread and a completion
/// list.
pub(crate) struct AsyncLoader {
    tx: Option<mpsc::Sender<DecodeJob>>,
    completed: Arc<Mutex<Vec<DecodeCompletion>>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncLoader {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<DecodeJob>();
        let completed: Arc<Mutex<Vec<DecodeCompletion>>> = Arc::new(Mutex::new(Vec::new()));
        let publish = Arc::clone(&completed);
        let worker = std::thread::Builder::new()
            .name("audio-loader".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let buffer = job.buffer;
                    let result = decode_job(job);
                    if let Err(e) = &result {
                        warn!(buffer = %buffer, "async decode failed: {e}");
                    }
                    publish.lock().push(DecodeCompletion { buffer, result });
                }
                debug!("audio loader thread exiting");
            })
            .expect("failed to spawn audio loader thread");
        Self {
            tx: Some(tx),
            completed,
            worker: Some(worker),
        }
    }

    /// Queue a decode request. Silently dropped if the worker is gone
    /// (only during teardown).
    pub fn queue(&self, job: DecodeJob) {
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                warn!("audio loader is shut down, dropping decode request");
            }
        }
    }

    /// Take every finished decode accumulated since the last drain.
    pub fn drain(&self) -> Vec<DecodeCompletion> {
        std::mem::take(&mut *self.completed.lock())
    }
}

impl Drop for AsyncLoader {
    fn drop(&mut self) {
        // Closing the channel ends the worker's recv loop.
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn decode_job(job: DecodeJob) -> Result<(PcmSpec, Vec<u8>)> {
    let mut source = create_source(&job.path, job.format, job.source_mode)?;
    source.open().map_err(|e| Error::Decode(e.to_string()))?;
    let mut pcm = Vec::new();
    source
        .load(&mut pcm)
        .map_err(|e| Error::Decode(e.to_string()))?;
    debug!(
        buffer = %job.buffer,
        path = %job.path.display(),
        bytes = pcm.len(),
        "async decode finished"
    );
    Ok((source.spec(), pcm))
}
