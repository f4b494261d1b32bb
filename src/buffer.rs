//! Buffers: the single unit of PCM ownership between a sound's identity
//! and the players reading from it.
//!
//! A buffer reconciles its category's load policy (when to decode, when
//! to release) with its source mode (decode from disk or from an
//! in-memory copy of the encoded file). Non-streamed buffers hold the
//! whole decoded PCM; streamed buffers keep their decoder open and serve
//! fixed-size chunks.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sound::BufferId;
use crate::source::{create_source, Source};
use crate::types::{AudioFormat, BufferMode, PcmSpec, SourceMode, STREAM_BUFFER_SIZE};

/// Load/decode lifecycle of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// No PCM and no decoder yet.
    Empty,
    /// Queued on the async loader; reads are rejected until it completes.
    Async,
    /// Full PCM is resident.
    Loaded,
    /// Decoder held open, PCM served in chunks.
    Streaming,
    /// PCM was released; a bind may reload it.
    Released,
}

/// PCM owner for one sound.
pub struct Buffer {
    id: BufferId,
    filename: Option<PathBuf>,
    format: AudioFormat,
    buffer_mode: BufferMode,
    source_mode: SourceMode,
    state: BufferState,
    source: Option<Box<dyn Source>>,
    /// Full decoded PCM (non-streamed buffers).
    pcm: Vec<u8>,
    /// Most recently decoded streaming chunk.
    stream: Vec<u8>,
    spec: PcmSpec,
    size: u64,
    idle_time: f32,
    bound_players: usize,
    /// Cumulative PCM bytes served since the last rewind, wrapping on
    /// loop; backs the streamed sample-offset correction.
    stream_position: u64,
    decode_failed: bool,
}

impl Buffer {
    pub fn from_file(
        id: BufferId,
        filename: PathBuf,
        format: AudioFormat,
        buffer_mode: BufferMode,
        source_mode: SourceMode,
    ) -> Self {
        Self {
            id,
            filename: Some(filename),
            format,
            buffer_mode,
            source_mode,
            state: BufferState::Empty,
            source: None,
            pcm: Vec::new(),
            stream: Vec::new(),
            spec: PcmSpec::default(),
            size: 0,
            idle_time: 0.0,
            bound_players: 0,
            stream_position: 0,
            decode_failed: false,
        }
    }

    /// A memory-backed buffer is born loaded and is never released.
    pub fn from_memory(id: BufferId, pcm: Vec<u8>, spec: PcmSpec) -> Self {
        let size = pcm.len() as u64;
        Self {
            id,
            filename: None,
            format: AudioFormat::Memory,
            buffer_mode: BufferMode::Full,
            source_mode: SourceMode::Ram,
            state: BufferState::Loaded,
            source: None,
            pcm,
            stream: Vec::new(),
            spec,
            size,
            idle_time: 0.0,
            bound_players: 0,
            stream_position: 0,
            decode_failed: false,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn buffer_mode(&self) -> BufferMode {
        self.buffer_mode
    }

    pub fn source_mode(&self) -> SourceMode {
        self.source_mode
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn spec(&self) -> PcmSpec {
        self.spec
    }

    /// Total PCM size in bytes; 0 while unknown.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn duration(&self) -> f32 {
        self.spec.duration_of(self.size)
    }

    pub fn is_streamed(&self) -> bool {
        self.buffer_mode == BufferMode::Streamed
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, BufferState::Loaded | BufferState::Streaming)
    }

    pub fn is_async_pending(&self) -> bool {
        self.state == BufferState::Async
    }

    pub fn idle_time(&self) -> f32 {
        self.idle_time
    }

    pub fn bound_players(&self) -> usize {
        self.bound_players
    }

    /// Full decoded PCM. Empty for streamed or not-yet-loaded buffers.
    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    /// The most recently loaded streaming chunk.
    pub fn stream(&self) -> &[u8] {
        &self.stream
    }

    /// Bytes served since the last rewind, modulo total size when known.
    pub fn stream_position(&self) -> u64 {
        if self.size > 0 {
            self.stream_position % self.size
        } else {
            self.stream_position
        }
    }

    /// Mark the buffer as queued on the async loader.
    pub fn mark_async_queued(&mut self) {
        if self.state == BufferState::Empty {
            self.state = BufferState::Async;
        }
    }

    /// Install PCM decoded by the async loader. Ignored unless the buffer
    /// is still waiting on it.
    pub fn install_async(&mut self, spec: PcmSpec, pcm: Vec<u8>) {
        if self.state != BufferState::Async {
            return;
        }
        self.size = pcm.len() as u64;
        self.spec = spec;
        self.pcm = pcm;
        self.state = BufferState::Loaded;
        debug!(buffer = %self.id, size = self.size, "async load completed");
    }

    /// Record an async decode failure; the buffer returns to Empty and
    /// subsequent plays are silent no-ops.
    pub fn async_failed(&mut self, message: &str) {
        if self.state == BufferState::Async {
            self.state = BufferState::Empty;
        }
        self.note_decode_failure(message);
    }

    fn note_decode_failure(&mut self, message: &str) {
        if !self.decode_failed {
            warn!(buffer = %self.id, "decode failed, sound will stay silent: {message}");
            self.decode_failed = true;
        }
    }

    /// Ensure PCM (or an open streaming decoder) is available.
    ///
    /// Decode failures are logged once and returned as [`Error::Decode`];
    /// the buffer stays Empty so a play becomes a silent no-op.
    pub fn prepare(&mut self) -> Result<()> {
        match self.state {
            BufferState::Loaded | BufferState::Streaming => return Ok(()),
            BufferState::Async => {
                return Err(Error::InvalidState(
                    "buffer is still queued on the async loader".into(),
                ))
            }
            BufferState::Empty | BufferState::Released => {}
        }
        if self.decode_failed {
            return Err(Error::Decode("buffer previously failed to decode".into()));
        }
        let filename = match &self.filename {
            Some(filename) => filename.clone(),
            None => {
                return Err(Error::InvalidState(
                    "memory buffer has no source to decode".into(),
                ))
            }
        };
        let result = if self.is_streamed() {
            self.open_streaming(&filename)
        } else {
            self.load_full(&filename)
        };
        if let Err(e) = &result {
            self.note_decode_failure(&e.to_string());
        }
        result
    }

    fn open_streaming(&mut self, filename: &Path) -> Result<()> {
        let mut source = create_source(filename, self.format, self.source_mode)?;
        source
            .open()
            .map_err(|e| Error::Decode(e.to_string()))?;
        self.spec = source.spec();
        self.size = source.size();
        self.source = Some(source);
        self.stream_position = 0;
        self.state = BufferState::Streaming;
        debug!(buffer = %self.id, file = %filename.display(), "streaming source opened");
        Ok(())
    }

    fn load_full(&mut self, filename: &Path) -> Result<()> {
        let mut source = create_source(filename, self.format, self.source_mode)?;
        source.open().map_err(|e| Error::Decode(e.to_string()))?;
        let mut pcm = Vec::new();
        source
            .load(&mut pcm)
            .map_err(|e| Error::Decode(e.to_string()))?;
        self.spec = source.spec();
        self.size = pcm.len() as u64;
        self.pcm = pcm;
        // One decoder per open buffer: the source closes once the PCM is
        // resident.
        self.state = BufferState::Loaded;
        debug!(
            buffer = %self.id,
            file = %filename.display(),
            size = self.size,
            "buffer decoded"
        );
        Ok(())
    }

    /// Decode the next streaming chunk of up to `max_bytes`, wrapping to
    /// the start when looping. Returns the number of bytes now in the
    /// internal stream (0 means end of stream for non-looping playback).
    pub fn load(&mut self, looping: bool, max_bytes: usize) -> Result<usize> {
        if self.state != BufferState::Streaming {
            return Err(Error::InvalidState("buffer is not streaming".into()));
        }
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| Error::InvalidState("streaming buffer lost its source".into()))?;
        self.stream.clear();
        let mut read = source.load_chunk(&mut self.stream, max_bytes)?;
        if read < max_bytes && looping {
            // Wrap at end of stream; a chunk may straddle the seam.
            while read < max_bytes {
                source.rewind()?;
                let more = source.load_chunk(&mut self.stream, max_bytes - read)?;
                if more == 0 {
                    break;
                }
                read += more;
            }
        }
        // The source only learns its total size at the first end of
        // stream for some containers.
        if self.size == 0 {
            self.size = source.size();
        }
        self.stream_position += read as u64;
        Ok(read)
    }

    /// Rewind the streaming decoder to the first frame.
    pub fn rewind(&mut self) -> Result<()> {
        if let Some(source) = self.source.as_mut() {
            source.rewind()?;
        }
        self.stream.clear();
        self.stream_position = 0;
        Ok(())
    }

    /// Copy the full PCM into `output`, decoding synchronously if needed.
    pub fn read_pcm_data(&mut self, output: &mut Vec<u8>) -> Result<usize> {
        if self.is_streamed() {
            return Err(Error::InvalidState(
                "streamed buffers serve chunks, not full PCM".into(),
            ));
        }
        self.prepare()?;
        output.extend_from_slice(&self.pcm);
        Ok(self.pcm.len())
    }

    /// A player starts reading from this buffer.
    pub fn bind(&mut self) {
        self.bound_players += 1;
        self.idle_time = 0.0;
    }

    /// A player stops reading. OnDemand buffers release their PCM when
    /// the last reader leaves.
    pub fn unbind(&mut self) {
        self.bound_players = self.bound_players.saturating_sub(1);
        if self.bound_players == 0 && self.buffer_mode == BufferMode::OnDemand {
            self.release_memory();
        }
    }

    /// Release resident PCM if the mode permits and no player holds it.
    pub fn try_clear_memory(&mut self) -> bool {
        let clearable = matches!(self.buffer_mode, BufferMode::Managed | BufferMode::OnDemand);
        if !clearable || self.bound_players > 0 || self.filename.is_none() {
            return false;
        }
        if !matches!(self.state, BufferState::Loaded) {
            return false;
        }
        self.release_memory();
        true
    }

    fn release_memory(&mut self) {
        if self.filename.is_none() || !matches!(self.state, BufferState::Loaded) {
            return;
        }
        debug!(buffer = %self.id, size = self.size, "releasing buffer memory");
        self.pcm = Vec::new();
        self.state = BufferState::Released;
    }

    /// Advance the idle timer; Managed buffers that sat unbound past the
    /// threshold release their PCM.
    pub fn update(&mut self, dt: f32, idle_unload_time: f32) {
        if self.bound_players > 0 {
            self.idle_time = 0.0;
            return;
        }
        self.idle_time += dt;
        if self.buffer_mode == BufferMode::Managed
            && self.idle_time >= idle_unload_time
            && matches!(self.state, BufferState::Loaded)
        {
            self.release_memory();
        }
    }

    /// Number of bytes a full streaming window holds.
    pub fn stream_window_size(&self) -> usize {
        STREAM_BUFFER_SIZE
    }
}
