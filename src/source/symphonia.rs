//! Symphonia-backed decoder.
//!
//! One implementation covers every supported container; the probe is
//! steered by an extension hint and the actual demuxer/codec pair is
//! chosen by content. Output is always interleaved 16-bit little-endian
//! PCM, whatever the source sample format.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::source::Source;
use crate::types::{AudioFormat, PcmSpec, SourceMode};

/// Encoded file bytes shared between reopenings in RAM mode.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Decoder for one OGG/WAV/FLAC/SPX file.
pub struct SymphoniaSource {
    path: PathBuf,
    format: AudioFormat,
    source_mode: SourceMode,
    /// Whole encoded file, kept across rewinds in RAM mode.
    ram: Option<Arc<Vec<u8>>>,
    reader: Option<Box<dyn FormatReader>>,
    decoder: Option<Box<dyn Decoder>>,
    track_id: u32,
    spec: PcmSpec,
    size: u64,
    /// PCM bytes decoded since the last rewind; fixes `size` at end of
    /// stream for containers that do not declare a frame count.
    decoded_bytes: u64,
    /// Decoded samples beyond what the last chunk request asked for.
    pending: Vec<u8>,
    eos: bool,
}

impl SymphoniaSource {
    pub fn new(path: PathBuf, format: AudioFormat, source_mode: SourceMode) -> Self {
        Self {
            path,
            format,
            source_mode,
            ram: None,
            reader: None,
            decoder: None,
            track_id: 0,
            spec: PcmSpec::default(),
            size: 0,
            decoded_bytes: 0,
            pending: Vec::new(),
            eos: false,
        }
    }

    fn make_stream(&mut self) -> Result<MediaSourceStream> {
        match self.source_mode {
            SourceMode::Disk => {
                let file = std::fs::File::open(&self.path)?;
                Ok(MediaSourceStream::new(Box::new(file), Default::default()))
            }
            SourceMode::Ram => {
                let bytes = match &self.ram {
                    Some(bytes) => Arc::clone(bytes),
                    None => {
                        let bytes = Arc::new(std::fs::read(&self.path)?);
                        self.ram = Some(Arc::clone(&bytes));
                        bytes
                    }
                };
                Ok(MediaSourceStream::new(
                    Box::new(Cursor::new(SharedBytes(bytes))),
                    Default::default(),
                ))
            }
        }
    }

    /// Decode the next packet, appending converted PCM to `out`.
    /// Returns false at end of stream.
    fn decode_packet_into(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::InvalidState("decoder is not open".into()))?;
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::InvalidState("decoder is not open".into()))?;
        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(Error::Decode(format!(
                        "{}: packet read failed: {e}",
                        self.path.display()
                    )))
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let before = out.len();
                    convert_to_i16_bytes(&decoded, out);
                    self.decoded_bytes += (out.len() - before) as u64;
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet is recoverable; skip it.
                    warn!(path = %self.path.display(), "decode error in packet: {e}");
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!(
                        "{}: decode failed: {e}",
                        self.path.display()
                    )))
                }
            }
        }
    }

    fn mark_eos(&mut self) {
        self.eos = true;
        if self.size == 0 {
            self.size = self.decoded_bytes;
        }
    }
}

impl Source for SymphoniaSource {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let stream = self.make_stream()?;
        let mut hint = Hint::new();
        if let Some(ext) = self.format.extension_hint() {
            hint.with_extension(ext);
        }
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                Error::Decode(format!("{}: probe failed: {e}", self.path.display()))
            })?;
        let reader = probed.format;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                Error::Decode(format!("{}: no audio track", self.path.display()))
            })?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode(format!("{}: no sample rate", self.path.display())))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode(format!("{}: no channel count", self.path.display())))?;
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                Error::Decode(format!(
                    "{}: no decoder for codec: {e}",
                    self.path.display()
                ))
            })?;
        self.spec = PcmSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
        };
        self.size = params
            .n_frames
            .map(|frames| frames * self.spec.frame_size())
            .unwrap_or(0);
        self.track_id = track_id;
        self.reader = Some(reader);
        self.decoder = Some(decoder);
        self.decoded_bytes = 0;
        self.pending.clear();
        self.eos = false;
        debug!(
            path = %self.path.display(),
            rate = sample_rate,
            channels,
            size = self.size,
            "opened audio source"
        );
        Ok(())
    }

    fn close(&mut self) {
        self.reader = None;
        self.decoder = None;
        self.pending.clear();
        self.eos = false;
        self.decoded_bytes = 0;
    }

    fn rewind(&mut self) -> Result<()> {
        // Reopening is reliable across every demuxer; RAM mode keeps the
        // encoded bytes so this never touches the filesystem twice.
        let was_open = self.is_open();
        self.close();
        if was_open {
            self.open()?;
        }
        Ok(())
    }

    fn load(&mut self, output: &mut Vec<u8>) -> Result<usize> {
        self.open()?;
        let start = output.len();
        output.append(&mut self.pending);
        while !self.eos {
            if !self.decode_packet_into(output)? {
                self.mark_eos();
            }
        }
        Ok(output.len() - start)
    }

    fn load_chunk(&mut self, output: &mut Vec<u8>, size: usize) -> Result<usize> {
        self.open()?;
        let mut appended = 0;
        if !self.pending.is_empty() {
            let take = self.pending.len().min(size);
            output.extend_from_slice(&self.pending[..take]);
            self.pending.drain(..take);
            appended += take;
        }
        let mut scratch = Vec::new();
        while appended < size && !self.eos {
            scratch.clear();
            if !self.decode_packet_into(&mut scratch)? {
                self.mark_eos();
                break;
            }
            let take = scratch.len().min(size - appended);
            output.extend_from_slice(&scratch[..take]);
            self.pending.extend_from_slice(&scratch[take..]);
            appended += take;
        }
        Ok(appended)
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn spec(&self) -> PcmSpec {
        self.spec
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Interleave a decoded symphonia buffer into 16-bit little-endian PCM.
fn convert_to_i16_bytes(decoded: &AudioBufferRef<'_>, out: &mut Vec<u8>) {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            let buf = $buf;
            let channels = buf.spec().channels.count();
            let frames = buf.frames();
            out.reserve(frames * channels * 2);
            for frame in 0..frames {
                for ch in 0..channels {
                    let sample = buf.chan(ch)[frame];
                    let value: i16 = $convert(sample);
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }};
    }
    match decoded {
        AudioBufferRef::F32(buf) => {
            interleave!(buf, |s: f32| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        }
        AudioBufferRef::F64(buf) => {
            interleave!(buf, |s: f64| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        }
        AudioBufferRef::S8(buf) => interleave!(buf, |s: i8| (s as i16) << 8),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s),
        AudioBufferRef::S24(buf) => {
            interleave!(buf, |s: symphonia::core::sample::i24| (s.inner() >> 8) as i16)
        }
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| (s >> 16) as i16),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| ((s as i32 - 128) << 8) as i16),
        AudioBufferRef::U16(buf) => interleave!(buf, |s: u16| (s as i32 - 32768) as i16),
        AudioBufferRef::U24(buf) => interleave!(buf, |s: symphonia::core::sample::u24| {
            ((s.inner() as i32 - 8_388_608) >> 8) as i16
        }),
        AudioBufferRef::U32(buf) => {
            interleave!(buf, |s: u32| (((s as i64) - 0x8000_0000_i64) >> 16) as i16)
        }
    }
}
