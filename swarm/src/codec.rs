//! Message framing: sizing, optional compression and bincode encoding.
//!
//! A frame is built in two passes. The first pass serializes into a
//! [`CountingWriter`] that throws bytes away and only counts them, which
//! yields the exact frame length. The second pass serializes again into a
//! [`SizedBuffer`] allocated with exactly that length. When compression is on,
//! both passes run through the same zlib encoder settings so the counted
//! length matches the final frame byte for byte.
//!
//! Compression is a property of the [`Codec`] instance. There is no header
//! telling the receiver whether a frame is compressed: both ends of a realm
//! must be built with the same codec.

use std::io::{self, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Default zlib level when compression is enabled without an explicit level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Sink that discards everything written to it and counts the bytes.
#[derive(Debug, Default)]
pub struct CountingWriter {
    count: usize,
}

impl CountingWriter {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.count += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fixed-length output buffer. It never reallocates; bytes past the end are
/// counted but dropped so the caller can report the overflow.
#[derive(Debug)]
pub struct SizedBuffer {
    buf: Box<[u8]>,
    written: usize,
}

impl SizedBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            buf: vec![0u8; len].into_boxed_slice(),
            written: 0,
        }
    }

    /// Returns the filled buffer, or `FrameSize` if it was not filled exactly.
    pub fn into_vec(self) -> Result<Vec<u8>> {
        if self.written != self.buf.len() {
            return Err(Error::FrameSize {
                expected: self.buf.len(),
                actual: self.written,
            });
        }
        Ok(self.buf.into_vec())
    }
}

impl Write for SizedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let start = self.written.min(self.buf.len());
        let fit = data.len().min(self.buf.len() - start);
        self.buf[start..start + fit].copy_from_slice(&data[..fit]);
        self.written += data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encoding settings shared by every node of one realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    compression: Option<Compression>,
}

impl Codec {
    /// Frames are raw bincode.
    pub fn plain() -> Self {
        Self { compression: None }
    }

    /// Frames are bincode run through zlib at `level` (0-9).
    pub fn compressed(level: u32) -> Self {
        Self {
            compression: Some(Compression::new(level.min(9))),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// Exact length of the frame [`encode`](Self::encode) would produce.
    pub fn size_of<T: Serialize + ?Sized>(&self, value: &T) -> Result<usize> {
        match self.compression {
            None => {
                let mut sink = CountingWriter::default();
                bincode::serialize_into(&mut sink, value)?;
                Ok(sink.count())
            }
            Some(level) => {
                let mut encoder = ZlibEncoder::new(CountingWriter::default(), level);
                bincode::serialize_into(&mut encoder, value)?;
                Ok(encoder.finish()?.count())
            }
        }
    }

    /// Serializes `value` into a buffer of exactly its framed size.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let size = self.size_of(value)?;
        let mut frame = SizedBuffer::new(size);
        match self.compression {
            None => bincode::serialize_into(&mut frame, value)?,
            Some(level) => {
                let mut encoder = ZlibEncoder::new(&mut frame, level);
                bincode::serialize_into(&mut encoder, value)?;
                encoder.finish()?;
            }
        }
        frame.into_vec()
    }

    pub fn decode<T: DeserializeOwned>(&self, frame: &[u8]) -> Result<T> {
        match self.compression {
            None => Ok(bincode::deserialize(frame)?),
            Some(_) => Ok(bincode::deserialize_from(ZlibDecoder::new(frame))?),
        }
    }
}

/// Raw bincode, used for values nested inside a frame (task payloads,
/// response data). The enclosing frame is what gets compressed.
pub fn encode_plain<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode_plain<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}
