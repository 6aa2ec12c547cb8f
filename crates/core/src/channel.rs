//! Length-prefixed message framing over a byte stream.
//!
//! # Frame Format
//!
//! ```text
//! +------------------+
//! | length (4 bytes) |  u32 big-endian, payload size L
//! +------------------+
//! | payload          |  exactly L bytes (L may be 0)
//! | (variable)       |
//! +------------------+
//! ```
//!
//! # End of stream
//!
//! - EOF before or inside the length prefix: clean close, `Ok(None)`.
//! - EOF inside the payload: `FrameError::Truncated`, so a cut-off message is
//!   never mistaken for an orderly shutdown.
//!
//! A declared length above [`MAX_FRAME_SIZE`] is rejected before anything is
//! allocated.

use crate::error::FrameError;
use std::io::{ErrorKind, Read, Write};
use tracing::trace;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload either side will send or accept (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Message-oriented wrapper around a duplex byte stream.
///
/// `send` and `receive` take `&mut self`, so at most one writer (and one
/// reader) can use a channel at a time.
#[derive(Debug)]
pub struct FramedChannel<S> {
    stream: S,
}

impl<S: Read + Write> FramedChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send one message: the 4-byte length, then the payload.
    ///
    /// Prefix and payload go out in a single `write_all`, so a message is
    /// never interleaved with another writer's bytes on the same stream.
    ///
    /// # Errors
    /// `FrameError::TooLarge` above [`MAX_FRAME_SIZE`], `FrameError::Io` on
    /// transport failure (broken pipe, reset).
    pub fn send(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        // Bounded by MAX_FRAME_SIZE, so it fits in u32.
        let len = payload.len() as u32;
        let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);

        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        trace!(len, "frame sent");
        Ok(())
    }

    /// Receive one message.
    ///
    /// Returns `Ok(None)` when the peer closed the stream between messages
    /// (including part way through the prefix), `Ok(Some(payload))` for a
    /// complete message.
    ///
    /// # Errors
    /// `FrameError::Truncated` if the stream ends inside a payload,
    /// `FrameError::TooLarge` for a declared length above the limit, and
    /// `FrameError::Io` for transport failures.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let got = read_full(&mut self.stream, &mut prefix)?;
        if got < LENGTH_PREFIX_SIZE {
            if got > 0 {
                trace!(got, "stream closed inside length prefix");
            }
            return Ok(None);
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut payload = vec![0u8; len];
        let got = read_full(&mut self.stream, &mut payload)?;
        if got < len {
            return Err(FrameError::Truncated {
                expected: len,
                received: got,
            });
        }

        trace!(len, "frame received");
        Ok(Some(payload))
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Fill `buf` from `reader`, tolerating short reads and `Interrupted`.
///
/// Returns the number of bytes read; less than `buf.len()` only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
