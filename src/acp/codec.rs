//! Newline framing for agent stdout.
//!
//! Wraps [`LinesCodec`] with a line cap so a wedged or chatty agent cannot
//! make the reader buffer without bound. Lines that cannot become frames
//! are skipped inside the decoder and logged at `WARN`:
//!
//! - a line longer than the cap is discarded up to its terminating newline,
//! - a line that is not valid UTF-8 is dropped whole.
//!
//! Neither reaches the stream as an error, because `FramedRead` ends the
//! stream after the first decoder error. A partial trailing line stays in
//! the buffer until its newline arrives.

use std::io::ErrorKind;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Largest inbound line accepted: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON decoder for the agent's stdout.
#[derive(Debug)]
pub struct AcpCodec {
    inner: LinesCodec,
    max_line_bytes: usize,
    skipped: u64,
}

impl AcpCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }

    /// Codec with a custom inbound line cap.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_bytes),
            max_line_bytes,
            skipped: 0,
        }
    }

    /// Number of lines dropped so far for length or encoding.
    #[must_use]
    pub fn skipped_lines(&self) -> u64 {
        self.skipped
    }

    /// Turn a recoverable framing error into a skip; pass real I/O errors on.
    fn skip_or_fail(&mut self, err: LinesCodecError) -> Result<()> {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                self.skipped += 1;
                warn!(
                    max_line_bytes = self.max_line_bytes,
                    "acp codec: line too long, discarding"
                );
                Ok(())
            }
            LinesCodecError::Io(io_err) if io_err.kind() == ErrorKind::InvalidData => {
                self.skipped += 1;
                warn!(error = %io_err, "acp codec: undecodable line, discarding");
                Ok(())
            }
            LinesCodecError::Io(io_err) => Err(AppError::Io(io_err.to_string())),
        }
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = String;
    type Error = AppError;

    // Every skipped error has consumed input (or switched the inner codec
    // into discard mode), so these loops always make progress.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.inner.decode(src) {
                Ok(frame) => return Ok(frame),
                Err(err) => self.skip_or_fail(err)?,
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.inner.decode_eof(src) {
                Ok(frame) => return Ok(frame),
                Err(err) => self.skip_or_fail(err)?,
            }
        }
    }
}
