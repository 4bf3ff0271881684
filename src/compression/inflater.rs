//! Decompress zlib-stream gateway messages.
//!
//! This module contains the [`Inflater`], which accumulates compressed bytes
//! across transport frames, detects the in-band sync-flush sentinel, and
//! inflates against a single persistent [`Decompress`] context held for the
//! lifetime of the connection.

use flate2::{Decompress, DecompressError, FlushDecompress};
use std::mem;

/// The four trailing bytes that mark the end of a zlib-stream sync flush.
///
/// <https://discord.com/developers/docs/topics/gateway#transport-compression-transport-compression-example>
const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Initial capacity for both the accumulation and output buffers.
const INITIAL_BUFFER_SIZE: usize = 32 * 1024;

/// Decompresses gateway messages sent in zlib-stream mode.
#[derive(Debug)]
pub struct Inflater {
    /// Zlib decompressor, shared across every message of a connection; it is
    /// never flushed or reset mid-connection.
    decompress: Decompress,
    /// Buffer accumulating compressed bytes until the sync-flush sentinel is
    /// observed at its end.
    compressed: Vec<u8>,
    /// Intermediate buffer for a single call to `decompress_vec`.
    internal_buffer: Vec<u8>,
    /// Buffer holding the most recently inflated message, handed to the
    /// caller via [`take`][`Self::take`].
    buffer: Vec<u8>,
    /// Cap on the accumulation buffer's retained capacity; exceeding it after
    /// a successful inflation causes the buffer to be released and
    /// reallocated rather than merely truncated.
    max_persistent_buffer_size: usize,
}

impl Inflater {
    /// Create a new inflater with the given accumulation-buffer cap.
    pub fn new(max_persistent_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            compressed: Vec::new(),
            decompress: Decompress::new(true),
            internal_buffer: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            max_persistent_buffer_size,
        }
    }

    /// Extend the accumulation buffer with freshly received bytes.
    pub fn extend(&mut self, slice: &[u8]) {
        self.compressed.extend_from_slice(slice);
    }

    /// Inflate the next message if the accumulation buffer ends in the
    /// sync-flush sentinel.
    ///
    /// Returns `None` if the buffer does not yet end in the sentinel, i.e.
    /// more frames are needed before the logical message is complete.
    ///
    /// After a successful inflation the accumulation buffer is always left
    /// empty, with its capacity released if it exceeded
    /// [`max_persistent_buffer_size`][`Self::max_persistent_buffer_size`].
    ///
    /// # Errors
    ///
    /// Returns `flate2`'s `DecompressError` if the compressed stream is
    /// malformed.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn msg(&mut self) -> Result<Option<&mut [u8]>, DecompressError> {
        let length = self.compressed.len();

        if length < 4 || self.compressed[(length - 4)..] != ZLIB_SUFFIX {
            return Ok(None);
        }

        self.buffer.clear();

        let before = self.decompress.total_in();
        let mut offset = 0;

        loop {
            self.internal_buffer.clear();

            self.decompress.decompress_vec(
                &self.compressed[offset..],
                &mut self.internal_buffer,
                FlushDecompress::Sync,
            )?;

            offset = (self.decompress.total_in() - before)
                .try_into()
                .unwrap_or_default();
            self.buffer.extend_from_slice(&self.internal_buffer);

            let not_at_capacity = self.internal_buffer.len() < self.internal_buffer.capacity();

            if not_at_capacity || offset > self.compressed.len() {
                break;
            }
        }

        tracing::trace!(
            bytes_in = self.compressed.len(),
            bytes_out = self.buffer.len(),
            "inflated message",
        );

        self.release_compressed();

        Ok(Some(&mut self.buffer))
    }

    /// Release the accumulation buffer's storage per the configured cap, or
    /// simply truncate it if its capacity is within bounds.
    fn release_compressed(&mut self) {
        if self.compressed.capacity() > self.max_persistent_buffer_size {
            self.compressed = Vec::new();
        } else {
            self.compressed.clear();
        }
    }

    /// Take the most recently inflated message, replacing it with an empty
    /// buffer.
    pub fn take(&mut self) -> Vec<u8> {
        mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::Inflater;
    use std::error::Error;

    const MESSAGE: &[u8] = &[
        120, 156, 52, 201, 65, 10, 131, 48, 16, 5, 208, 187, 252, 117, 82, 98, 169, 32, 115, 21,
        35, 50, 53, 67, 27, 136, 81, 226, 216, 82, 66, 238, 222, 110, 186, 123, 240, 42, 20, 148,
        207, 148, 12, 142, 63, 182, 29, 212, 57, 131, 0, 170, 120, 10, 23, 189, 11, 235, 28, 179,
        74, 121, 113, 2, 221, 186, 107, 255, 251, 89, 11, 47, 2, 26, 49, 122, 60, 88, 229, 205, 31,
        187, 151, 96, 87, 142, 217, 14, 253, 16, 60, 76, 245, 88, 227, 82, 182, 195, 131, 220, 197,
        181, 9, 83, 107, 95, 0, 0, 0, 255, 255,
    ];
    const OUTPUT: &[u8] = &[
        123, 34, 116, 34, 58, 110, 117, 108, 108, 44, 34, 115, 34, 58, 110, 117, 108, 108, 44, 34,
        111, 112, 34, 58, 49, 48, 44, 34, 100, 34, 58, 123, 34, 104, 101, 97, 114, 116, 98, 101,
        97, 116, 95, 105, 110, 116, 101, 114, 118, 97, 108, 34, 58, 52, 49, 50, 53, 48, 44, 34, 95,
        116, 114, 97, 99, 101, 34, 58, 91, 34, 91, 92, 34, 103, 97, 116, 101, 119, 97, 121, 45,
        112, 114, 100, 45, 109, 97, 105, 110, 45, 56, 53, 56, 100, 92, 34, 44, 123, 92, 34, 109,
        105, 99, 114, 111, 115, 92, 34, 58, 48, 46, 48, 125, 93, 34, 93, 125, 125,
    ];

    #[test]
    fn inflater_buffers_incomplete_frames() -> Result<(), Box<dyn Error>> {
        let mut inflater = Inflater::new(3 * 1024 * 1024);
        inflater.extend(&MESSAGE[0..MESSAGE.len() - 2]);
        assert_eq!(None, inflater.msg()?);

        inflater.extend(&MESSAGE[MESSAGE.len() - 2..]);
        assert_eq!(Some(OUTPUT), inflater.msg()?.as_deref());

        Ok(())
    }

    #[test]
    fn inflater_inflates_once_across_three_split_frames() -> Result<(), Box<dyn Error>> {
        let first_boundary = MESSAGE.len() / 3;
        let second_boundary = 2 * MESSAGE.len() / 3;

        let mut inflater = Inflater::new(3 * 1024 * 1024);

        inflater.extend(&MESSAGE[..first_boundary]);
        assert_eq!(None, inflater.msg()?);

        inflater.extend(&MESSAGE[first_boundary..second_boundary]);
        assert_eq!(None, inflater.msg()?);

        inflater.extend(&MESSAGE[second_boundary..]);
        assert_eq!(Some(OUTPUT), inflater.msg()?.as_deref());

        Ok(())
    }

    #[test]
    fn inflater_clears_compressed_after_message() -> Result<(), Box<dyn Error>> {
        let mut inflater = Inflater::new(3 * 1024 * 1024);
        inflater.extend(MESSAGE);
        assert!(!inflater.compressed.is_empty());

        inflater.msg()?;
        assert!(inflater.compressed.is_empty());
        assert!(!inflater.buffer.is_empty());

        Ok(())
    }

    #[test]
    fn inflater_releases_oversized_compressed_buffer() -> Result<(), Box<dyn Error>> {
        let mut inflater = Inflater::new(16);
        inflater.extend(MESSAGE);
        assert!(inflater.compressed.capacity() > 16);

        inflater.msg()?;

        assert_eq!(0, inflater.compressed.capacity());

        Ok(())
    }

    #[test]
    fn take_resets_output_buffer() -> Result<(), Box<dyn Error>> {
        let mut inflater = Inflater::new(3 * 1024 * 1024);
        inflater.extend(MESSAGE);
        inflater.msg()?;

        let taken = inflater.take();
        assert_eq!(OUTPUT, &taken[..]);
        assert!(inflater.buffer.is_empty());

        Ok(())
    }
}
