//! Compression pipeline: match finder → packet streams → arithmetic coder.
//!
//! **Container format** (byte-exact, all integers little-endian):
//!
//! ```text
//! offset  size  field
//! 0       2     window_size, u16
//! 2       rest  arithmetic-coded payload
//! ```
//!
//! The payload, after arithmetic decoding, is a header of five
//! distance-coded stream lengths (each stored as length + 1, padded to a
//! byte boundary) followed by the TYPE, LITERAL_MSB, LITERAL, SIZE and
//! OFFSET streams, each byte-aligned.
//!
//! The container is not self-describing: the producer must carry the
//! original size and the decoded payload size out of band (an executable
//! packer stores them next to its loader stub). `compress` reports both
//! through [`CompressedBlock`].

use crate::arith;
use crate::bits::BitEmitter;
use crate::packet::{self, PacketStats, PacketWriter};
use crate::repeats;
use crate::{LzaError, LzaResult};

pub use crate::model::MAX_WINDOW_SIZE;

/// Result of one `compress` call: the container bytes plus the sizes a
/// decompressor needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    /// The compressed container.
    pub data: Vec<u8>,
    /// Size of the arithmetic-coded payload once decoded (header plus the
    /// five streams); `decompress` needs it back.
    pub lz_size: usize,
    /// Packet counts from the match-finder parse.
    pub stats: PacketStats,
}

/// Working-space bound for compressing `src_size` bytes. Compressed
/// output never exceeds this.
pub fn estimate_compress_size(src_size: usize) -> usize {
    src_size.max(4096) * 4
}

/// Compress `src` with the given arithmetic-coder window.
///
/// An empty input produces an empty container. `window_size` must lie in
/// `1..=MAX_WINDOW_SIZE`.
pub fn compress(src: &[u8], window_size: u32) -> LzaResult<CompressedBlock> {
    if window_size == 0 || window_size > MAX_WINDOW_SIZE {
        return Err(LzaError::InvalidInput);
    }
    // Match positions and distances are 32-bit throughout.
    if src.len() > u32::MAX as usize {
        return Err(LzaError::InvalidInput);
    }

    if src.is_empty() {
        return Ok(CompressedBlock {
            data: Vec::new(),
            lz_size: 0,
            stats: PacketStats::default(),
        });
    }

    let mut writer = PacketWriter::with_capacity(src.len());
    repeats::find_repeats(src, &mut writer)?;
    let (streams, stats) = writer.finish();

    let mut header = BitEmitter::with_capacity(16);
    for stream in &streams {
        packet::emit_distance(&mut header, stream.len() as u32 + 1);
    }
    let header = header.finish();

    let lz_size = header.len() + streams.iter().map(Vec::len).sum::<usize>();
    let mut payload = Vec::with_capacity(lz_size);
    payload.extend_from_slice(&header);
    for stream in &streams {
        payload.extend_from_slice(stream);
    }

    let encoded = arith::encode(&payload, window_size);

    let mut data = Vec::with_capacity(2 + encoded.len());
    data.extend_from_slice(&(window_size as u16).to_le_bytes());
    data.extend_from_slice(&encoded);

    Ok(CompressedBlock { data, lz_size, stats })
}

/// Decompress a container produced by [`compress`].
///
/// `lz_size` and `original_size` are the values reported in
/// [`CompressedBlock`]; the container does not carry them.
pub fn decompress(src: &[u8], lz_size: usize, original_size: usize) -> LzaResult<Vec<u8>> {
    if original_size == 0 {
        return if src.is_empty() && lz_size == 0 {
            Ok(Vec::new())
        } else {
            Err(LzaError::InvalidInput)
        };
    }

    let mut dest = vec![0u8; original_size];
    let mut scratch = vec![0u8; lz_size];
    decompress_into(&mut dest, &mut scratch, src)?;
    Ok(dest)
}

/// Decompress into caller-provided buffers: `dest` sized to the original
/// data, `scratch` sized to the decoded payload (`lz_size`).
pub fn decompress_into(dest: &mut [u8], scratch: &mut [u8], src: &[u8]) -> LzaResult<()> {
    if dest.is_empty() {
        return if src.is_empty() {
            Ok(())
        } else {
            Err(LzaError::InvalidInput)
        };
    }

    if src.len() <= 2 || scratch.is_empty() {
        return Err(LzaError::InvalidInput);
    }

    let window_size = u16::from_le_bytes([src[0], src[1]]) as u32;
    if window_size == 0 || window_size > MAX_WINDOW_SIZE {
        return Err(LzaError::InvalidInput);
    }

    arith::decode_to_buf(&src[2..], scratch.len(), scratch, window_size)?;

    packet::decompress_streams(dest, scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(input: &[u8], window_size: u32) {
        let block = compress(input, window_size).unwrap();
        assert!(block.data.len() <= estimate_compress_size(input.len()));
        let decoded = decompress(&block.data, block.lz_size, input.len()).unwrap();
        assert_eq!(decoded, input, "window {window_size}");
    }

    #[test]
    fn test_empty_input() {
        let block = compress(b"", 128).unwrap();
        assert!(block.data.is_empty());
        assert_eq!(block.lz_size, 0);
        assert_eq!(decompress(b"", 0, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_one_byte() {
        round_trip(b"x", 128);
    }

    #[test]
    fn test_short_inputs() {
        for input in [&b"aaa"[..], b"abc", b"abcbc", b"abbbbc", b"ababab"] {
            round_trip(input, 128);
        }
    }

    #[test]
    fn test_text_round_trip() {
        let text = b"the quick brown fox jumps over the lazy dog. \
                     the quick brown fox jumps over the lazy dog. \
                     pack my box with five dozen liquor jugs.";
        round_trip(text, 128);
    }

    #[test]
    fn test_window_range() {
        let input = b"abcabcabcabc nearly periodic data abcabcabc";
        for window in [1, 2, 7, 128, 512, MAX_WINDOW_SIZE] {
            round_trip(input, window);
        }
    }

    #[test]
    fn test_invalid_window_rejected() {
        assert_eq!(compress(b"abc", 0), Err(LzaError::InvalidInput));
        assert_eq!(
            compress(b"abc", MAX_WINDOW_SIZE + 1),
            Err(LzaError::InvalidInput)
        );
    }

    #[test]
    fn test_max_match_length_boundary() {
        for run in [273usize, 274, 275, 546, 547] {
            let mut input = vec![b'r'; run + 1];
            input[0] = b'q';
            round_trip(&input, 128);
        }
    }

    #[test]
    fn test_max_distance() {
        // The final eight bytes copy the first eight, so the match at
        // position 1192 has distance equal to its position.
        let mut input = vec![0u8; 1200];
        let mut state = 0x1234_5678u32;
        for byte in input.iter_mut() {
            state = state.wrapping_mul(0x808_8406).wrapping_add(1);
            *byte = (state >> 16) as u8;
        }
        let (head, tail) = input.split_at_mut(1192);
        tail.copy_from_slice(&head[..8]);
        round_trip(&input, 128);
    }

    #[test]
    fn test_stats_reported() {
        let block = compress(b"abcabcabcabcabc", 128).unwrap();
        assert!(block.stats.literals > 0);
        assert!(block.stats.matches + block.stats.longreps.iter().sum::<usize>() > 0);
        assert!(block.lz_size > 0);
    }

    #[test]
    fn test_deterministic() {
        let input: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let a = compress(&input, 128).unwrap();
        let b = compress(&input, 128).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.lz_size, b.lz_size);
    }

    #[test]
    fn test_truncated_container_rejected() {
        let block = compress(b"some reasonable input data", 128).unwrap();
        assert_eq!(
            decompress(&block.data[..1], block.lz_size, 26),
            Err(LzaError::InvalidInput)
        );
        assert_eq!(
            decompress(&block.data[..2], block.lz_size, 26),
            Err(LzaError::InvalidInput)
        );
    }

    #[test]
    fn test_bad_window_in_container_rejected() {
        let block = compress(b"some reasonable input data", 128).unwrap();
        let mut data = block.data.clone();
        data[0] = 0xFF;
        data[1] = 0xFF;
        assert_eq!(
            decompress(&data, block.lz_size, 26),
            Err(LzaError::InvalidInput)
        );
    }

    #[test]
    fn test_corrupt_payload_fails_closed() {
        // Flipping payload bytes must never panic; either the header
        // lengths no longer fit or a copy references unwritten output.
        let input = b"abcabcabcabc corrupt me abcabc";
        let block = compress(input, 128).unwrap();
        for i in 2..block.data.len() {
            let mut data = block.data.clone();
            data[i] ^= 0x55;
            let _ = decompress(&data, block.lz_size, input.len());
        }
    }

    #[test]
    fn test_zero_original_with_data_rejected() {
        let block = compress(b"abc", 128).unwrap();
        assert_eq!(
            decompress(&block.data, block.lz_size, 0),
            Err(LzaError::InvalidInput)
        );
    }
}
