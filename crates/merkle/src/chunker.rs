use std::ops::Range;

/// Size of a Merkle leaf block in bytes.
pub const BLOCK_SIZE: usize = 64;

/// Splits `data` into consecutive blocks of [`BLOCK_SIZE`] bytes.
///
/// The final block holds `data.len() % 64` bytes, or a full 64 when the length
/// is an exact multiple. An empty buffer yields no blocks.
pub fn blocks(data: &[u8]) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
    data.chunks(BLOCK_SIZE)
}

/// Number of blocks a buffer of `len` bytes is cut into: `ceil(len / 64)`.
#[must_use]
pub fn block_count(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE)
}

/// Indices of the blocks touched by the byte range `[offset, offset + len)`.
///
/// A zero-length range touches no blocks and returns an empty range.
#[must_use]
pub fn block_range(offset: u64, len: usize) -> Range<usize> {
    if len == 0 {
        let at = (offset / BLOCK_SIZE as u64) as usize;
        return at..at;
    }
    let first = (offset / BLOCK_SIZE as u64) as usize;
    let end = offset.saturating_add(len as u64);
    let last = end.div_ceil(BLOCK_SIZE as u64) as usize;
    first..last
}
