//! Bounds-checked cursor over a raw byte buffer.
//!
//! Every search yields `Option`: a missing delimiter is an explicit `None`,
//! never an offset computed from an invalid position.

use memchr::memmem;

/// A read position within a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[cfg(test)]
    fn position(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Returns the bytes before the next occurrence of `delim` and advances
    /// past the delimiter. Leaves the cursor untouched when `delim` is absent.
    pub fn take_until(&mut self, delim: &[u8]) -> Option<&'a [u8]> {
        let rest = self.rest();
        let idx = memmem::find(rest, delim)?;
        self.pos += idx + delim.len();
        Some(&rest[..idx])
    }
}

/// Offset just past the first `\r\n\r\n`, i.e. the size of the header block.
pub fn header_block_len(buf: &[u8]) -> Option<usize> {
    memmem::find(buf, b"\r\n\r\n").map(|idx| idx + 4)
}
