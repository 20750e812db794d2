//! Binary buffer (§4.9): a 64 KiB append-only arena with an `origin`
//! marker and a FIFO queue of deferred `SAV` writes.
//!
//! The object buffer and the `DUM`/`DEND` dummy buffer are each one of
//! these; `LineInfo`s only ever reference them by `(offset, length)`
//! (§3.1/§5) rather than by pointer.

use std::io::Write;

pub const BUFFER_CAPACITY: usize = 64 * 1024;

/// The header written ahead of a queued write's payload.
#[derive(Debug, Clone)]
pub enum HeaderKind {
    /// `"SAV\x1A"` + little-endian `(address, length)` u16 pair (§6).
    Sav,
    /// The RW18 variant: `"SAV\x1A"` + little-endian `(side, track,
    /// offset, length)` u16 quad (§6).
    Rw18Sav { side: u16, track: u16, offset_in_track: u16 },
}

#[derive(Debug, Clone)]
struct QueuedWrite {
    base: usize,
    length: usize,
    origin: u16,
    filename: String,
    header: HeaderKind,
}

#[derive(Debug, Clone)]
pub struct BinaryBuffer {
    bytes: Vec<u8>,
    origin: u16,
    /// Offset into `bytes` that `origin` currently maps to — the start
    /// of the segment the next `SAV` will capture.
    base: usize,
    /// The single most recent allocation's `(start, len)`, the only one
    /// `realloc_grow` is permitted to extend (§4.9).
    last_alloc: Option<(usize, usize)>,
    queue: Vec<QueuedWrite>,
}

impl Default for BinaryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::with_capacity(BUFFER_CAPACITY), origin: 0, base: 0, last_alloc: None, queue: Vec::new() }
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// Current write cursor, i.e. how many bytes have been appended in
    /// total.
    pub fn cursor(&self) -> usize {
        self.bytes.len()
    }

    /// Appends `data` as one allocation, returning its `(start, len)`.
    pub fn alloc(&mut self, data: &[u8]) -> (usize, usize) {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(data);
        self.last_alloc = Some((start, data.len()));
        (start, data.len())
    }

    /// Grows the most recent allocation by appending `more` bytes
    /// directly after it. Panics if nothing has been allocated yet,
    /// mirroring the original's "Realloc is only valid for the most
    /// recent allocation" invariant (a Rust port has no pointer to
    /// misuse, but the call-site contract stays the same).
    pub fn realloc_grow(&mut self, more: &[u8]) -> (usize, usize) {
        let (start, len) = self.last_alloc.expect("realloc_grow with no prior allocation");
        debug_assert_eq!(start + len, self.bytes.len(), "realloc_grow on a non-trailing allocation");
        self.bytes.extend_from_slice(more);
        let new_len = len + more.len();
        self.last_alloc = Some((start, new_len));
        (start, new_len)
    }

    pub fn read(&self, start: usize, len: usize) -> &[u8] {
        &self.bytes[start..start + len]
    }

    /// Replaces the `len` bytes at `start` in place, for forward-
    /// reference patch-back (§4.8). The caller is responsible for only
    /// ever overwriting a range with the same length it already has.
    pub fn overwrite(&mut self, start: usize, bytes: &[u8]) {
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Sets the logical origin address for the next segment; snapshots
    /// the current cursor as that segment's base (§4.9).
    pub fn set_origin(&mut self, origin: u16) {
        self.origin = origin;
        self.base = self.bytes.len();
    }

    /// Queues `(base..cursor)` for later output under `filename`. The
    /// next `SAV` (or `ORG`) establishes a fresh base for any further
    /// bytes.
    pub fn queue_write_to_file(&mut self, filename: impl Into<String>, header: HeaderKind) {
        let length = self.bytes.len() - self.base;
        self.queue.push(QueuedWrite { base: self.base, length, origin: self.origin, filename: filename.into(), header });
    }

    /// Drains the write queue, attempting every entry even if an
    /// earlier one fails; returns the *last* error seen, if any (§4.9).
    pub fn process_write_file_queue(&self) -> Result<(), std::io::Error> {
        let mut last_err = None;
        for entry in &self.queue {
            if let Err(e) = self.write_one(entry) {
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_one(&self, entry: &QueuedWrite) -> Result<(), std::io::Error> {
        let payload = &self.bytes[entry.base..entry.base + entry.length];
        let mut file = std::fs::File::create(&entry.filename)?;
        match &entry.header {
            HeaderKind::Sav => {
                file.write_all(b"SAV\x1A")?;
                file.write_all(&entry.origin.to_le_bytes())?;
                file.write_all(&(entry.length as u16).to_le_bytes())?;
            }
            HeaderKind::Rw18Sav { side, track, offset_in_track } => {
                file.write_all(b"R18\x1A")?;
                file.write_all(&side.to_le_bytes())?;
                file.write_all(&track.to_le_bytes())?;
                file.write_all(&offset_in_track.to_le_bytes())?;
                file.write_all(&(entry.length as u16).to_le_bytes())?;
            }
        }
        file.write_all(payload)?;
        Ok(())
    }

    pub fn is_empty_queue(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_realloc_grow_appends_contiguously() {
        let mut buf = BinaryBuffer::new();
        let (start, len) = buf.alloc(&[0xA9]);
        assert_eq!((start, len), (0, 1));
        let (start2, len2) = buf.realloc_grow(&[0x60]);
        assert_eq!(start2, 0);
        assert_eq!(len2, 2);
        assert_eq!(buf.read(0, 2), &[0xA9, 0x60]);
    }

    #[test]
    fn set_origin_snapshots_base_for_queueing() {
        let mut buf = BinaryBuffer::new();
        buf.set_origin(0x8000);
        buf.alloc(&[0xA9, 0x60]);
        assert_eq!(buf.origin(), 0x8000);
        assert_eq!(buf.cursor(), 2);
    }
}
