//! Disk-image builders (§4.10-§4.12): a shared `DiskImageInsert` request
//! type, a byte-exact `SAV`/RW18-`SAV` object-file reader, and the
//! `DiskImage` trait implemented by the nibble and block image writers.
//!
//! `nibble` and `block` share nothing but this module's constants and
//! insertion vocabulary; the script engine in `script` is generic over
//! whichever `DiskImage` it is pointed at so the same CSV driver feeds
//! either output format.

pub mod block;
pub mod nibble;
pub mod script;

use crate::error::{DiskErrorKind, DiskImageError};

pub const BYTES_PER_SECTOR: usize = 256;
pub const PAGE_SIZE: usize = BYTES_PER_SECTOR;
pub const SECTORS_PER_BLOCK: usize = 2;
pub const BLOCK_SIZE: usize = SECTORS_PER_BLOCK * BYTES_PER_SECTOR;
pub const TRACKS_PER_SIDE: usize = 35;

pub const RW18_SIDE_0: u16 = 0xa9;
pub const RW18_SIDE_1: u16 = 0xad;
pub const RW18_SIDE_2: u16 = 0x79;
pub const RW18_SECTORS_PER_TRACK: usize = 18;
pub const RW18_BYTES_PER_TRACK: usize = RW18_SECTORS_PER_TRACK * BYTES_PER_SECTOR;

pub const RWTS16_NIBBLES_PER_SECTOR: usize = 416;
pub const RWTS16_SECTORS_PER_TRACK: usize = 16;
pub const NIBBLES_PER_TRACK: usize = RWTS16_NIBBLES_PER_SECTOR * RWTS16_SECTORS_PER_TRACK;
pub const NIBBLE_IMAGE_SIZE: usize = NIBBLES_PER_TRACK * TRACKS_PER_SIDE;
pub const RWTS16_GAP1_SYNC_BYTES: usize = 48;
pub const RWTS16_GAP2_SYNC_BYTES: usize = 5;
pub const RWTS16_GAP3_SYNC_BYTES: usize = 5;

/// What kind of row produced this insertion and the fields peculiar to
/// that kind (§3: `DiskImageInsert`, realized as an enum instead of the
/// original's tagged union — there is no untagged-access path in Rust to
/// misuse).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionKind {
    Rwts16 { track: u32, sector: u32 },
    Rwts16Cp { track: u32, sector: u32 },
    Rw18 { side: u16, track: u32, intra_track_offset: u32 },
    Block { block: u32, intra_block_offset: u32 },
}

/// One request to copy `length` bytes starting at `source_offset` within
/// a loaded object buffer into an image, positioned per `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskImageInsert {
    pub kind: InsertionKind,
    pub source_offset: u32,
    pub length: u32,
}

/// Common surface both image writers implement; the script engine only
/// ever talks to this trait.
pub trait DiskImage {
    fn insert_data(&mut self, data: &[u8], insert: &DiskImageInsert) -> Result<(), DiskImageError>;
    fn image(&self) -> &[u8];
}

/// Defaults an RW18 `SAV` object file's header seeds for a following
/// script row's `*` placeholders (§4.12.2) — these come from the object
/// file just loaded, not from the previous script row's own fields (that
/// asymmetry belongs to `BLOCK`'s `*` handling instead, in `script.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rw18Defaults {
    pub side: u16,
    pub track: u16,
    pub offset_in_track: u16,
}

/// An object file loaded from disk, plus whatever `SAV`/RW18-`SAV`
/// header it carried (§4.12, §6 "Object file header").
#[derive(Debug, Clone)]
pub struct ObjectFile {
    /// Payload bytes, rounded up in length to a 512-byte block boundary;
    /// bytes beyond `length` are zero-fill padding (mirrors
    /// `roundUpLengthToBlockSize` sizing the backing `ByteBuffer`).
    pub bytes: Vec<u8>,
    pub length: u32,
    pub rw18_defaults: Option<Rw18Defaults>,
}

const SAV_SIGNATURE: &[u8; 4] = b"SAV\x1A";
/// Distinct 4-byte magic for the RW18 variant header, so a reader never
/// has to guess which of the two header shapes a plain `SAV\x1A` match
/// implies.
const RW18_SAV_SIGNATURE: &[u8; 4] = b"R18\x1A";
const SAV_HEADER_LEN: usize = 8;
const RW18_SAV_HEADER_LEN: usize = 12;

fn round_up_to_block(length: u32) -> u32 {
    let block = BLOCK_SIZE as u32;
    (length + (block - 1)) & !(block - 1)
}

impl ObjectFile {
    /// Reads `path`, sniffing for the `SAV`/RW18-`SAV` headers exactly as
    /// `determineObjectSizeFromFileHeader` does: a recognized header
    /// seeds `length` (and, for RW18, the positional defaults) from the
    /// header rather than the file's actual size, and the payload is read
    /// starting right after whichever header was consumed. An
    /// unrecognized file is read whole, with no header skipped.
    pub fn read(path: &std::path::Path) -> Result<Self, DiskImageError> {
        use std::io::Read;

        let mut file = std::fs::File::open(path)
            .map_err(|_| DiskImageError::new(DiskErrorKind::FileOpen, format!("Failed to open '{}' object file.", path.display())))?;

        let mut probe = [0u8; SAV_HEADER_LEN];
        let probe_read = read_fully_up_to(&mut file, &mut probe)
            .map_err(|_| DiskImageError::new(DiskErrorKind::FileGeneric, format!("Failed to process '{}' object file.", path.display())))?;

        if probe_read == SAV_HEADER_LEN && &probe[0..4] == SAV_SIGNATURE.as_slice() {
            let length = u16::from_le_bytes([probe[6], probe[7]]) as u32;
            let rounded = round_up_to_block(length);
            let mut bytes = vec![0u8; rounded as usize];
            read_payload(&mut file, &mut bytes, length, path)?;
            return Ok(ObjectFile { bytes, length, rw18_defaults: None });
        }

        // The RW18 variant carries a longer header (side/track/offset/
        // length instead of address/length); read the remaining bytes to
        // complete it.
        if probe_read == SAV_HEADER_LEN && probe[0..4] == RW18_SAV_SIGNATURE[..] {
            let mut rest = [0u8; RW18_SAV_HEADER_LEN - SAV_HEADER_LEN];
            file.read_exact(&mut rest)
                .map_err(|_| DiskImageError::new(DiskErrorKind::FileGeneric, format!("Failed to process '{}' object file.", path.display())))?;
            let side = u16::from_le_bytes([probe[4], probe[5]]);
            let track = u16::from_le_bytes([probe[6], probe[7]]);
            let offset_in_track = u16::from_le_bytes([rest[0], rest[1]]);
            let length = u16::from_le_bytes([rest[2], rest[3]]) as u32;
            let rounded = round_up_to_block(length);
            let mut bytes = vec![0u8; rounded as usize];
            read_payload(&mut file, &mut bytes, length, path)?;
            return Ok(ObjectFile {
                bytes,
                length,
                rw18_defaults: Some(Rw18Defaults { side, track, offset_in_track }),
            });
        }

        // No recognized header: read the whole file as the payload.
        let mut whole = probe[..probe_read].to_vec();
        file.read_to_end(&mut whole)
            .map_err(|_| DiskImageError::new(DiskErrorKind::FileGeneric, format!("Failed to process '{}' object file.", path.display())))?;
        let length = whole.len() as u32;
        let rounded = round_up_to_block(length);
        whole.resize(rounded as usize, 0);
        Ok(ObjectFile { bytes: whole, length, rw18_defaults: None })
    }
}

fn read_fully_up_to(file: &mut std::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::io::Read;
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn read_payload(file: &mut std::fs::File, bytes: &mut [u8], length: u32, path: &std::path::Path) -> Result<(), DiskImageError> {
    use std::io::Read;
    file.read_exact(&mut bytes[..length as usize])
        .map_err(|_| DiskImageError::new(DiskErrorKind::FileGeneric, format!("Failed to process '{}' object file.", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_to_block_pads_to_512() {
        assert_eq!(round_up_to_block(0), 0);
        assert_eq!(round_up_to_block(1), 512);
        assert_eq!(round_up_to_block(512), 512);
        assert_eq!(round_up_to_block(513), 1024);
    }
}
