//! Flat block-image writer (§4.10.3 / component 11): a straight
//! 819,200-byte `2MG`/`HDV` image addressed in 512-byte blocks.
//!
//! Grounded on `BlockDiskImage.c`. That file names both "the offset a
//! BLOCK row reads its object data from" and "the offset an RW18 row's
//! side/track/intra-track-offset resolves to within the flat image"
//! `sourceOffset`; this port keeps them as distinct fields
//! (`insert.source_offset` vs. the locally computed `dest_offset`) so
//! the two can never be swapped by accident.

use super::{DiskImage, DiskImageInsert, InsertionKind, BLOCK_SIZE, BYTES_PER_SECTOR, RW18_BYTES_PER_TRACK, RW18_SECTORS_PER_TRACK, RW18_SIDE_0, RW18_SIDE_1, RW18_SIDE_2, TRACKS_PER_SIDE};
use crate::error::{DiskErrorKind, DiskImageError};

pub const BLOCKS_PER_SIDE: usize = 800;
pub const BLOCK_IMAGE_SIZE: usize = BLOCKS_PER_SIDE * BLOCK_SIZE;

/// Starting block number for each RW18 side (`startBlockForSide`), found
/// by inspection of the original's three-way side-address comparison.
fn start_block_for_side(side: u16) -> Result<usize, DiskImageError> {
    match side {
        RW18_SIDE_0 => Ok(16),
        RW18_SIDE_1 => Ok(332),
        RW18_SIDE_2 => Ok(647),
        _ => Err(DiskImageError::new(DiskErrorKind::InvalidSide, format!("{side:#x} specifies an invalid side.  Must be 0xa9, 0xad, 0x79."))),
    }
}

pub struct BlockDiskImage {
    image: Vec<u8>,
}

impl BlockDiskImage {
    pub fn new() -> Self {
        Self { image: vec![0u8; BLOCK_IMAGE_SIZE] }
    }

    fn insert_block(&mut self, data: &[u8], insert: &DiskImageInsert, block: u32, intra_block_offset: u32) -> Result<(), DiskImageError> {
        if intra_block_offset as usize >= BLOCK_SIZE {
            return Err(DiskImageError::new(DiskErrorKind::InvalidIntraBlockOffset, format!("{intra_block_offset} specifies an invalid intra block offset.  Must be 0 - 511.")));
        }
        let dest_offset = block as usize * BLOCK_SIZE + intra_block_offset as usize;
        self.copy_in(data, insert.source_offset as usize, dest_offset, insert.length as usize)
    }

    fn insert_rw18(&mut self, data: &[u8], insert: &DiskImageInsert, side: u16, track: u32, intra_track_offset: u32) -> Result<(), DiskImageError> {
        if track as usize >= TRACKS_PER_SIDE {
            return Err(DiskImageError::new(DiskErrorKind::InvalidTrack, format!("{track} specifies an invalid track.  Must be 0 - 34.")));
        }
        if intra_track_offset as usize >= RW18_BYTES_PER_TRACK {
            return Err(DiskImageError::new(DiskErrorKind::InvalidIntraTrackOffset, format!("{intra_track_offset} specifies an invalid intra track offset.  Must be 0 - 4607.")));
        }
        let start_block = start_block_for_side(side)?;

        let sector_within_side = track as usize * RW18_SECTORS_PER_TRACK + intra_track_offset as usize / BYTES_PER_SECTOR;
        let intra_sector_offset = intra_track_offset as usize % BYTES_PER_SECTOR;
        let block_within_side = sector_within_side / 2;
        let intra_block_offset = (sector_within_side % 2) * BYTES_PER_SECTOR + intra_sector_offset;

        let dest_offset = (start_block + block_within_side) * BLOCK_SIZE + intra_block_offset;
        self.copy_in(data, insert.source_offset as usize, dest_offset, insert.length as usize)
    }

    fn copy_in(&mut self, data: &[u8], src_offset: usize, dest_offset: usize, length: usize) -> Result<(), DiskImageError> {
        if dest_offset + length > self.image.len() {
            return Err(DiskImageError::new(DiskErrorKind::BlockExceedsImageBounds, format!("Write starting at block {} won't fit in output image file.", dest_offset / BLOCK_SIZE)));
        }
        if src_offset + length > data.len() {
            return Err(DiskImageError::new(DiskErrorKind::InvalidLength, "insertion length exceeds the loaded object data".to_string()));
        }
        self.image[dest_offset..dest_offset + length].copy_from_slice(&data[src_offset..src_offset + length]);
        Ok(())
    }
}

impl Default for BlockDiskImage {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskImage for BlockDiskImage {
    fn insert_data(&mut self, data: &[u8], insert: &DiskImageInsert) -> Result<(), DiskImageError> {
        match insert.kind {
            InsertionKind::Block { block, intra_block_offset } => self.insert_block(data, insert, block, intra_block_offset),
            InsertionKind::Rw18 { side, track, intra_track_offset } => self.insert_rw18(data, insert, side, track, intra_track_offset),
            InsertionKind::Rwts16 { .. } | InsertionKind::Rwts16Cp { .. } => {
                Err(DiskImageError::new(DiskErrorKind::InvalidInsertionType, "RWTS16 insertion types aren't supported for this output image type.".to_string()))
            }
        }
    }

    fn image(&self) -> &[u8] {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_insert_copies_at_the_requested_offset() {
        let mut img = BlockDiskImage::new();
        let data = vec![0xAAu8; 512];
        let insert = DiskImageInsert { kind: InsertionKind::Block { block: 2, intra_block_offset: 0 }, source_offset: 0, length: 512 };
        img.insert_data(&data, &insert).unwrap();
        assert!(img.image()[2 * BLOCK_SIZE..2 * BLOCK_SIZE + 512].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn block_insert_rejects_out_of_range_intra_block_offset() {
        let mut img = BlockDiskImage::new();
        let insert = DiskImageInsert { kind: InsertionKind::Block { block: 0, intra_block_offset: 512 }, source_offset: 0, length: 0 };
        let err = img.insert_data(&[], &insert).unwrap_err();
        assert_eq!(err.kind, DiskErrorKind::InvalidIntraBlockOffset);
    }

    #[test]
    fn rw18_insert_resolves_side_1_track_0_sector_0_to_its_documented_block() {
        let mut img = BlockDiskImage::new();
        let data = vec![0xFFu8; 256];
        let insert = DiskImageInsert { kind: InsertionKind::Rw18 { side: RW18_SIDE_1, track: 0, intra_track_offset: 0 }, source_offset: 0, length: 256 };
        img.insert_data(&data, &insert).unwrap();
        let dest = 332 * BLOCK_SIZE;
        assert!(img.image()[dest..dest + 256].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn rw18_insert_rejects_unknown_side() {
        let mut img = BlockDiskImage::new();
        let insert = DiskImageInsert { kind: InsertionKind::Rw18 { side: 0x12, track: 0, intra_track_offset: 0 }, source_offset: 0, length: 0 };
        let err = img.insert_data(&[], &insert).unwrap_err();
        assert_eq!(err.kind, DiskErrorKind::InvalidSide);
    }
}
