//! RWTS16/RW18 nibble encoder (§4.10/§4.11): writes bit-exact Apple II
//! disk nibbles into a flat 232,960-byte image and can read a previously
//! written RW18 track back out.
//!
//! Grounded on `NibbleDiskImage.c`. The original mutates a handful of
//! write-cursor fields (`pWrite`/`pRead`/`checksum`/`lastByte`/`aux`) as
//! it walks a sector; this port keeps the same sequencing but threads
//! the cursor as a local `usize` into `self.image` instead of a raw
//! pointer, and returns a `Result` everywhere the original would
//! `__throw`.

use super::{DiskImage, DiskImageInsert, InsertionKind, BYTES_PER_SECTOR, NIBBLES_PER_TRACK, NIBBLE_IMAGE_SIZE, PAGE_SIZE, RWTS16_GAP1_SYNC_BYTES, RWTS16_GAP2_SYNC_BYTES, RWTS16_GAP3_SYNC_BYTES, RWTS16_NIBBLES_PER_SECTOR, RWTS16_SECTORS_PER_TRACK, RW18_BYTES_PER_TRACK, TRACKS_PER_SIDE};
use crate::error::{DiskErrorKind, DiskImageError};

/// `encode6to8`'s fixed 64-entry table mapping a 6-bit value to a legal
/// on-disk nibble (no two adjacent zero bits, never `0x00`/`0xFF`-adjacent
/// runs that would confuse the disk controller's self-sync logic).
const NIBBLE_TABLE: [u8; 64] = [
    0x96, 0x97, 0x9a, 0x9b, 0x9d, 0x9e, 0x9f, 0xa6, 0xa7, 0xab, 0xac, 0xad, 0xae, 0xaf, 0xb2, 0xb3,
    0xb4, 0xb5, 0xb6, 0xb7, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf, 0xcb, 0xcd, 0xce, 0xcf, 0xd3,
    0xd6, 0xd7, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde, 0xdf, 0xe5, 0xe6, 0xe7, 0xe9, 0xea, 0xeb, 0xec,
    0xed, 0xee, 0xef, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0xff,
];

const RW18_TRACK_PROLOG: [u8; 12] = [0xa5, 0x96, 0xbf, 0xff, 0xfe, 0xaa, 0xbb, 0xaa, 0xaa, 0xff, 0xef, 0x9a];
const RWTS16_CP_MAGIC: [u8; 18] = [0xe7, 0xe7, 0xe7, 0xe7, 0xe7, 0xe7, 0xaf, 0xf3, 0xfc, 0xee, 0xe7, 0xfc, 0xee, 0xe7, 0xfc, 0xee, 0xee, 0xfc];

fn encode6to8(byte: u8) -> u8 {
    NIBBLE_TABLE[(byte & 0x3F) as usize]
}

fn build_decode8to6() -> [u8; 256] {
    let mut table = [0xFFu8; 256];
    for (value, &nibble) in NIBBLE_TABLE.iter().enumerate() {
        table[nibble as usize] = value as u8;
    }
    table
}

pub struct NibbleDiskImage {
    image: Vec<u8>,
    decode8to6: [u8; 256],
}

impl NibbleDiskImage {
    pub fn new() -> Self {
        Self { image: vec![0u8; NIBBLE_IMAGE_SIZE], decode8to6: build_decode8to6() }
    }

    fn insert_rwts16(&mut self, data: &[u8], insert: &DiskImageInsert, track: u32, sector: u32, cp: bool) -> Result<(), DiskImageError> {
        let mut track = track;
        let mut sector = sector;
        let mut bytes_left = insert.length;
        let mut src = insert.source_offset as usize;
        if cp {
            self.write_rwts16_sector(track, sector, data, src, true)?;
            return Ok(());
        }
        while bytes_left > 0 {
            self.write_rwts16_sector(track, sector, data, src, false)?;
            bytes_left -= BYTES_PER_SECTOR as u32;
            src += BYTES_PER_SECTOR;
            sector += 1;
            if sector as usize >= RWTS16_SECTORS_PER_TRACK {
                sector = 0;
                track += 1;
            }
        }
        Ok(())
    }

    fn write_rwts16_sector(&mut self, track: u32, sector: u32, data: &[u8], src: usize, cp: bool) -> Result<(), DiskImageError> {
        if sector as usize >= RWTS16_SECTORS_PER_TRACK {
            return Err(DiskImageError::new(DiskErrorKind::InvalidSector, format!("{sector} specifies an invalid sector.  Must be 0 - 15.")));
        }
        if track as usize >= TRACKS_PER_SIDE {
            return Err(DiskImageError::new(DiskErrorKind::InvalidTrack, format!("Write starting at track/sector {track}/{sector} won't fit in output image file.")));
        }
        if !cp && data.len() < src + BYTES_PER_SECTOR {
            return Err(DiskImageError::new(DiskErrorKind::InvalidLength, "insertion data doesn't cover a full sector".to_string()));
        }

        let track_base = NIBBLES_PER_TRACK * track as usize;
        let sector_base = RWTS16_NIBBLES_PER_SECTOR * sector as usize;
        let image_offset = track_base + RWTS16_GAP1_SYNC_BYTES + sector_base;
        let mut w = image_offset;
        let start = w;

        let lead_in = if sector == 0 { RWTS16_GAP1_SYNC_BYTES } else { RWTS16_GAP3_SYNC_BYTES };
        w -= lead_in;
        self.write_sync_bytes(&mut w, lead_in);

        self.write_rwts16_address_field(&mut w, 0, track as u8, sector as u8);
        self.write_sync_bytes(&mut w, RWTS16_GAP2_SYNC_BYTES);

        if cp {
            self.write_rwts16_cp_data_field(&mut w);
        } else {
            self.write_rwts16_data_field(&mut w, &data[src..src + BYTES_PER_SECTOR]);
        }

        let leeway = (RWTS16_NIBBLES_PER_SECTOR - RWTS16_GAP3_SYNC_BYTES) as isize - (w - start) as isize;
        if leeway > 0 {
            self.image[w..w + leeway as usize].fill(0xFF);
        }
        Ok(())
    }

    fn write_sync_bytes(&mut self, w: &mut usize, count: usize) {
        self.image[*w..*w + count].fill(0xFF);
        *w += count;
    }

    fn write_rwts16_address_field(&mut self, w: &mut usize, volume: u8, track: u8, sector: u8) {
        self.write_bytes(w, &[0xD5, 0xAA, 0x96]);
        let mut checksum = 0u8;
        for byte in [volume, track, sector] {
            self.write_4and4(w, byte, &mut checksum);
        }
        self.write_4and4(w, checksum, &mut 0);
        self.write_bytes(w, &[0xDE, 0xAA, 0xEB]);
    }

    fn write_4and4(&mut self, w: &mut usize, byte: u8, checksum: &mut u8) {
        *checksum ^= byte;
        let odd = byte & 0xAA;
        let even = byte & 0x55;
        self.image[*w] = 0xAA | (odd >> 1);
        self.image[*w + 1] = 0xAA | even;
        *w += 2;
    }

    fn write_rwts16_data_field(&mut self, w: &mut usize, data: &[u8]) {
        self.write_bytes(w, &[0xD5, 0xAA, 0xAD]);
        self.write_6and2(w, data);
        self.write_bytes(w, &[0xDE, 0xAA, 0xEB]);
    }

    fn write_rwts16_cp_data_field(&mut self, w: &mut usize) {
        self.write_bytes(w, &[0xD5, 0xAA, 0xAD]);
        self.write_bytes(w, &RWTS16_CP_MAGIC);
        for _ in RWTS16_CP_MAGIC.len()..343 {
            self.image[*w] = 0xFF;
            *w += 1;
        }
        self.write_bytes(w, &[0xDE, 0xAA, 0xEB]);
    }

    fn write_6and2(&mut self, w: &mut usize, data: &[u8]) {
        let aux = build_aux_buffer(data);
        let mut last = 0u8;
        for i in (0..aux.len()).rev() {
            self.write_encoded(w, aux[i] ^ last);
            last = aux[i];
        }
        for &byte in data {
            let shifted = byte >> 2;
            self.write_encoded(w, shifted ^ last);
            last = shifted;
        }
        self.write_encoded(w, 0x00 ^ last);
    }

    fn write_encoded(&mut self, w: &mut usize, raw_xor_input: u8) {
        self.image[*w] = encode6to8(raw_xor_input);
        *w += 1;
    }

    fn write_bytes(&mut self, w: &mut usize, bytes: &[u8]) {
        self.image[*w..*w + bytes.len()].copy_from_slice(bytes);
        *w += bytes.len();
    }

    fn insert_rw18(&mut self, data: &[u8], insert: &DiskImageInsert, side: u16, mut track: u32, mut intra_track_offset: u32) -> Result<(), DiskImageError> {
        let mut bytes_left = insert.length;
        let mut src = insert.source_offset as usize;
        while bytes_left > 0 {
            let bytes_used = self.write_rw18_track(data, src, bytes_left, side, track, intra_track_offset)?;
            bytes_left -= bytes_used;
            src += bytes_used as usize;
            intra_track_offset = 0;
            track += 1;
        }
        Ok(())
    }

    fn write_rw18_track(&mut self, data: &[u8], src: usize, bytes_left: u32, side: u16, track: u32, intra_track_offset: u32) -> Result<u32, DiskImageError> {
        if track as usize >= TRACKS_PER_SIDE {
            return Err(DiskImageError::new(DiskErrorKind::InvalidTrack, format!("Write starting at track/sector {track}/0 won't fit in output image file.")));
        }
        if intra_track_offset as usize >= RW18_BYTES_PER_TRACK {
            return Err(DiskImageError::new(DiskErrorKind::InvalidIntraTrackOffset, format!("{intra_track_offset} specifies an invalid intra track offset.  Must be 0 - 4607.")));
        }

        let mut track_data = self.read_current_track_or_zero(side, track);
        let copy_bytes = ((RW18_BYTES_PER_TRACK as u32 - intra_track_offset).min(bytes_left)) as usize;
        let dest = intra_track_offset as usize;
        track_data[dest..dest + copy_bytes].copy_from_slice(&data[src..src + copy_bytes]);

        let dest_offset = NIBBLES_PER_TRACK * track as usize;
        let mut w = dest_offset;
        let start = w;

        self.write_sync_bytes(&mut w, 403);
        self.write_bytes(&mut w, &RW18_TRACK_PROLOG);
        self.write_rw18_sector(&mut w, &track_data, track as u8, 5, side);

        let mut sector: i32 = 5;
        while sector > 0 {
            sector -= 1;
            self.write_sync_bytes(&mut w, 5);
            self.write_rw18_sector(&mut w, &track_data, track as u8, sector as u8, side);
        }

        debug_assert_eq!(w - start, NIBBLES_PER_TRACK);
        Ok(copy_bytes as u32)
    }

    fn read_current_track_or_zero(&self, side: u16, track: u32) -> Vec<u8> {
        self.read_rw18_track(side, track).unwrap_or_else(|_| vec![0u8; RW18_BYTES_PER_TRACK])
    }

    fn write_rw18_sector(&mut self, w: &mut usize, track_data: &[u8], track: u8, sector: u8, side: u16) {
        self.write_bytes(w, &[0xD5, 0x9D]);
        self.write_bytes(w, &[encode6to8(track), encode6to8(sector), encode6to8(track ^ sector)]);
        self.image[*w] = 0xAA;
        *w += 1;
        self.write_sync_bytes(w, 2);

        self.image[*w] = side as u8;
        *w += 1;
        let mut checksum = 0u8;
        let page0 = sector as usize * PAGE_SIZE;
        let page1 = (sector as usize + 6) * PAGE_SIZE;
        let page2 = (sector as usize + 12) * PAGE_SIZE;
        for i in 0..PAGE_SIZE {
            let b0 = track_data[page0 + i];
            let b1 = track_data[page1 + i];
            let b2 = track_data[page2 + i];
            let aux = ((b0 & 0xC0) >> 2) | ((b1 & 0xC0) >> 4) | ((b2 & 0xC0) >> 6);
            let low0 = b0 & 0x3F;
            let low1 = b1 & 0x3F;
            let low2 = b2 & 0x3F;
            self.write_bytes(w, &[encode6to8(aux), encode6to8(low0), encode6to8(low1), encode6to8(low2)]);
            checksum ^= aux ^ low0 ^ low1 ^ low2;
        }
        self.image[*w] = encode6to8(checksum);
        *w += 1;
        self.image[*w] = 0xD4;
        *w += 1;
    }

    /// Reads back a previously written RW18 track, validating every
    /// byte against the layout `write_rw18_track` produced. Any mismatch
    /// anywhere is `badTrack` (§4.11 "Read-back path").
    pub fn read_rw18_track(&self, side: u16, track: u32) -> Result<Vec<u8>, DiskImageError> {
        if track as usize >= TRACKS_PER_SIDE {
            return Err(DiskImageError::new(DiskErrorKind::InvalidTrack, format!("{track} is an invalid track for read-back.")));
        }
        let mut r = NIBBLES_PER_TRACK * track as usize;
        let mut track_data = vec![0u8; RW18_BYTES_PER_TRACK];

        self.validate_sync(&mut r, 403)?;
        self.validate_bytes(&mut r, &RW18_TRACK_PROLOG)?;
        self.extract_rw18_sector(&mut r, &mut track_data, track as u8, 5, side)?;

        let mut sector: i32 = 5;
        while sector > 0 {
            sector -= 1;
            self.validate_sync(&mut r, 5)?;
            self.extract_rw18_sector(&mut r, &mut track_data, track as u8, sector as u8, side)?;
        }
        Ok(track_data)
    }

    fn validate_byte(&self, r: &mut usize, expected: u8) -> Result<(), DiskImageError> {
        let actual = self.image[*r];
        *r += 1;
        if actual != expected {
            return Err(bad_track());
        }
        Ok(())
    }

    fn validate_sync(&self, r: &mut usize, count: usize) -> Result<(), DiskImageError> {
        for _ in 0..count {
            self.validate_byte(r, 0xFF)?;
        }
        Ok(())
    }

    fn validate_bytes(&self, r: &mut usize, expected: &[u8]) -> Result<(), DiskImageError> {
        if &self.image[*r..*r + expected.len()] != expected {
            return Err(bad_track());
        }
        *r += expected.len();
        Ok(())
    }

    fn validate_decoded_byte(&self, r: &mut usize, expected: u8) -> Result<(), DiskImageError> {
        let decoded = self.decode8to6[self.image[*r] as usize];
        *r += 1;
        if decoded != expected {
            return Err(bad_track());
        }
        Ok(())
    }

    fn extract_rw18_sector(&self, r: &mut usize, track_data: &mut [u8], track: u8, sector: u8, side: u16) -> Result<(), DiskImageError> {
        self.validate_bytes(r, &[0xD5, 0x9D])?;
        self.validate_decoded_byte(r, track)?;
        self.validate_decoded_byte(r, sector)?;
        self.validate_decoded_byte(r, track ^ sector)?;
        self.validate_bytes(r, &[0xAA])?;
        self.validate_sync(r, 2)?;
        self.validate_byte(r, side as u8)?;

        let page0 = sector as usize * PAGE_SIZE;
        let page1 = (sector as usize + 6) * PAGE_SIZE;
        let page2 = (sector as usize + 12) * PAGE_SIZE;
        let mut checksum = 0u8;
        for i in 0..PAGE_SIZE {
            let mut aux = self.decode8to6[self.image[*r] as usize];
            let byte0 = self.decode8to6[self.image[*r + 1] as usize];
            let byte1 = self.decode8to6[self.image[*r + 2] as usize];
            let byte2 = self.decode8to6[self.image[*r + 3] as usize];
            *r += 4;

            checksum ^= aux ^ byte0 ^ byte1 ^ byte2;

            aux <<= 2;
            track_data[page0 + i] = (aux & 0xC0) | byte0;
            aux <<= 2;
            track_data[page1 + i] = (aux & 0xC0) | byte1;
            aux <<= 2;
            track_data[page2 + i] = (aux & 0xC0) | byte2;
        }
        self.validate_decoded_byte(r, checksum)?;
        self.validate_byte(r, 0xD4)?;
        self.validate_sync(r, 1)?;
        Ok(())
    }
}

fn bad_track() -> DiskImageError {
    DiskImageError::new(DiskErrorKind::BadTrack, "bad track during RW18 read-back".to_string())
}

/// The 86-byte aux buffer (§4.10 step 7): for each `i`, gathers the low
/// two bits of three source bytes spaced 0x55, 0xAB and 0x101 positions
/// behind `i`, swapping bit order within each pair.
fn build_aux_buffer(data: &[u8]) -> [u8; 86] {
    let mut aux = [0u8; 86];
    for (i, slot) in aux.iter_mut().enumerate() {
        let low_byte = data[0x55 - i];
        let mid_byte = data[0xAB - i];
        let high_byte = data[0x101 - i];
        let low_bits = ((low_byte & 1) << 1) | ((low_byte & 2) >> 1);
        let mid_bits = ((mid_byte & 1) << 3) | ((mid_byte & 2) << 1);
        let high_bits = ((high_byte & 1) << 5) | ((high_byte & 2) << 3);
        *slot = high_bits | mid_bits | low_bits;
    }
    aux
}

impl Default for NibbleDiskImage {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskImage for NibbleDiskImage {
    fn insert_data(&mut self, data: &[u8], insert: &DiskImageInsert) -> Result<(), DiskImageError> {
        match insert.kind {
            InsertionKind::Rwts16 { track, sector } => self.insert_rwts16(data, insert, track, sector, false),
            InsertionKind::Rwts16Cp { track, sector } => self.insert_rwts16(data, insert, track, sector, true),
            InsertionKind::Rw18 { side, track, intra_track_offset } => self.insert_rw18(data, insert, side, track, intra_track_offset),
            InsertionKind::Block { .. } => Err(DiskImageError::new(DiskErrorKind::InvalidInsertionType, "BLOCK insertion type isn't supported for this output image type.".to_string())),
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
    fn decode_table_inverts_encode_table_for_all_64_values() {
        let decode = build_decode8to6();
        for value in 0u8..64 {
            assert_eq!(decode[encode6to8(value) as usize], value);
        }
    }

    #[test]
    fn rwts16_sector_zero_has_the_documented_address_field_layout() {
        let mut img = NibbleDiskImage::new();
        let data = vec![0u8; BYTES_PER_SECTOR];
        let insert = DiskImageInsert { kind: InsertionKind::Rwts16 { track: 3, sector: 0 }, source_offset: 0, length: BYTES_PER_SECTOR as u32 };
        img.insert_data(&data, &insert).unwrap();

        let base = NIBBLES_PER_TRACK * 3 + RWTS16_GAP1_SYNC_BYTES;
        assert_eq!(&img.image()[base..base + 3], &[0xD5, 0xAA, 0x96]);
        let track = 3u8;
        let sector = 0u8;
        let checksum = track ^ sector;
        let expected_4and4 = |byte: u8| {
            let odd = byte & 0xAA;
            let even = byte & 0x55;
            [0xAA | (odd >> 1), 0xAA | even]
        };
        let mut expected = vec![0xD5, 0xAA, 0x96];
        expected.extend(expected_4and4(0));
        expected.extend(expected_4and4(track));
        expected.extend(expected_4and4(sector));
        expected.extend(expected_4and4(checksum));
        expected.extend([0xDE, 0xAA, 0xEB]);
        assert_eq!(&img.image()[base..base + expected.len()], expected.as_slice());
    }

    #[test]
    fn rw18_round_trip_preserves_written_bytes_scenario_from_spec() {
        let mut img = NibbleDiskImage::new();
        let payload = vec![0xFFu8; 2 * PAGE_SIZE];
        let insert = DiskImageInsert {
            kind: InsertionKind::Rw18 { side: 0xA9, track: 0, intra_track_offset: 0x1100 },
            source_offset: 0,
            length: payload.len() as u32,
        };
        img.insert_data(&payload, &insert).unwrap();

        let track_data = img.read_rw18_track(0xA9, 0).unwrap();
        assert_eq!(track_data.len(), RW18_BYTES_PER_TRACK);
        assert!(track_data[0x1100..0x1200].iter().all(|&b| b == 0xFF));
        assert!(track_data[..0x1100].iter().all(|&b| b == 0x00));
        assert!(track_data[0x1200..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn rwts16cp_sector_carries_the_fixed_magic_nibble_sequence() {
        let mut img = NibbleDiskImage::new();
        let insert = DiskImageInsert { kind: InsertionKind::Rwts16Cp { track: 1, sector: 0 }, source_offset: 0, length: 0 };
        img.insert_data(&[], &insert).unwrap();

        let base = NIBBLES_PER_TRACK * 1 + RWTS16_GAP1_SYNC_BYTES;
        let data_field = base + 3 /* address prolog */ + 8 /* 4and4 */ + 3 /* address epilog */ + RWTS16_GAP2_SYNC_BYTES + 3;
        assert_eq!(img.image()[data_field], RWTS16_CP_MAGIC[0]);
    }
}
