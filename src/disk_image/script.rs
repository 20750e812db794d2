//! CSV script engine (§4.12 / component 12): drives `BLOCK`/`RWTS16`/
//! `RWTS16CP`/`RW18` rows into whichever [`DiskImage`] it's handed.
//!
//! Grounded on `DiskImage.c`'s `DiskImageScriptEngine_*` family. Unlike
//! the assembler, this engine never accumulates a `Vec` of diagnostics:
//! each row's error is logged (`tracing::error!`, mirroring the
//! original's `LOG_ERROR` macro writing to stderr) and the engine moves
//! on to the next line. The caller only learns whether *any* row failed
//! via [`ScriptEngine::had_errors`].

use std::path::Path;

use crate::disk_image::{DiskImage, DiskImageInsert, InsertionKind, ObjectFile, BLOCK_SIZE, RW18_BYTES_PER_TRACK};
use crate::error::{DiskErrorKind, DiskImageError};
use crate::sized_string::{eq_ignore_ascii_case, strtoul};

const IMAGE_TABLE_DEFAULT_ADDRESS: u16 = 0x6000;

/// Per-row state the engine carries forward (§4.12.2): `BLOCK`'s `*`
/// placeholder defaults from the *previous row's* end position, while
/// `RW18`'s `*` placeholders default from whatever the current
/// side/track/offset happens to be — seeded by an RW18-`SAV` object
/// header if the just-loaded object file carried one.
pub struct ScriptEngine {
    object: Option<ObjectFile>,
    last_block: u32,
    last_length: u32,
    current_side: u16,
    current_track: u32,
    current_offset: u32,
    line_number: u32,
    script_filename: String,
    had_errors: bool,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self {
            object: Some(ObjectFile { bytes: Vec::new(), length: 0, rw18_defaults: None }),
            last_block: 0,
            last_length: 0,
            current_side: 0,
            current_track: 0,
            current_offset: 0,
            line_number: 0,
            script_filename: String::new(),
            had_errors: false,
        }
    }

    pub fn had_errors(&self) -> bool {
        self.had_errors
    }

    /// Runs every non-comment, non-blank line of `script_text` against
    /// `image`, logging and continuing past any row that errors.
    pub fn process_script(&mut self, image: &mut dyn DiskImage, script_filename: &str, script_text: &str) {
        self.script_filename = script_filename.to_string();
        self.line_number = 1;
        for line in script_text.lines() {
            if !line.is_empty() && !line.starts_with('#') {
                self.process_line(image, line);
            }
            self.line_number += 1;
        }
    }

    fn process_line(&mut self, image: &mut dyn DiskImage, line: &str) {
        let fields = parse_csv_line(line);
        if fields.is_empty() || fields[0].is_empty() {
            self.log_error("Script line cannot be blank.");
            return;
        }

        let kind = fields[0].as_str();
        let result = if eq_ignore_ascii_case(kind, "block") {
            self.process_block_line(image, &fields)
        } else if eq_ignore_ascii_case(kind, "rwts16") {
            self.process_rwts16_line(image, &fields)
        } else if eq_ignore_ascii_case(kind, "rwts16cp") {
            self.process_rwts16cp_line(image, &fields)
        } else if eq_ignore_ascii_case(kind, "rw18") {
            self.process_rw18_line(image, &fields)
        } else {
            self.log_error(&format!("{} isn't a recognized image insertion type of BLOCK or RWTS16.", fields[0]));
            return;
        };

        if let Err(e) = result {
            self.report_exception(&fields, &e);
        }
    }

    fn process_block_line(&mut self, image: &mut dyn DiskImage, fields: &[String]) -> Result<(), DiskImageError> {
        if fields.len() < 5 || fields.len() > 6 {
            self.log_error("Line doesn't contain correct fields: BLOCK,objectFilename,objectStartOffset,insertionLength,block[,intraBlockOffset]");
            return Ok(());
        }

        self.read_object_file(&fields[1])?;
        let source_offset = parse_u32(&fields[2]);
        let length = self.parse_length_field(&fields[3]);

        let (block, intra_block_offset) = if is_asterisk(&fields[4]) {
            let last_offset = self.last_block * BLOCK_SIZE as u32 + self.last_length;
            (last_offset / BLOCK_SIZE as u32, last_offset % BLOCK_SIZE as u32)
        } else {
            let block = parse_u32(&fields[4]);
            let intra_block_offset = if fields.len() > 5 { parse_u32(&fields[5]) } else { 0 };
            (block, intra_block_offset)
        };

        let insert = DiskImageInsert { kind: InsertionKind::Block { block, intra_block_offset }, source_offset, length };
        self.last_block = block;
        self.last_length = length;
        self.insert_object_file(image, &insert)
    }

    fn process_rwts16_line(&mut self, image: &mut dyn DiskImage, fields: &[String]) -> Result<(), DiskImageError> {
        if fields.len() != 6 {
            self.log_error("Line doesn't contain correct fields: RWTS16,objectFilename,objectStartOffset,insertionLength,track,sector");
            return Ok(());
        }

        self.read_object_file(&fields[1])?;
        let source_offset = parse_u32(&fields[2]);
        let length = self.parse_length_field(&fields[3]);
        let track = parse_u32(&fields[4]);
        let sector = parse_u32(&fields[5]);

        let insert = DiskImageInsert { kind: InsertionKind::Rwts16 { track, sector }, source_offset, length };
        self.insert_object_file(image, &insert)
    }

    fn process_rwts16cp_line(&mut self, image: &mut dyn DiskImage, fields: &[String]) -> Result<(), DiskImageError> {
        if fields.len() != 3 {
            self.log_error("Line doesn't contain correct fields: RWTS16CP,track,sector");
            return Ok(());
        }

        self.object = self.object.take().map(|mut o| {
            o.length = 0;
            o
        });
        let track = parse_u32(&fields[1]);
        let sector = parse_u32(&fields[2]);

        let insert = DiskImageInsert { kind: InsertionKind::Rwts16Cp { track, sector }, source_offset: 0, length: 0 };
        self.insert_object_file(image, &insert)
    }

    fn process_rw18_line(&mut self, image: &mut dyn DiskImage, fields: &[String]) -> Result<(), DiskImageError> {
        if fields.len() < 7 || fields.len() > 8 {
            self.log_error(
                "Line doesn't contain correct fields: RW18,objectFilename,objectStartOffset,insertionLength,side,track,offset[,imageTableAddress]",
            );
            return Ok(());
        }

        self.read_object_file(&fields[1])?;
        let source_offset = parse_u32(&fields[2]);
        let mut length = self.parse_length_field(&fields[3]);
        let side = self.parse_field_with_asterisk_default(&fields[4], self.current_side as u32);
        let track = self.parse_field_with_asterisk_default(&fields[5], self.current_track);
        let intra_track_offset = self.parse_field_with_asterisk_default(&fields[6], self.current_offset);

        self.current_side = side as u16;
        self.current_track = track;
        self.current_offset = intra_track_offset;

        if fields.len() == 8 {
            let new_image_table_address = parse_u32(&fields[7]) as u16;
            length = self.process_image_table_update(new_image_table_address, length)?;
        }

        let insert = DiskImageInsert {
            kind: InsertionKind::Rw18 { side: side as u16, track, intra_track_offset },
            source_offset,
            length,
        };
        self.insert_object_file(image, &insert)
    }

    fn process_image_table_update(&mut self, new_image_table_address: u16, length: u32) -> Result<u32, DiskImageError> {
        self.update_image_table_addresses(new_image_table_address)?;
        let image_table_size = self.image_table_object_size(new_image_table_address)?;
        Ok(length.min(image_table_size as u32))
    }

    fn update_image_table_addresses(&mut self, new_image_table_address: u16) -> Result<(), DiskImageError> {
        let object = self.object.as_mut().ok_or_else(|| DiskImageError::new(DiskErrorKind::FileGeneric, "no object file loaded".to_string()))?;
        if object.length < 3 {
            return Err(DiskImageError::new(DiskErrorKind::FileGeneric, "object file is too short to contain an image table header".to_string()));
        }
        let image_count = object.bytes[0];
        let actual_start = u16::from_le_bytes([object.bytes[1], object.bytes[2]]);
        let expected_start = IMAGE_TABLE_DEFAULT_ADDRESS.wrapping_add(1).wrapping_add((image_count as u16 + 1) * 2);
        if actual_start != expected_start {
            return Err(DiskImageError::new(DiskErrorKind::FileGeneric, "object file doesn't have a valid image table header".to_string()));
        }

        let mut bytes_left = object.length;
        let mut pos = 1usize;
        bytes_left -= 1;
        for _ in 0..=image_count {
            if bytes_left < 2 {
                return Err(DiskImageError::new(DiskErrorKind::FileGeneric, "object file's image table is truncated".to_string()));
            }
            let current = u16::from_le_bytes([object.bytes[pos], object.bytes[pos + 1]]);
            let updated = current.wrapping_sub(IMAGE_TABLE_DEFAULT_ADDRESS).wrapping_add(new_image_table_address);
            object.bytes[pos] = (updated & 0xFF) as u8;
            object.bytes[pos + 1] = (updated >> 8) as u8;
            pos += 2;
            bytes_left -= 2;
        }
        Ok(())
    }

    fn image_table_object_size(&self, start_image_table_address: u16) -> Result<u16, DiskImageError> {
        let object = self.object.as_ref().ok_or_else(|| DiskImageError::new(DiskErrorKind::FileGeneric, "no object file loaded".to_string()))?;
        let image_count = object.bytes[0] as usize;
        let last_entry = 1 + image_count * 2;
        let last_image_table_address = u16::from_le_bytes([object.bytes[last_entry], object.bytes[last_entry + 1]]);
        Ok(last_image_table_address.wrapping_sub(start_image_table_address))
    }

    fn read_object_file(&mut self, filename: &str) -> Result<(), DiskImageError> {
        let path = Path::new(filename);
        let object = ObjectFile::read(path)?;
        if let Some(defaults) = object.rw18_defaults {
            self.current_side = defaults.side;
            self.current_track = defaults.track as u32;
            self.current_offset = defaults.offset_in_track as u32;
        }
        self.object = Some(object);
        Ok(())
    }

    fn parse_length_field(&self, field: &str) -> u32 {
        let default_value = self.object.as_ref().map(|o| o.length).unwrap_or(0);
        self.parse_field_with_asterisk_default(field, default_value)
    }

    fn parse_field_with_asterisk_default(&self, field: &str, default_value: u32) -> u32 {
        if is_asterisk(field) {
            default_value
        } else {
            parse_u32(field)
        }
    }

    fn insert_object_file(&self, image: &mut dyn DiskImage, insert: &DiskImageInsert) -> Result<(), DiskImageError> {
        let object = self.object.as_ref().ok_or_else(|| DiskImageError::new(DiskErrorKind::FileGeneric, "no object file loaded".to_string()))?;
        self.validate_source_object_parameters(object, insert)?;
        image.insert_data(&object.bytes, insert)
    }

    fn validate_source_object_parameters(&self, object: &ObjectFile, insert: &DiskImageInsert) -> Result<(), DiskImageError> {
        if matches!(insert.kind, InsertionKind::Rwts16Cp { .. }) {
            return Ok(());
        }
        if insert.source_offset >= object.length {
            return Err(DiskImageError::new(
                DiskErrorKind::InvalidSourceOffset,
                format!("{} specifies an invalid source data offset.  Should be less than {}.", insert.source_offset, object.length),
            ));
        }
        if insert.source_offset + insert.length > object.bytes.len() as u32 {
            return Err(DiskImageError::new(DiskErrorKind::InvalidLength, format!("{} specifies an invalid length.", insert.length)));
        }
        Ok(())
    }

    fn log_error(&mut self, message: &str) {
        self.had_errors = true;
        tracing::error!("{}:{}: error: {}", self.script_filename, self.line_number, message);
    }

    fn report_exception(&mut self, fields: &[String], error: &DiskImageError) {
        let message = match error.kind {
            DiskErrorKind::FileOpen => format!("Failed to open '{}' object file.", fields.get(1).map(String::as_str).unwrap_or("")),
            DiskErrorKind::FileGeneric => format!("Failed to process '{}' object file.", fields.get(1).map(String::as_str).unwrap_or("")),
            DiskErrorKind::InvalidInsertionType => format!("{} insertion type isn't supported for this output image type.", fields[0]),
            _ => error.message.clone(),
        };
        self.log_error(&message);
    }
}

fn is_asterisk(field: &str) -> bool {
    field == "*"
}

fn parse_u32(field: &str) -> u32 {
    strtoul(field, 0).value
}

/// Splits one script line on commas. `DiskImage.c`'s `ParseCSV` doesn't
/// support quoting or escapes for this file format, so a plain split is
/// faithful; fields are trimmed of surrounding whitespace the way the
/// original's tokenizer skips spaces around commas.
fn parse_csv_line(line: &str) -> Vec<String> {
    line.split(',').map(|field| field.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_image::block::BlockDiskImage;

    #[test]
    fn blank_first_field_is_an_error_not_a_silent_skip() {
        let mut engine = ScriptEngine::new();
        let mut image = BlockDiskImage::new();
        engine.process_script(&mut image, "test.csv", ",1,2,3,4");
        assert!(engine.had_errors());
    }

    #[test]
    fn comment_lines_are_skipped_without_error() {
        let mut engine = ScriptEngine::new();
        let mut image = BlockDiskImage::new();
        engine.process_script(&mut image, "test.csv", "# just a comment\n");
        assert!(!engine.had_errors());
    }

    #[test]
    fn unrecognized_kind_logs_and_continues() {
        let mut engine = ScriptEngine::new();
        let mut image = BlockDiskImage::new();
        engine.process_script(&mut image, "test.csv", "BOGUS,1,2,3\nBOGUS,1,2,3\n");
        assert!(engine.had_errors());
    }

    #[test]
    fn asterisk_length_defaults_to_rw18_bytes_per_track_constant_sanity() {
        assert_eq!(RW18_BYTES_PER_TRACK, 4608);
    }
}
