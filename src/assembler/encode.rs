//! Addressing-mode-to-bytes encoding (§4.8 step 6, §4.7.1). Given an
//! already-classified [`AddressingMode`] and the [`OpcodeRow`] for the
//! mnemonic, chooses the narrowest applicable opcode column and
//! produces the machine code bytes.

use crate::addressing_mode::{AddressingMode, Mode};
use crate::error::{AsmError, ErrorKind, Span};
use crate::expression::ExprType;
use crate::opcode_table::{OpcodeRow, UNSUPPORTED, USE_LONG};

/// Encoded instruction bytes, plus (for relative branches only) whether
/// the offset was out of range — callers still emit the two bytes in
/// that case and separately record a diagnostic (§4.8 step 6).
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub offset_out_of_range: bool,
}

fn ok(bytes: Vec<u8>) -> Result<Encoded, AsmError> {
    Ok(Encoded { bytes, offset_out_of_range: false })
}

/// `row.absolute` reinterpreted as a 24-bit long address form — the
/// fallback taken whenever a column holds [`USE_LONG`] (§4.7.1).
fn long_form(row: &OpcodeRow, value: u32, span: Span) -> Result<Encoded, AsmError> {
    if row.absolute == UNSUPPORTED {
        return Err(AsmError::new(ErrorKind::InvalidArgument, "no long addressing form for this mnemonic", span));
    }
    let bank = 0u8; // evaluator values are 16-bit; bank is always 0 here.
    ok(vec![row.absolute, (value & 0xFF) as u8, ((value >> 8) & 0xFF) as u8, bank])
}

pub fn encode(
    row: &OpcodeRow,
    am: &AddressingMode,
    pc: u32,
    long_a: bool,
    long_xy: bool,
    span: Span,
) -> Result<Encoded, AsmError> {
    let expr = am.expression;
    match am.mode {
        Mode::Implied => {
            if row.implied == UNSUPPORTED {
                return Err(AsmError::new(ErrorKind::InvalidArgument, "mnemonic takes no implied form", span));
            }
            ok(vec![row.implied])
        }
        Mode::Immediate => {
            if row.immediate == UNSUPPORTED {
                return Err(AsmError::new(ErrorKind::InvalidArgument, "mnemonic has no immediate form", span));
            }
            let wide = (row.long_immediate_if_long_a && long_a) || (row.long_immediate_if_long_xy && long_xy);
            if wide {
                ok(vec![row.immediate, (expr.value & 0xFF) as u8, ((expr.value >> 8) & 0xFF) as u8])
            } else {
                ok(vec![row.immediate, (expr.value & 0xFF) as u8])
            }
        }
        Mode::IndexedIndirect => {
            if row.zp_indexed_indirect == USE_LONG {
                return long_form(row, expr.value, span);
            }
            if row.zp_indexed_indirect == UNSUPPORTED {
                return Err(AsmError::new(ErrorKind::InvalidArgument, "mnemonic has no (zp,X) form", span));
            }
            ok(vec![row.zp_indexed_indirect, (expr.value & 0xFF) as u8])
        }
        Mode::IndirectIndexed => {
            if row.indirect_indexed == USE_LONG {
                return long_form(row, expr.value, span);
            }
            if row.indirect_indexed == UNSUPPORTED {
                return Err(AsmError::new(ErrorKind::InvalidArgument, "mnemonic has no (zp),Y form", span));
            }
            ok(vec![row.indirect_indexed, (expr.value & 0xFF) as u8])
        }
        Mode::Indirect => {
            if expr.ty == ExprType::ZeroPage && row.zp_indirect != UNSUPPORTED {
                if row.zp_indirect == USE_LONG {
                    return long_form(row, expr.value, span);
                }
                return ok(vec![row.zp_indirect, (expr.value & 0xFF) as u8]);
            }
            if row.abs_indirect == UNSUPPORTED {
                return Err(AsmError::new(ErrorKind::InvalidArgument, "mnemonic has no (abs) form", span));
            }
            ok(vec![row.abs_indirect, (expr.value & 0xFF) as u8, ((expr.value >> 8) & 0xFF) as u8])
        }
        Mode::AbsoluteIndexedX => encode_indexed(row.zp_indexed_x, row.abs_indexed_x, row, expr.ty, expr.value, span),
        Mode::AbsoluteIndexedY => encode_indexed(row.zp_indexed_y, row.abs_indexed_y, row, expr.ty, expr.value, span),
        Mode::Absolute => {
            if row.relative != UNSUPPORTED {
                let target = expr.value as i64;
                let offset = target - (pc as i64 + 2);
                let out_of_range = !expr.forward_reference && !(-128..=127).contains(&offset);
                return Ok(Encoded { bytes: vec![row.relative, (offset as i8) as u8], offset_out_of_range: out_of_range });
            }
            if expr.ty == ExprType::ZeroPage && row.zero_page != UNSUPPORTED {
                if row.zero_page == USE_LONG {
                    return long_form(row, expr.value, span);
                }
                return ok(vec![row.zero_page, (expr.value & 0xFF) as u8]);
            }
            if row.absolute == UNSUPPORTED {
                return Err(AsmError::new(ErrorKind::InvalidArgument, "operand doesn't fit any addressing mode for this mnemonic", span));
            }
            ok(vec![row.absolute, (expr.value & 0xFF) as u8, ((expr.value >> 8) & 0xFF) as u8])
        }
    }
}

fn encode_indexed(
    zp_col: u8,
    abs_col: u8,
    row: &OpcodeRow,
    ty: ExprType,
    value: u32,
    span: Span,
) -> Result<Encoded, AsmError> {
    if ty == ExprType::ZeroPage && zp_col != UNSUPPORTED {
        if zp_col == USE_LONG {
            return long_form(row, value, span);
        }
        return ok(vec![zp_col, (value & 0xFF) as u8]);
    }
    if abs_col == USE_LONG {
        return long_form(row, value, span);
    }
    if abs_col == UNSUPPORTED {
        return Err(AsmError::new(ErrorKind::InvalidArgument, "mnemonic has no indexed form for this operand", span));
    }
    ok(vec![abs_col, (value & 0xFF) as u8, ((value >> 8) & 0xFF) as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing_mode::classify;
    use crate::expression::NoLabels;
    use crate::opcode_table::{lookup, InstructionSet};

    fn span() -> Span {
        Span::whole_line(1)
    }

    #[test]
    fn lda_immediate_short() {
        let row = lookup(InstructionSet::Mos6502, "LDA").unwrap();
        let am = classify("#$60", 0x8000, &mut NoLabels, span()).unwrap();
        let enc = encode(row, &am, 0x8000, false, false, span()).unwrap();
        assert_eq!(enc.bytes, vec![0xA9, 0x60]);
    }

    #[test]
    fn sta_absolute() {
        let row = lookup(InstructionSet::Mos6502, "STA").unwrap();
        let am = classify("$4fb", 0x8000, &mut NoLabels, span()).unwrap();
        let enc = encode(row, &am, 0x8000, false, false, span()).unwrap();
        assert_eq!(enc.bytes, vec![0x8D, 0xFB, 0x04]);
    }

    #[test]
    fn sta_zero_page_folds() {
        let row = lookup(InstructionSet::Mos6502, "STA").unwrap();
        let am = classify("$fb", 0x8000, &mut NoLabels, span()).unwrap();
        let enc = encode(row, &am, 0x8000, false, false, span()).unwrap();
        assert_eq!(enc.bytes, vec![0x85, 0xFB]);
    }

    #[test]
    fn branch_in_range() {
        let row = lookup(InstructionSet::Mos6502, "BEQ").unwrap();
        let am = classify("$8010", 0x8000, &mut NoLabels, span()).unwrap();
        let enc = encode(row, &am, 0x8000, false, false, span()).unwrap();
        assert_eq!(enc.bytes, vec![0xF0, 0x0E]);
        assert!(!enc.offset_out_of_range);
    }

    #[test]
    fn branch_out_of_range_still_emits() {
        let row = lookup(InstructionSet::Mos6502, "BEQ").unwrap();
        let am = classify("$9000", 0x8000, &mut NoLabels, span()).unwrap();
        let enc = encode(row, &am, 0x8000, false, false, span()).unwrap();
        assert_eq!(enc.bytes.len(), 2);
        assert!(enc.offset_out_of_range);
    }
}
