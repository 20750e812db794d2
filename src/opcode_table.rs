//! Opcode tables (§4.7, §4.7.1): the merged 6502 → 65C02 → 65816
//! mnemonic tables, reproduced verbatim (mnemonic plus per-addressing-
//! mode opcode byte) from the original source's `g_6502InstructionSet` /
//! `g_65c02AdditionalInstructions` / `g_65816AdditionalInstructions`.
//!
//! §5 calls for the tables to be built once per process rather than
//! once per `Assembler` instance; `std::sync::OnceLock` (stable since
//! 1.70, this crate's MSRV) gives that without introducing a new
//! dependency.
//!
//! §4.4.1 set the precedent for diverging from the original's literal
//! container choice where the original's design doesn't fit Rust's
//! idioms; the same reasoning applies here. The original merges tables
//! by a linear update-or-append scan and keeps the *array* sorted by
//! mnemonic so lookup can binary-search it. A `HashMap<&'static str,
//! OpcodeRow>` gets the same "last definition for a field wins, missing
//! mnemonics append" merge semantics (§9 "Opcode table linear merge")
//! without needing the sort at all — lookup is by exact (case-folded)
//! mnemonic, never by position.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Sentinel for "this addressing mode is not supported for this
/// mnemonic" (`_xXX` in the original — the MVP opcode, chosen because
/// MVP needs special handling regardless).
pub const UNSUPPORTED: u8 = 0x44;

/// Sentinel meaning "use the corresponding 65816 long (24-bit)
/// addressing mode instead of this column's opcode" (`_xLL` — the MVN
/// opcode).
pub const USE_LONG: u8 = 0x54;

/// A directive's effect is dispatched by the assembler orchestration
/// (§4.8); this enum only names *which* handler a mnemonic maps to. It
/// stands in for the original's `void (*directiveHandler)(Assembler*)`
/// function pointer, which has no idiomatic equivalent as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    LupEnd, // --^
    MacEnd, // <<<
    Equ,    // EQU, =
    Asc,
    Da, // DA, DW
    Db, // DB, DFB
    Dend,
    Do,
    Ds,
    Dum,
    Else,
    Fin,
    Hex,
    Lup,
    Mac,
    Org,
    Put,
    Rev,
    Sav,
    Usr,
    Xc,
    Mx,
    Rep,
    Sep,
    Xce,
    Mvn,
    Mvp,
    /// `LST`/`LSTDO`/`TR`, and `MX` before the 65816 delta overrides it:
    /// vestigial listing-control directives with no effect on emitted
    /// bytes (`ignoreOperator`).
    Ignore,
}

#[derive(Debug, Clone, Copy)]
pub struct OpcodeRow {
    pub directive: Option<Directive>,
    pub immediate: u8,
    pub absolute: u8,
    pub zero_page: u8,
    pub implied: u8,
    pub zp_indexed_indirect: u8, // (zp,X)
    pub indirect_indexed: u8,    // (zp),Y
    pub zp_indexed_x: u8,
    pub zp_indexed_y: u8,
    pub abs_indexed_x: u8,
    pub abs_indexed_y: u8,
    pub relative: u8,
    pub abs_indirect: u8,       // (abs)
    pub abs_indexed_indirect: u8, // (abs,X) — 65c02/65816 JMP
    pub zp_indirect: u8,        // (zp) — 65c02
    pub long_immediate_if_long_a: bool,
    pub long_immediate_if_long_xy: bool,
}

const fn op(
    immediate: u8,
    absolute: u8,
    zero_page: u8,
    implied: u8,
    zp_indexed_indirect: u8,
    indirect_indexed: u8,
    zp_indexed_x: u8,
    zp_indexed_y: u8,
    abs_indexed_x: u8,
    abs_indexed_y: u8,
    relative: u8,
    abs_indirect: u8,
    abs_indexed_indirect: u8,
    zp_indirect: u8,
) -> OpcodeRow {
    OpcodeRow {
        directive: None,
        immediate,
        absolute,
        zero_page,
        implied,
        zp_indexed_indirect,
        indirect_indexed,
        zp_indexed_x,
        zp_indexed_y,
        abs_indexed_x,
        abs_indexed_y,
        relative,
        abs_indirect,
        abs_indexed_indirect,
        zp_indirect,
        long_immediate_if_long_a: false,
        long_immediate_if_long_xy: false,
    }
}

const fn directive(d: Directive) -> OpcodeRow {
    OpcodeRow {
        directive: Some(d),
        immediate: UNSUPPORTED,
        absolute: UNSUPPORTED,
        zero_page: UNSUPPORTED,
        implied: UNSUPPORTED,
        zp_indexed_indirect: UNSUPPORTED,
        indirect_indexed: UNSUPPORTED,
        zp_indexed_x: UNSUPPORTED,
        zp_indexed_y: UNSUPPORTED,
        abs_indexed_x: UNSUPPORTED,
        abs_indexed_y: UNSUPPORTED,
        relative: UNSUPPORTED,
        abs_indirect: UNSUPPORTED,
        abs_indexed_indirect: UNSUPPORTED,
        zp_indirect: UNSUPPORTED,
        long_immediate_if_long_a: false,
        long_immediate_if_long_xy: false,
    }
}

const X: u8 = UNSUPPORTED;
const L: u8 = USE_LONG;

fn base_6502() -> Vec<(&'static str, OpcodeRow)> {
    use Directive::*;
    vec![
        ("--^", directive(LupEnd)),
        ("<<<", directive(MacEnd)),
        ("=", directive(Equ)),
        ("ASC", directive(Asc)),
        ("DA", directive(Da)),
        ("DB", directive(Db)),
        ("DEND", directive(Dend)),
        ("DFB", directive(Db)),
        ("DO", directive(Do)),
        ("DS", directive(Ds)),
        ("DW", directive(Da)),
        ("DUM", directive(Dum)),
        ("ELSE", directive(Else)),
        ("EQU", directive(Equ)),
        ("FIN", directive(Fin)),
        ("LST", directive(Ignore)),
        ("LSTDO", directive(Ignore)),
        ("MX", directive(Ignore)),
        ("HEX", directive(Hex)),
        ("LUP", directive(Lup)),
        ("MAC", directive(Mac)),
        ("ORG", directive(Org)),
        ("PUT", directive(Put)),
        ("REV", directive(Rev)),
        ("SAV", directive(Sav)),
        ("TR", directive(Ignore)),
        ("USR", directive(Usr)),
        ("XC", directive(Xc)),
        //            imm   abs   zp    imp   (zp,X) (zp),Y zp,X  zp,Y  abs,X abs,Y rel   (abs) (abs,X) (zp)
        ("ADC", op(0x69, 0x6D, 0x65, X, 0x61, 0x71, 0x75, X, 0x7D, 0x79, X, X, X, X)),
        ("AND", op(0x29, 0x2D, 0x25, X, 0x21, 0x31, 0x35, X, 0x3D, 0x39, X, X, X, X)),
        ("ASL", op(X, 0x0E, 0x06, 0x0A, X, X, 0x16, X, 0x1E, X, X, X, X, X)),
        ("BCC", op(X, X, X, X, X, X, X, X, X, X, 0x90, X, X, X)),
        ("BCS", op(X, X, X, X, X, X, X, X, X, X, 0xB0, X, X, X)),
        ("BEQ", op(X, X, X, X, X, X, X, X, X, X, 0xF0, X, X, X)),
        ("BGE", op(X, X, X, X, X, X, X, X, X, X, 0xB0, X, X, X)),
        ("BIT", op(X, 0x2C, 0x24, X, X, X, X, X, X, X, X, X, X, X)),
        ("BLT", op(X, X, X, X, X, X, X, X, X, X, 0x90, X, X, X)),
        ("BMI", op(X, X, X, X, X, X, X, X, X, X, 0x30, X, X, X)),
        ("BNE", op(X, X, X, X, X, X, X, X, X, X, 0xD0, X, X, X)),
        ("BPL", op(X, X, X, X, X, X, X, X, X, X, 0x10, X, X, X)),
        ("BRK", op(X, X, X, 0x00, X, X, X, X, X, X, X, X, X, X)),
        ("BVC", op(X, X, X, X, X, X, X, X, X, X, 0x50, X, X, X)),
        ("BVS", op(X, X, X, X, X, X, X, X, X, X, 0x70, X, X, X)),
        ("CLC", op(X, X, X, 0x18, X, X, X, X, X, X, X, X, X, X)),
        ("CLD", op(X, X, X, 0xD8, X, X, X, X, X, X, X, X, X, X)),
        ("CLI", op(X, X, X, 0x58, X, X, X, X, X, X, X, X, X, X)),
        ("CLV", op(X, X, X, 0xB8, X, X, X, X, X, X, X, X, X, X)),
        ("CMP", op(0xC9, 0xCD, 0xC5, X, 0xC1, 0xD1, 0xD5, X, 0xDD, 0xD9, X, X, X, X)),
        ("CPX", op(0xE0, 0xEC, 0xE4, X, X, X, X, X, X, X, X, X, X, X)),
        ("CPY", op(0xC0, 0xCC, 0xC4, X, X, X, X, X, X, X, X, X, X, X)),
        ("DEC", op(X, 0xCE, 0xC6, X, X, X, 0xD6, X, 0xDE, X, X, X, X, X)),
        ("DEX", op(X, X, X, 0xCA, X, X, X, X, X, X, X, X, X, X)),
        ("DEY", op(X, X, X, 0x88, X, X, X, X, X, X, X, X, X, X)),
        ("EOR", op(0x49, 0x4D, 0x45, X, 0x41, 0x51, 0x55, X, 0x5D, 0x59, X, X, X, X)),
        ("INC", op(X, 0xEE, 0xE6, X, X, X, 0xF6, X, 0xFE, X, X, X, X, X)),
        ("INX", op(X, X, X, 0xE8, X, X, X, X, X, X, X, X, X, X)),
        ("INY", op(X, X, X, 0xC8, X, X, X, X, X, X, X, X, X, X)),
        ("JMP", op(X, 0x4C, X, X, X, X, X, X, X, X, X, 0x6C, X, X)),
        ("JSR", op(X, 0x20, X, X, X, X, X, X, X, X, X, X, X, X)),
        (
            "LDA",
            OpcodeRow { long_immediate_if_long_a: true, ..op(0xA9, 0xAD, 0xA5, X, 0xA1, 0xB1, 0xB5, X, 0xBD, 0xB9, X, X, X, X) },
        ),
        (
            "LDX",
            OpcodeRow { long_immediate_if_long_xy: true, ..op(0xA2, 0xAE, 0xA6, X, X, X, X, 0xB6, X, 0xBE, X, X, X, X) },
        ),
        (
            "LDY",
            OpcodeRow { long_immediate_if_long_xy: true, ..op(0xA0, 0xAC, 0xA4, X, X, X, 0xB4, X, 0xBC, X, X, X, X, X) },
        ),
        ("LSR", op(X, 0x4E, 0x46, 0x4A, X, X, 0x56, X, 0x5E, X, X, X, X, X)),
        ("NOP", op(X, X, X, 0xEA, X, X, X, X, X, X, X, X, X, X)),
        ("ORA", op(0x09, 0x0D, 0x05, X, 0x01, 0x11, 0x15, X, 0x1D, 0x19, X, X, X, X)),
        ("PHA", op(X, X, X, 0x48, X, X, X, X, X, X, X, X, X, X)),
        ("PHP", op(X, X, X, 0x08, X, X, X, X, X, X, X, X, X, X)),
        ("PLA", op(X, X, X, 0x68, X, X, X, X, X, X, X, X, X, X)),
        ("PLP", op(X, X, X, 0x28, X, X, X, X, X, X, X, X, X, X)),
        ("ROL", op(X, 0x2E, 0x26, 0x2A, X, X, 0x36, X, 0x3E, X, X, X, X, X)),
        ("ROR", op(X, 0x6E, 0x66, 0x6A, X, X, 0x76, X, 0x7E, X, X, X, X, X)),
        ("RTI", op(X, X, X, 0x40, X, X, X, X, X, X, X, X, X, X)),
        ("RTS", op(X, X, X, 0x60, X, X, X, X, X, X, X, X, X, X)),
        ("SBC", op(0xE9, 0xED, 0xE5, X, 0xE1, 0xF1, 0xF5, X, 0xFD, 0xF9, X, X, X, X)),
        ("SEC", op(X, X, X, 0x38, X, X, X, X, X, X, X, X, X, X)),
        ("SED", op(X, X, X, 0xF8, X, X, X, X, X, X, X, X, X, X)),
        ("SEI", op(X, X, X, 0x78, X, X, X, X, X, X, X, X, X, X)),
        ("STA", op(X, 0x8D, 0x85, X, 0x81, 0x91, 0x95, X, 0x9D, 0x99, X, X, X, X)),
        ("STX", op(X, 0x8E, 0x86, X, X, X, X, 0x96, X, X, X, X, X, X)),
        ("STY", op(X, 0x8C, 0x84, X, X, X, 0x94, X, X, X, X, X, X, X)),
        ("TAX", op(X, X, X, 0xAA, X, X, X, X, X, X, X, X, X, X)),
        ("TAY", op(X, X, X, 0xA8, X, X, X, X, X, X, X, X, X, X)),
        ("TSX", op(X, X, X, 0xBA, X, X, X, X, X, X, X, X, X, X)),
        ("TXA", op(X, X, X, 0x8A, X, X, X, X, X, X, X, X, X, X)),
        ("TXS", op(X, X, X, 0x9A, X, X, X, X, X, X, X, X, X, X)),
        ("TYA", op(X, X, X, 0x98, X, X, X, X, X, X, X, X, X, X)),
    ]
}

fn delta_65c02() -> Vec<(&'static str, OpcodeRow)> {
    vec![
        ("ADC", op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0x72)),
        ("AND", op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0x32)),
        ("BIT", op(0x89, X, X, X, X, X, 0x34, X, 0x3C, X, X, X, X, X)),
        ("BRA", op(X, X, X, X, X, X, X, X, X, X, 0x80, X, X, X)),
        ("CMP", op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0xD2)),
        ("DEA", op(X, X, X, 0x3A, X, X, X, X, X, X, X, X, X, X)),
        ("EOR", op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0x52)),
        ("INA", op(X, X, X, 0x1A, X, X, X, X, X, X, X, X, X, X)),
        ("JMP", op(X, X, X, X, X, X, X, X, X, X, X, X, 0x7C, X)),
        (
            "LDA",
            OpcodeRow { long_immediate_if_long_a: true, ..op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0xB2) },
        ),
        ("ORA", op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0x12)),
        ("PHX", op(X, X, X, 0xDA, X, X, X, X, X, X, X, X, X, X)),
        ("PHY", op(X, X, X, 0x5A, X, X, X, X, X, X, X, X, X, X)),
        ("PLX", op(X, X, X, 0xFA, X, X, X, X, X, X, X, X, X, X)),
        ("PLY", op(X, X, X, 0x7A, X, X, X, X, X, X, X, X, X, X)),
        ("SBC", op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0xF2)),
        ("STA", op(X, X, X, X, X, X, X, X, X, X, X, X, X, 0x92)),
        ("STZ", op(X, 0x9C, 0x64, X, X, X, 0x74, X, 0x9E, X, X, X, X, X)),
        ("TRB", op(X, 0x1C, 0x14, X, X, X, X, X, X, X, X, X, X, X)),
        ("TSB", op(X, 0x0C, 0x04, X, X, X, X, X, X, X, X, X, X, X)),
    ]
}

fn delta_65816() -> Vec<(&'static str, OpcodeRow)> {
    use Directive::*;
    vec![
        ("MX", directive(Mx)),
        ("REP", directive(Rep)),
        ("SEP", directive(Sep)),
        ("XCE", directive(Xce)),
        ("MVN", directive(Mvn)),
        ("MVP", directive(Mvp)),
        ("DEC", op(X, X, X, 0x3A, X, X, X, X, X, X, X, X, X, X)),
        ("INC", op(X, X, X, 0x1A, X, X, X, X, X, X, X, X, X, X)),
        ("LDAL", op(X, 0xAF, L, X, L, X, L, L, 0xBF, X, X, X, X, L)),
        ("PHB", op(X, X, X, 0x8B, X, X, X, X, X, X, X, X, X, X)),
        ("PLB", op(X, X, X, 0xAB, X, X, X, X, X, X, X, X, X, X)),
        ("STAL", op(X, 0x8F, L, X, L, X, L, L, 0x9F, X, X, X, X, L)),
    ]
}

/// Update-or-append merge: a delta row whose mnemonic already exists in
/// `base` overwrites only its non-sentinel opcode fields (and its
/// directive, if the delta supplies one); otherwise it is appended.
fn merge(base: &HashMap<String, OpcodeRow>, delta: &[(&'static str, OpcodeRow)]) -> HashMap<String, OpcodeRow> {
    let mut merged = base.clone();
    for (mnemonic, row) in delta {
        let key = mnemonic.to_ascii_uppercase();
        merged
            .entry(key)
            .and_modify(|existing| overlay(existing, row))
            .or_insert(*row);
    }
    merged
}

fn overlay(existing: &mut OpcodeRow, delta: &OpcodeRow) {
    if delta.directive.is_some() {
        existing.directive = delta.directive;
    }
    macro_rules! field {
        ($f:ident) => {
            if delta.$f != UNSUPPORTED {
                existing.$f = delta.$f;
            }
        };
    }
    field!(immediate);
    field!(absolute);
    field!(zero_page);
    field!(implied);
    field!(zp_indexed_indirect);
    field!(indirect_indexed);
    field!(zp_indexed_x);
    field!(zp_indexed_y);
    field!(abs_indexed_x);
    field!(abs_indexed_y);
    field!(relative);
    field!(abs_indirect);
    field!(abs_indexed_indirect);
    field!(zp_indirect);
    existing.long_immediate_if_long_a = existing.long_immediate_if_long_a || delta.long_immediate_if_long_a;
    existing.long_immediate_if_long_xy = existing.long_immediate_if_long_xy || delta.long_immediate_if_long_xy;
}

fn build_base() -> HashMap<String, OpcodeRow> {
    base_6502().into_iter().map(|(m, r)| (m.to_ascii_uppercase(), r)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSet {
    Mos6502,
    Wdc65C02,
    Wdc65816,
}

static TABLE_6502: OnceLock<HashMap<String, OpcodeRow>> = OnceLock::new();
static TABLE_65C02: OnceLock<HashMap<String, OpcodeRow>> = OnceLock::new();
static TABLE_65816: OnceLock<HashMap<String, OpcodeRow>> = OnceLock::new();

fn table_6502() -> &'static HashMap<String, OpcodeRow> {
    TABLE_6502.get_or_init(build_base)
}

fn table_65c02() -> &'static HashMap<String, OpcodeRow> {
    TABLE_65C02.get_or_init(|| merge(table_6502(), &delta_65c02()))
}

fn table_65816() -> &'static HashMap<String, OpcodeRow> {
    TABLE_65816.get_or_init(|| merge(table_65c02(), &delta_65816()))
}

/// Looks up `mnemonic` (case-insensitive) in the table for `set`.
pub fn lookup(set: InstructionSet, mnemonic: &str) -> Option<&'static OpcodeRow> {
    let table = match set {
        InstructionSet::Mos6502 => table_6502(),
        InstructionSet::Wdc65C02 => table_65c02(),
        InstructionSet::Wdc65816 => table_65816(),
    };
    table.get(mnemonic.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lda_immediate_absolute_zero_page() {
        let row = lookup(InstructionSet::Mos6502, "lda").unwrap();
        assert_eq!(row.immediate, 0xA9);
        assert_eq!(row.absolute, 0xAD);
        assert_eq!(row.zero_page, 0xA5);
        assert!(row.long_immediate_if_long_a);
    }

    #[test]
    fn sta_has_no_immediate() {
        let row = lookup(InstructionSet::Mos6502, "sta").unwrap();
        assert_eq!(row.immediate, UNSUPPORTED);
    }

    #[test]
    fn directives_share_the_mnemonic_table() {
        let row = lookup(InstructionSet::Mos6502, "ORG").unwrap();
        assert_eq!(row.directive, Some(Directive::Org));
    }

    #[test]
    fn sixty_five_c02_adds_indirect_zero_page_and_overrides_nothing_else() {
        let row = lookup(InstructionSet::Wdc65C02, "LDA").unwrap();
        assert_eq!(row.zp_indirect, 0xB2);
        // Untouched fields from the 6502 base survive the merge.
        assert_eq!(row.immediate, 0xA9);
    }

    #[test]
    fn sixty_five_c02_appends_new_mnemonics() {
        assert!(lookup(InstructionSet::Mos6502, "BRA").is_none());
        let row = lookup(InstructionSet::Wdc65C02, "BRA").unwrap();
        assert_eq!(row.relative, 0x80);
    }

    #[test]
    fn sixty_five_816_mx_overrides_the_ignored_directive() {
        let row = lookup(InstructionSet::Wdc65816, "MX").unwrap();
        assert_eq!(row.directive, Some(Directive::Mx));
        let row_6502 = lookup(InstructionSet::Mos6502, "MX").unwrap();
        assert_eq!(row_6502.directive, Some(Directive::Ignore));
    }

    #[test]
    fn long_addressing_sentinel_on_ldal() {
        let row = lookup(InstructionSet::Wdc65816, "LDAL").unwrap();
        assert_eq!(row.zero_page, USE_LONG);
        assert_eq!(row.absolute, 0xAF);
    }
}
