//! List-file pretty printer (§2 component 13, ADDED): renders one
//! `address: machine-code  line-number  source` row per assembled line,
//! indented by source-stack depth so nested `PUT`/`LUP` bodies are
//! visually offset from their including file.
//!
//! Grounded on `ListFile.c::ListFile_OutputLine`: a 4-column address
//! field, an 8-column machine-code-or-`=value` field, depth indentation,
//! a 5-column line number, then the untouched source text (so whatever
//! leading whitespace the line itself had is preserved verbatim).

use crate::assembler::LineInfo;

/// Spaces of indentation per nesting level below the top-level file.
const INDENT_PER_DEPTH: usize = 2;

/// Renders one list-file row for `line`, given the bytes it emitted (if
/// any) and, for an `EQU` line, the value the label was assigned.
///
/// A line with more than 3 emitted bytes continues onto further rows
/// (`listOverflowMachineCodeLine`): each additional row repeats the
/// address (advanced by 3) and the next up-to-3 bytes, with no line
/// number or source text.
pub fn format_line(line: &LineInfo, machine_code: &[u8], equ_value: Option<u32>) -> String {
    let mut out = String::new();
    let address_field = if equ_value.is_some() || !machine_code.is_empty() { format!("{:04X}", line.pc) } else { String::new() };
    let code_field = if let Some(value) = equ_value {
        format!("   ={:04X}", value & 0xFFFF)
    } else {
        machine_code_field(&machine_code[..machine_code.len().min(3)])
    };
    let indent = " ".repeat(indentation_for(line.source_info.depth));
    out.push_str(&format!("{:>4}: {:<8} {}{:>5} {}", address_field, code_field, indent, line.source_info.line_number, line.raw_line));

    let mut rest = &machine_code[machine_code.len().min(3)..];
    let mut address = line.pc.wrapping_add(3);
    while !rest.is_empty() {
        let chunk = &rest[..rest.len().min(3)];
        out.push('\n');
        out.push_str(&format!("{:04X}: {}", address & 0xFFFF, machine_code_field(chunk)));
        address = address.wrapping_add(3);
        rest = &rest[chunk.len()..];
    }
    out
}

fn indentation_for(depth: u32) -> usize {
    (depth.saturating_sub(1) as usize) * INDENT_PER_DEPTH
}

/// Renders up to 3 bytes as `"XX XX XX"`, space-padded to 8 columns
/// exactly as `fillMachineCodeBuffer`'s three `sprintf` arms do.
fn machine_code_field(bytes: &[u8]) -> String {
    match bytes.len() {
        0 => "        ".to_string(),
        1 => format!("{:02X}      ", bytes[0]),
        2 => format!("{:02X} {:02X}   ", bytes[0], bytes[1]),
        _ => format!("{:02X} {:02X} {:02X}", bytes[0], bytes[1], bytes[2]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode_table::InstructionSet;
    use crate::text_source::TextSourceInfo;

    fn line(pc: u32, line_number: u32, raw: &str) -> LineInfo {
        LineInfo {
            source_info: TextSourceInfo { filename: "main.s".to_string(), line_number, depth: 1 },
            raw_line: raw.to_string(),
            pc,
            global_label: String::new(),
            instruction_set: InstructionSet::Mos6502,
            long_a: false,
            long_xy: false,
            in_dummy: false,
            emitted: None,
            skip: false,
        }
    }

    #[test]
    fn lda_immediate_scenario_from_spec() {
        let l = line(0x8000, 1, " lda #$60");
        assert_eq!(format_line(&l, &[0xA9, 0x60], None), "8000: A9 60        1  lda #$60");
    }

    #[test]
    fn equ_line_prints_its_value_instead_of_machine_code() {
        let l = line(0x8000, 1, "entry equ $60");
        assert_eq!(format_line(&l, &[], Some(0x60)), "8000:    =0060     1 entry equ $60");
    }

    #[test]
    fn nested_depth_indents_the_line_number_column() {
        let mut l = line(0x8010, 5, " hex 01");
        l.source_info.depth = 2;
        let rendered = format_line(&l, &[0x01], None);
        assert!(rendered.starts_with("8010: 01           "));
    }
}
