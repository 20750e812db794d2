//! Assembler orchestration (§4.8, "the heart"): drives the source stack
//! line by line through parsing, conditional-skip tracking, directive
//! dispatch and mnemonic encoding, and resolves forward references once
//! a symbol's defining line is seen.
//!
//! §9/§3.1 replace the original's cyclic `LineInfo ↔ Symbol` pointer
//! graph with two parallel arenas: [`LineInfo`] in a `Vec` here, `Symbol`
//! in [`crate::symbol_table::SymbolTable`], linked only by [`LineId`] /
//! [`crate::ids::SymbolId`].

pub mod directives;
pub mod encode;

use std::path::PathBuf;

use crate::addressing_mode;
use crate::binary_buffer::BinaryBuffer;
use crate::error::{AsmError, ErrorKind, Span};
use crate::expression::Expression;
use crate::ids::LineId;
use crate::line_parser::parse_line;
use crate::opcode_table::{self, Directive, InstructionSet};
use crate::symbol_table::{classify, DefineOutcome, LabelKind, SymbolTable, TableResolver};
use crate::text_source::{TextFile, TextSource, TextSourceInfo};

/// A line's emitted bytes: which buffer they landed in and where, so a
/// later forward-reference resolution can `overwrite` them in place.
#[derive(Debug, Clone, Copy)]
pub struct EmittedBytes {
    pub in_dummy: bool,
    pub offset: usize,
    pub length: usize,
}

/// Everything pass 1 recorded about one source line, kept so a forward
/// reference can be re-assembled later against the exact context it was
/// first seen in (§4.8 "Forward-reference resolution").
#[derive(Debug, Clone)]
pub struct LineInfo {
    pub source_info: TextSourceInfo,
    pub raw_line: String,
    pub pc: u32,
    pub global_label: String,
    pub instruction_set: InstructionSet,
    pub long_a: bool,
    pub long_xy: bool,
    pub in_dummy: bool,
    pub emitted: Option<EmittedBytes>,
    pub skip: bool,
}

#[derive(Debug, Clone, Copy)]
struct CondFrame {
    skip: bool,
    else_seen: bool,
    parent_skip: bool,
}

pub struct Assembler {
    symbols: SymbolTable,
    current_global_label: String,
    current_line: LineId,
    pc: u32,
    cond_stack: Vec<CondFrame>,
    source_stack: crate::text_source::SourceStack,
    put_search_path: Vec<PathBuf>,
    instruction_set: InstructionSet,
    long_a: bool,
    long_xy: bool,
    saved_pc_before_dum: Option<u32>,
    in_dummy: bool,
    error_count: u32,
    warning_count: u32,
    errors: Vec<AsmError>,
    output_dir: Option<PathBuf>,

    object_buffer: BinaryBuffer,
    dummy_buffer: BinaryBuffer,
    lines: Vec<LineInfo>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        symbols.seed_parameter_variables();
        Self {
            symbols,
            current_global_label: String::new(),
            current_line: LineId(0),
            pc: 0,
            cond_stack: Vec::new(),
            source_stack: crate::text_source::SourceStack::new(),
            put_search_path: Vec::new(),
            instruction_set: InstructionSet::Mos6502,
            long_a: false,
            long_xy: false,
            saved_pc_before_dum: None,
            in_dummy: false,
            error_count: 0,
            warning_count: 0,
            errors: Vec::new(),
            output_dir: None,
            object_buffer: BinaryBuffer::new(),
            dummy_buffer: BinaryBuffer::new(),
            lines: Vec::new(),
        }
    }

    /// A semicolon-separated list of directories searched (after the
    /// literal path) for a `PUT`-included file (§4.8 "PUT directive").
    pub fn add_put_search_dir(&mut self, dir: PathBuf) {
        self.put_search_path.push(dir);
    }

    /// Directory a bare `SAV` filename (no directory component of its
    /// own) is resolved against before being queued (§6 `--outdir`).
    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.output_dir = Some(dir);
    }

    pub(super) fn resolve_output_path(&self, filename: &str) -> String {
        let path = std::path::Path::new(filename);
        match &self.output_dir {
            Some(dir) if path.components().count() <= 1 => dir.join(path).to_string_lossy().into_owned(),
            _ => filename.to_string(),
        }
    }

    pub fn errors(&self) -> &[AsmError] {
        &self.errors
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn lines(&self) -> &[LineInfo] {
        &self.lines
    }

    pub fn object_buffer(&self) -> &BinaryBuffer {
        &self.object_buffer
    }

    pub fn dummy_buffer(&self) -> &BinaryBuffer {
        &self.dummy_buffer
    }

    /// Runs pass 1 over `text` (attributed to `filename` in diagnostics
    /// and the list file). Assembling more than one file in the same
    /// `Assembler` is not supported — the source stack is expected to
    /// start empty.
    pub fn assemble(&mut self, filename: impl Into<String>, text: &str) {
        let file = TextFile::from_text(filename.into(), text);
        self.source_stack.push(TextSource::file(file));
        self.run();
    }

    /// Drains the object buffer's queued `SAV` writes, unless pass 1
    /// recorded any error (§7's "non-zero error count suppresses the
    /// queued-file drain").
    pub fn write_queued_files(&self) -> std::io::Result<()> {
        if self.error_count > 0 {
            return Ok(());
        }
        self.object_buffer.process_write_file_queue()
    }

    fn run(&mut self) {
        loop {
            let Some((raw_line, info)) = self.source_stack.next_line() else { break };
            self.process_line(raw_line, info);
        }
        self.push_warning_missing_fin();
        self.report_undefined_symbols();
    }

    fn report_undefined_symbols(&mut self) {
        let names: Vec<String> = self
            .symbols
            .iter_undefined()
            .map(|s| if s.local_key.is_empty() { s.global_key.clone() } else { s.local_key.clone() })
            .collect();
        for name in names {
            self.push_error(AsmError::undefined_label(&name, Span::whole_line(0)));
        }
    }

    fn process_line(&mut self, raw_line: String, info: TextSourceInfo) {
        let line_id = LineId(self.lines.len() as u32);
        let parent_skip = self.cond_stack.last().map(|f| f.skip || f.parent_skip).unwrap_or(false);
        let pc_before = self.pc;

        self.lines.push(LineInfo {
            source_info: info.clone(),
            raw_line: raw_line.clone(),
            pc: pc_before,
            global_label: self.current_global_label.clone(),
            instruction_set: self.instruction_set,
            long_a: self.long_a,
            long_xy: self.long_xy,
            in_dummy: self.in_dummy,
            emitted: None,
            skip: parent_skip,
        });
        self.current_line = line_id;

        let span = Span::whole_line(info.line_number);
        let parsed = parse_line(&raw_line);
        if parsed.is_comment {
            return;
        }

        if !parent_skip && !parsed.label.is_empty() && matches!(classify(parsed.label), LabelKind::Global) {
            self.current_global_label = parsed.label.to_string();
            self.lines[line_id.index()].global_label = self.current_global_label.clone();
        }

        if parsed.operator.is_empty() {
            if !parent_skip && !parsed.label.is_empty() {
                self.define_label(parsed.label, Expression::absolute(pc_before as u32), span);
            }
            return;
        }

        let operator_upper = parsed.operator.to_ascii_uppercase();
        let Some(row) = opcode_table::lookup(self.instruction_set, &operator_upper) else {
            if !parent_skip {
                self.push_error(AsmError::new(
                    ErrorKind::InvalidArgument,
                    format!("'{}' isn't a recognized mnemonic or directive", parsed.operator),
                    span,
                ));
            }
            return;
        };

        if let Some(directive) = row.directive {
            let always_runs = matches!(directive, Directive::Do | Directive::Else | Directive::Fin);
            if parent_skip && !always_runs {
                return;
            }
            if !matches!(directive, Directive::Equ) && !parsed.label.is_empty() {
                self.define_label(parsed.label, Expression::absolute(pc_before as u32), span);
            }
            self.dispatch_directive(directive, parsed.label, parsed.operands, span);
            return;
        }

        if parent_skip {
            return;
        }
        if !parsed.label.is_empty() {
            self.define_label(parsed.label, Expression::absolute(pc_before as u32), span);
        }
        self.assemble_mnemonic(row, parsed.operands, span);
    }

    fn dispatch_directive(&mut self, directive: Directive, label: &str, operands: &str, span: Span) {
        match directive {
            Directive::Equ => self.dir_equ(label, operands, span),
            Directive::Do => self.dir_do(operands, span),
            Directive::Else => self.dir_else(span),
            Directive::Fin => self.dir_fin(span),
            Directive::Dum => self.dir_dum(operands, span),
            Directive::Dend => self.dir_dend(span),
            Directive::Org => self.dir_org(operands, span),
            Directive::Sav => self.dir_sav(operands, span),
            Directive::Hex => self.dir_hex(operands, span),
            Directive::Asc => self.dir_asc_rev(operands, false, span),
            Directive::Rev => self.dir_asc_rev(operands, true, span),
            Directive::Da => self.dir_da(operands, span),
            Directive::Db => self.dir_db(operands, span),
            Directive::Ds => self.dir_ds(operands, span),
            Directive::Put => self.dir_put(operands, span),
            Directive::Lup => self.dir_lup(operands, span),
            Directive::Xc => self.dir_xc(operands),
            Directive::Mx => self.dir_mx(operands, span),
            Directive::Rep => self.dir_rep(operands, span),
            Directive::Sep => self.dir_sep(operands, span),
            Directive::Xce => self.dir_xce(),
            Directive::Mvn => self.dir_mvn_mvp(operands, 0x54, span),
            Directive::Mvp => self.dir_mvn_mvp(operands, 0x44, span),
            Directive::LupEnd => {
                self.push_error(AsmError::new(ErrorKind::LupEndWithoutLup, "--^ without matching LUP", span));
            }
            // MAC/<<</USR are declared and wired in the original but never
            // instantiated (§9 Open Questions); preserved as no-ops.
            Directive::Mac | Directive::MacEnd | Directive::Usr | Directive::Ignore => {}
        }
    }

    fn assemble_mnemonic(&mut self, row: &opcode_table::OpcodeRow, operands: &str, span: Span) {
        let pc = self.pc;
        let mut resolver =
            TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        let am = match addressing_mode::classify(operands, pc, &mut resolver, span) {
            Ok(am) => am,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        match encode::encode(row, &am, pc, self.long_a, self.long_xy, span) {
            Ok(enc) => {
                if enc.offset_out_of_range {
                    self.push_error(AsmError::new(ErrorKind::OffsetOutOfRange, "relative branch target out of range", span));
                }
                self.emit(&enc.bytes);
            }
            Err(e) => self.push_error(e),
        }
    }

    /// Appends `bytes` to the active buffer (object or dummy), advances
    /// `pc`, and records the allocation on the current line so a later
    /// forward-reference resolution can patch it in place (§4.8).
    pub(super) fn emit(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let in_dummy = self.in_dummy;
        let (offset, length) = if in_dummy { self.dummy_buffer.alloc(bytes) } else { self.object_buffer.alloc(bytes) };
        self.pc = self.pc.wrapping_add(bytes.len() as u32) & 0xFFFF;
        if let Some(line) = self.lines.get_mut(self.current_line.index()) {
            line.emitted = Some(EmittedBytes { in_dummy, offset, length });
        }
    }

    pub(super) fn buffer_mut(&mut self) -> &mut BinaryBuffer {
        if self.in_dummy {
            &mut self.dummy_buffer
        } else {
            &mut self.object_buffer
        }
    }

    /// Defines `label` at `expr`, then re-assembles every line that
    /// forward-referenced it (§4.8 "Forward-reference resolution").
    pub(super) fn define_label(&mut self, label: &str, expr: Expression, span: Span) {
        if matches!(classify(label), LabelKind::Local) && self.current_global_label.is_empty() {
            self.push_error(AsmError::new(
                ErrorKind::LocalLabelBeforeGlobal,
                "local label not allowed before first global label",
                span,
            ));
            return;
        }
        let global = self.current_global_label.clone();
        let line = self.current_line;
        match self.symbols.define(&global, label, expr, line) {
            DefineOutcome::Defined { pending, .. } => {
                for referencing_line in pending {
                    self.resolve_forward_reference(referencing_line);
                }
            }
            DefineOutcome::DuplicateLabel { first_defined_line } => {
                let first_line_no = self.lines.get(first_defined_line.index()).map(|l| l.source_info.line_number).unwrap_or(0);
                self.push_error(AsmError::duplicate_label(label, first_line_no, span));
            }
        }
    }

    /// Re-parses and re-assembles `line_id` against its originally
    /// recorded context now that one of its labels has a value,
    /// patching the buffer in place if the byte count matches, or
    /// reporting `ForwardReferenceSizeMismatch` if it does not.
    fn resolve_forward_reference(&mut self, line_id: LineId) {
        let Some(snapshot) = self.lines.get(line_id.index()).cloned() else { return };
        if snapshot.skip {
            return;
        }
        let parsed = parse_line(&snapshot.raw_line);
        if parsed.is_comment || parsed.operator.is_empty() {
            return;
        }
        let operator_upper = parsed.operator.to_ascii_uppercase();
        let Some(row) = opcode_table::lookup(snapshot.instruction_set, &operator_upper) else { return };
        let span = Span::whole_line(snapshot.source_info.line_number);

        match row.directive {
            None => self.reassemble_mnemonic(line_id, &snapshot, row, parsed.operands, span),
            Some(Directive::Da) => self.reassemble_list(line_id, &snapshot, parsed.operands, span, 2),
            Some(Directive::Db) => self.reassemble_list(line_id, &snapshot, parsed.operands, span, 1),
            _ => {}
        }
    }

    fn reassemble_mnemonic(&mut self, line_id: LineId, snapshot: &LineInfo, row: &opcode_table::OpcodeRow, operands: &str, span: Span) {
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &snapshot.global_label, referencing_line: line_id };
        let am = match addressing_mode::classify(operands, snapshot.pc, &mut resolver, span) {
            Ok(am) => am,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        let enc = match encode::encode(row, &am, snapshot.pc, snapshot.long_a, snapshot.long_xy, span) {
            Ok(enc) => enc,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        let Some(emitted) = snapshot.emitted else { return };
        if enc.bytes.len() != emitted.length {
            self.push_error(AsmError::new(ErrorKind::ForwardReferenceSizeMismatch, "couldn't infer size of forward reference", span));
            return;
        }
        let buf = if emitted.in_dummy { &mut self.dummy_buffer } else { &mut self.object_buffer };
        buf.overwrite(emitted.offset, &enc.bytes);
    }

    /// Shared patch-back for `DA`/`DW` (2 bytes/operand) and `DB`/`DFB`
    /// (1 byte/operand): both are fixed-size regardless of the label's
    /// value, so only the bytes — never the length — can mismatch.
    fn reassemble_list(&mut self, line_id: LineId, snapshot: &LineInfo, operands: &str, span: Span, width: usize) {
        let mut bytes = Vec::new();
        for part in operands.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut resolver = TableResolver { table: &mut self.symbols, global_label: &snapshot.global_label, referencing_line: line_id };
            match crate::expression::evaluate(part, snapshot.pc, &mut resolver, span) {
                Ok((expr, _)) => {
                    bytes.push((expr.value & 0xFF) as u8);
                    if width == 2 {
                        bytes.push(((expr.value >> 8) & 0xFF) as u8);
                    }
                }
                Err(e) => {
                    self.push_error(e);
                    return;
                }
            }
        }
        let Some(emitted) = snapshot.emitted else { return };
        if bytes.len() != emitted.length {
            return;
        }
        let buf = if emitted.in_dummy { &mut self.dummy_buffer } else { &mut self.object_buffer };
        buf.overwrite(emitted.offset, &bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lda_immediate_scenario() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\tlda #$60\n");
        assert_eq!(asm.error_count(), 0);
        let emitted = asm.lines().last().unwrap().emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0xA9, 0x60]);
    }

    #[test]
    fn sta_absolute_and_zero_page() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\tsta $4fb\n\tsta $fb\n");
        assert_eq!(asm.error_count(), 0);
        let lines = asm.lines();
        let e1 = lines[1].emitted.unwrap();
        assert_eq!(asm.object_buffer().read(e1.offset, e1.length), &[0x8D, 0xFB, 0x04]);
        let e2 = lines[2].emitted.unwrap();
        assert_eq!(asm.object_buffer().read(e2.offset, e2.length), &[0x85, 0xFB]);
    }

    #[test]
    fn backward_reference_scenario_from_spec() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\nentry lda #$60\n\tsta entry\n");
        assert_eq!(asm.error_count(), 0);
        let lines = asm.lines();
        let emitted = lines[2].emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0x8D, 0x00, 0x80]);
    }

    #[test]
    fn true_forward_reference_patches_the_absolute_operand() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\tsta entry\nentry lda #$60\n");
        assert_eq!(asm.error_count(), 0);
        let lines = asm.lines();
        let emitted = lines[1].emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0x8D, 0x03, 0x80]);
    }

    #[test]
    fn hex_directive_emits_bytes() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\thex 0e,0c,0a\n");
        let emitted = asm.lines().last().unwrap().emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0x0E, 0x0C, 0x0A]);
    }

    #[test]
    fn hex_directive_accepts_concatenated_nibble_pairs() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\thex 0E0C0A\n");
        let emitted = asm.lines().last().unwrap().emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0x0E, 0x0C, 0x0A]);
    }

    #[test]
    fn sep_sets_long_accumulator_and_widens_immediate() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\txc\n\txc\n\torg $8000\n\tsep #$20\n\tlda #$12\n");
        let emitted = asm.lines().last().unwrap().emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0xA9, 0x12, 0x00]);
    }

    #[test]
    fn rep_clears_long_accumulator_and_narrows_immediate() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\txc\n\txc\n\torg $8000\n\tsep #$20\n\trep #$20\n\tlda #$12\n");
        let emitted = asm.lines().last().unwrap().emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0xA9, 0x12]);
    }

    #[test]
    fn mvn_emits_bank_bytes_not_high_bytes() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\txc\n\txc\n\torg $8000\n\tmvn $001234,$005678\n");
        let emitted = asm.lines().last().unwrap().emitted.unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0x54, 0x00, 0x00]);
    }

    #[test]
    fn conditional_do_else_fin_selects_branch() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\tdo 0\n\thex 11\n\telse\n\thex 22\n\tfin\n");
        assert_eq!(asm.error_count(), 0);
        let emitted = asm.lines().iter().find_map(|l| l.emitted).unwrap();
        assert_eq!(asm.object_buffer().read(emitted.offset, emitted.length), &[0x22]);
    }

    #[test]
    fn duplicate_label_is_reported() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\nentry lda #$01\nentry lda #$02\n");
        assert_eq!(asm.error_count(), 1);
        assert_eq!(asm.errors()[0].kind, ErrorKind::DuplicateLabel);
    }

    #[test]
    fn undefined_symbol_is_reported_once() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\tsta neverDefined\n\tlda neverDefined\n");
        assert_eq!(asm.error_count(), 1);
        assert_eq!(asm.errors()[0].kind, ErrorKind::UndefinedLabel);
    }

    #[test]
    fn sav_queues_under_output_dir_when_set() {
        let mut asm = Assembler::new();
        asm.set_output_dir(PathBuf::from("out"));
        asm.assemble("main.s", "\torg $8000\n\tlda #$60\n\tsav prog.bin\n");
        assert_eq!(asm.error_count(), 0);
        assert!(!asm.object_buffer().is_empty_queue());
    }

    #[test]
    fn local_label_before_any_global_label_is_rejected() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n:loop lda #$01\n");
        assert_eq!(asm.error_count(), 1);
        assert_eq!(asm.errors()[0].kind, ErrorKind::LocalLabelBeforeGlobal);
    }

    #[test]
    fn missing_fin_is_a_warning() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\tdo 1\n\thex 01\n");
        assert_eq!(asm.warning_count(), 1);
        assert_eq!(asm.error_count(), 0);
    }

    #[test]
    fn lup_repeats_body_three_times() {
        let mut asm = Assembler::new();
        asm.assemble("main.s", "\torg $8000\n\tlup 3\n\thex 01\n\t--^\n");
        let count = asm.lines().iter().filter(|l| l.emitted.is_some()).count();
        assert_eq!(count, 3);
    }
}
