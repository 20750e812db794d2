//! Directive handlers (§4.8). Each function receives the already-split
//! `(label, operands)` for the current line and mutates the assembler
//! state; byte-emitting directives append to the active binary buffer
//! through `Assembler::emit`.

use crate::error::{AsmError, ErrorKind, Severity, Span};
use crate::expression::{evaluate, ExprType};
use crate::symbol_table::TableResolver;
use crate::text_source::{TextSource, TextSourceInfo};

use super::{Assembler, CondFrame};

impl Assembler {
    pub(super) fn dir_equ(&mut self, label: &str, operands: &str, span: Span) {
        if label.is_empty() {
            self.push_error(AsmError::new(ErrorKind::InvalidArgument, "EQU requires a label", span));
            return;
        }
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        match evaluate(operands, self.pc, &mut resolver, span) {
            Ok((expr, _)) => self.define_label(label, expr, span),
            Err(e) => self.push_error(e),
        }
    }

    pub(super) fn dir_do(&mut self, operands: &str, span: Span) {
        let parent_skip = self.cond_stack.last().map(|f| f.skip || f.parent_skip).unwrap_or(false);
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        match evaluate(operands, self.pc, &mut resolver, span) {
            Ok((expr, _)) => {
                if expr.forward_reference {
                    self.push_error(AsmError::new(ErrorKind::ForwardReferenceDisallowed, "DO condition can't forward-reference a label", span));
                }
                self.cond_stack.push(CondFrame { skip: expr.value == 0, else_seen: false, parent_skip });
            }
            Err(e) => self.push_error(e),
        }
    }

    pub(super) fn dir_else(&mut self, span: Span) {
        match self.cond_stack.last_mut() {
            None => self.push_error(AsmError::new(ErrorKind::ElseWithoutDo, "ELSE without matching DO", span)),
            Some(frame) => {
                if frame.else_seen {
                    self.push_error(AsmError::new(ErrorKind::DuplicateElse, "duplicate ELSE for this DO", span));
                    return;
                }
                frame.else_seen = true;
                if !frame.parent_skip {
                    frame.skip = !frame.skip;
                }
            }
        }
    }

    pub(super) fn dir_fin(&mut self, span: Span) {
        if self.cond_stack.pop().is_none() {
            self.push_error(AsmError::new(ErrorKind::FinWithoutDo, "FIN without matching DO", span));
        }
    }

    pub(super) fn dir_dum(&mut self, operands: &str, span: Span) {
        if !operands.trim().is_empty() {
            let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
            match evaluate(operands, self.pc, &mut resolver, span) {
                Ok((expr, _)) => {
                    self.saved_pc_before_dum = Some(self.pc);
                    self.pc = expr.value;
                }
                Err(e) => {
                    self.push_error(e);
                    self.saved_pc_before_dum = Some(self.pc);
                }
            }
        } else {
            self.saved_pc_before_dum = Some(self.pc);
        }
        self.in_dummy = true;
    }

    pub(super) fn dir_dend(&mut self, span: Span) {
        match self.saved_pc_before_dum.take() {
            Some(pc) => {
                self.pc = pc;
                self.in_dummy = false;
            }
            None => self.push_error(AsmError::new(ErrorKind::DendWithoutDum, "DEND without matching DUM", span)),
        }
    }

    pub(super) fn dir_org(&mut self, operands: &str, span: Span) {
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        match evaluate(operands, self.pc, &mut resolver, span) {
            Ok((expr, _)) => {
                self.pc = expr.value & 0xFFFF;
                self.buffer_mut().set_origin(self.pc as u16);
            }
            Err(e) => self.push_error(e),
        }
    }

    pub(super) fn dir_sav(&mut self, operands: &str, span: Span) {
        let filename = operands.trim().trim_matches(|c| c == '"' || c == '\'');
        if filename.is_empty() {
            self.push_error(AsmError::new(ErrorKind::MissingOperand, "SAV requires a filename", span));
            return;
        }
        let resolved = self.resolve_output_path(filename);
        self.buffer_mut().queue_write_to_file(resolved, crate::binary_buffer::HeaderKind::Sav);
    }

    pub(super) fn dir_hex(&mut self, operands: &str, span: Span) {
        let mut bytes = Vec::new();
        let digits: Vec<char> = operands.chars().filter(|&c| c != ',' && !c.is_whitespace()).collect();
        let mut i = 0;
        while i < digits.len() {
            let pair: String = digits[i..(i + 2).min(digits.len())].iter().collect();
            match u8::from_str_radix(&pair, 16) {
                Ok(b) => bytes.push(b),
                Err(_) => {
                    self.push_error(AsmError::new(ErrorKind::InvalidHexDigit, format!("'{pair}' isn't a valid hex byte"), span));
                    return;
                }
            }
            i += 2;
        }
        if bytes.len() > 32 {
            self.push_error(AsmError::new(ErrorKind::BufferOverrun, "HEX accepts at most 32 bytes", span));
            bytes.truncate(32);
        }
        self.emit(&bytes);
    }

    pub(super) fn dir_asc_rev(&mut self, operands: &str, reversed: bool, span: Span) {
        let trimmed = operands.trim();
        let Some(delim) = trimmed.chars().next() else {
            self.push_error(AsmError::new(ErrorKind::MissingOperand, "ASC/REV requires a delimited string", span));
            return;
        };
        let body = &trimmed[delim.len_utf8()..];
        let end = body.find(delim).unwrap_or(body.len());
        let text = &body[..end];
        let force_high_bit = (delim as u32) < ('\'' as u32);
        let mut bytes: Vec<u8> = text.bytes().map(|b| if force_high_bit { b | 0x80 } else { b & 0x7F }).collect();
        if reversed {
            bytes.reverse();
        }
        self.emit(&bytes);
    }

    pub(super) fn dir_da(&mut self, operands: &str, span: Span) {
        let mut bytes = Vec::new();
        for part in operands.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
            match evaluate(part, self.pc, &mut resolver, span) {
                Ok((expr, _)) => {
                    bytes.push((expr.value & 0xFF) as u8);
                    bytes.push(((expr.value >> 8) & 0xFF) as u8);
                }
                Err(e) => self.push_error(e),
            }
        }
        self.emit(&bytes);
    }

    pub(super) fn dir_db(&mut self, operands: &str, span: Span) {
        let mut bytes = Vec::new();
        for part in operands.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
            match evaluate(part, self.pc, &mut resolver, span) {
                Ok((expr, _)) => bytes.push((expr.value & 0xFF) as u8),
                Err(e) => self.push_error(e),
            }
        }
        self.emit(&bytes);
    }

    pub(super) fn dir_ds(&mut self, operands: &str, span: Span) {
        let operands = operands.trim();
        let (count_text, fill_text) = crate::sized_string::split_at(operands, ',');
        let count_text = count_text.trim();
        let to_page_boundary = count_text.starts_with('\\');
        let count_text = count_text.trim_start_matches('\\');

        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        let count_expr = match evaluate(count_text, self.pc, &mut resolver, span) {
            Ok((e, _)) => e,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        let fill = if fill_text.trim().is_empty() {
            0u8
        } else {
            let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
            match evaluate(fill_text.trim(), self.pc, &mut resolver, span) {
                Ok((e, _)) => (e.value & 0xFF) as u8,
                Err(e) => {
                    self.push_error(e);
                    0
                }
            }
        };
        let count = if to_page_boundary {
            let remainder = self.pc % 256;
            if remainder == 0 { 0 } else { 256 - remainder }
        } else {
            count_expr.value
        };
        let bytes = vec![fill; count as usize];
        self.emit(&bytes);
    }

    pub(super) fn dir_put(&mut self, operands: &str, span: Span) {
        let mut fields = operands.split(',').map(str::trim);
        let Some(raw_name) = fields.next() else {
            self.push_error(AsmError::new(ErrorKind::MissingOperand, "PUT requires a filename", span));
            return;
        };
        let raw_name = raw_name.trim_matches(|c| c == '"' || c == '\'');
        if raw_name.is_empty() {
            self.push_error(AsmError::new(ErrorKind::MissingOperand, "PUT requires a filename", span));
            return;
        }
        let skip_lines: u32 = fields
            .nth(2)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let mut candidate_paths = vec![std::path::PathBuf::from(raw_name)];
        for dir in &self.put_search_path {
            candidate_paths.push(dir.join(raw_name));
        }
        let found = candidate_paths.iter().find(|p| p.exists()).cloned();
        let Some(path) = found else {
            self.push_error(AsmError::new(ErrorKind::FileOpen, format!("couldn't find PUT file '{raw_name}'"), span));
            return;
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => {
                self.push_error(AsmError::new(ErrorKind::FileOpen, format!("couldn't open PUT file '{raw_name}'"), span));
                return;
            }
        };
        let mut file = crate::text_source::TextFile::from_text(path.to_string_lossy().to_string(), &text);
        for _ in 0..skip_lines {
            if file.next_line().is_none() {
                break;
            }
        }
        self.source_stack.push(TextSource::file(file));
    }

    pub(super) fn dir_lup(&mut self, operands: &str, span: Span) {
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        let count_expr = match evaluate(operands, self.pc, &mut resolver, span) {
            Ok((e, _)) => e,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        if count_expr.forward_reference {
            self.push_error(AsmError::new(ErrorKind::ForwardReferenceDisallowed, "LUP count can't forward-reference a label", span));
            return;
        }
        if count_expr.value == 0 || count_expr.value > 32768 {
            self.push_error(AsmError::new(ErrorKind::InvalidLupCount, "LUP count must be in 1..=32768", span));
            return;
        }

        let Some(TextSource::File { file }) = self.source_stack.top() else {
            self.push_error(AsmError::new(ErrorKind::InvalidArgument, "LUP must appear directly in a file source", span));
            return;
        };
        let start = file.cursor_index();
        let remaining = file.remaining_lines();
        let end_offset = remaining.iter().position(|l| {
            let parsed = crate::line_parser::parse_line(l);
            !parsed.is_comment && parsed.operator.eq_ignore_ascii_case("--^")
        });

        let Some(TextSource::File { file }) = self.source_stack.top_mut() else {
            unreachable!("checked above");
        };
        let body_end = match end_offset {
            Some(off) => start + off,
            None => file.cursor_index() + remaining.len(),
        };
        let derived = file.derive(start, body_end);
        let resume_at = body_end + if end_offset.is_some() { 1 } else { 0 };
        file.set_cursor(resume_at);

        self.source_stack.push(TextSource::lup(derived, count_expr.value));
    }

    pub(super) fn dir_xc(&mut self, operands: &str) {
        use crate::opcode_table::InstructionSet::*;
        if operands.trim().eq_ignore_ascii_case("OFF") {
            self.instruction_set = Mos6502;
            return;
        }
        self.instruction_set = match self.instruction_set {
            Mos6502 => Wdc65C02,
            Wdc65C02 => Wdc65816,
            Wdc65816 => Wdc65816,
        };
    }

    pub(super) fn dir_mx(&mut self, operands: &str, span: Span) {
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        match evaluate(operands, self.pc, &mut resolver, span) {
            Ok((e, _)) => {
                self.long_a = e.value & 0b01 != 0;
                self.long_xy = e.value & 0b10 != 0;
            }
            Err(e) => self.push_error(e),
        }
    }

    pub(super) fn dir_rep(&mut self, operands: &str, span: Span) {
        self.dir_rep_sep(operands, span, true);
    }

    pub(super) fn dir_sep(&mut self, operands: &str, span: Span) {
        self.dir_rep_sep(operands, span, false);
    }

    fn dir_rep_sep(&mut self, operands: &str, span: Span, is_rep: bool) {
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        let imm = match evaluate(operands, self.pc, &mut resolver, span) {
            Ok((e, _)) => e.value & 0xFF,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        if imm & 0x20 != 0 {
            self.long_a = !is_rep;
        }
        if imm & 0x10 != 0 {
            self.long_xy = !is_rep;
        }
        let opcode = if is_rep { 0xC2 } else { 0xE2 };
        self.emit(&[opcode, imm as u8]);
    }

    pub(super) fn dir_xce(&mut self) {
        self.long_a = false;
        self.long_xy = false;
        self.emit(&[0xFB]);
    }

    pub(super) fn dir_mvn_mvp(&mut self, operands: &str, opcode: u8, span: Span) {
        let (left, right) = crate::sized_string::split_at(operands, ',');
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        let src = match evaluate(left.trim(), self.pc, &mut resolver, span) {
            Ok((e, _)) => e,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        let mut resolver = TableResolver { table: &mut self.symbols, global_label: &self.current_global_label, referencing_line: self.current_line };
        let dest = match evaluate(right.trim(), self.pc, &mut resolver, span) {
            Ok((e, _)) => e,
            Err(e) => {
                self.push_error(e);
                return;
            }
        };
        self.emit(&[opcode, ((src.value >> 16) & 0xFF) as u8, ((dest.value >> 16) & 0xFF) as u8]);
    }

    pub(super) fn push_warning_missing_fin(&mut self) {
        if !self.cond_stack.is_empty() {
            self.push_error(AsmError::warning(ErrorKind::MissingFin, "missing FIN at end of source", Span::whole_line(self.current_source_info().line_number)));
        }
    }

    pub(super) fn current_source_info(&self) -> TextSourceInfo {
        self.source_stack
            .top()
            .map(|s| TextSourceInfo { filename: s.filename().to_string(), line_number: s.line_number(), depth: self.source_stack.depth() })
            .unwrap_or(TextSourceInfo { filename: String::new(), line_number: 0, depth: 0 })
    }

    pub(super) fn push_error(&mut self, err: AsmError) {
        match err.severity {
            Severity::Error => {
                tracing::error!(line = err.span.line, "{}", err.message);
                self.error_count += 1;
            }
            Severity::Warning => {
                tracing::warn!(line = err.span.line, "{}", err.message);
                self.warning_count += 1;
            }
        }
        self.errors.push(err);
    }
}
