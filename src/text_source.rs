//! Text source stack (§4.2): a LIFO stack of line iterators over either a
//! loaded file or an in-memory line range, supporting `PUT` includes and
//! `LUP` loops.
//!
//! Per SPEC_FULL.md §3.1, the original's pointer-chained, vtable-dispatched
//! `TextSource` becomes a tagged `enum` over an index into a `Vec<TextFile>`
//! arena owned by the assembler. There is no process-level free list:
//! Rust's ownership model drops derived `TextFile`s automatically once
//! nothing references their arena slot anymore is unnecessary to model —
//! the arena simply keeps every `TextFile` alive for the lifetime of the
//! assembler, exactly mirroring the original's "never freed until
//! teardown" lifecycle for `LineInfo`.

use std::rc::Rc;

/// An owned in-memory copy of a source file (or a `LUP`-derived line
/// range over a parent's buffer) together with a cursor.
#[derive(Debug, Clone)]
pub struct TextFile {
    /// Shared source buffer, split into lines. A derived `TextFile`
    /// shares the `Rc` with its parent instead of copying the text.
    lines: Rc<Vec<String>>,
    filename: Rc<str>,
    /// Index of the next line `next_line` will return.
    cursor: usize,
    /// One-past-the-last line this `TextFile` is allowed to yield.
    /// For a whole file this is `lines.len()`; a `LUP`-derived file
    /// stops at its recorded `--^`.
    end: usize,
    /// Line number (1-based) corresponding to `lines[0]` as seen by the
    /// user — needed so a `LUP`-derived file reports the original
    /// source's line numbers, not 1-based offsets into its own slice.
    first_line_number: u32,
}

impl TextFile {
    pub fn from_text(filename: impl Into<Rc<str>>, text: &str) -> Self {
        let lines: Vec<String> = split_source_lines(text);
        let end = lines.len();
        Self {
            lines: Rc::new(lines),
            filename: filename.into(),
            cursor: 0,
            end,
            first_line_number: 1,
        }
    }

    /// Derives a new `TextFile` sharing this one's buffer, covering the
    /// half-open line range `[start_line, end_line)` (0-based indices
    /// into the shared buffer). Used by `LUP` to re-iterate a line range
    /// without copying source text.
    pub fn derive(&self, start_line: usize, end_line: usize) -> Self {
        Self {
            lines: Rc::clone(&self.lines),
            filename: Rc::clone(&self.filename),
            cursor: start_line,
            end: end_line,
            first_line_number: start_line as u32 + 1,
        }
    }

    pub fn reset(&mut self) {
        self.cursor = self.cursor_start();
    }

    fn cursor_start(&self) -> usize {
        (self.first_line_number - 1) as usize
    }

    pub fn is_eof(&self) -> bool {
        self.cursor >= self.end
    }

    pub fn set_eof(&mut self) {
        self.cursor = self.end;
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn line_number(&self) -> u32 {
        self.first_line_number + (self.cursor - self.cursor_start()) as u32
    }

    /// Index (0-based, into the shared buffer) of the next line.
    pub fn cursor_index(&self) -> usize {
        self.cursor
    }

    pub fn next_line(&mut self) -> Option<&str> {
        if self.is_eof() {
            return None;
        }
        let line = &self.lines[self.cursor];
        self.cursor += 1;
        Some(line.as_str())
    }

    /// Peeks the text of the line the cursor currently sits on without
    /// advancing. Used by `LUP` to scan forward for `--^` before pushing
    /// the derived source.
    pub fn peek_line(&self) -> Option<&str> {
        self.lines.get(self.cursor).map(|s| s.as_str())
    }

    /// The lines this file has not yet yielded, from the cursor to its
    /// end bound. `LUP` scans this slice (without consuming it) to find
    /// its closing `--^`.
    pub fn remaining_lines(&self) -> &[String] {
        &self.lines[self.cursor..self.end]
    }

    /// Jumps the cursor directly to `idx` (an absolute index into the
    /// shared buffer). Used once `LUP` has located its `--^` line, to
    /// skip the parent file past the whole loop body in one step.
    pub fn set_cursor(&mut self, idx: usize) {
        self.cursor = idx;
    }
}

/// Splits source text into logical lines, tolerating `\n`, `\r`, `\r\n`
/// and `\n\r` endings per §6. A line is never left owning a trailing
/// terminator.
fn split_source_lines(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' | b'\r' => {
                lines.push(text[start..i].to_string());
                let first = bytes[i];
                i += 1;
                if i < bytes.len() {
                    let second = bytes[i];
                    if (first == b'\n' && second == b'\r') || (first == b'\r' && second == b'\n') {
                        i += 1;
                    }
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(text[start..].to_string());
    }
    lines
}

/// A polymorphic adapter over a `TextFile`. §3.1 replaces the original's
/// vtable struct with this tagged variant.
#[derive(Debug, Clone)]
pub enum TextSource {
    /// Thin pass-through to its `TextFile` (a `PUT`-included or the main
    /// source file).
    File { file: TextFile },
    /// `LUP …  --^`: re-iterates the inner `TextFile`'s line range `k`
    /// times before reporting EOF.
    Lup { file: TextFile, remaining: u32 },
    /// A macro expansion's pre-recorded lines (stubbed — `MAC` is parsed
    /// but never instantiated; see SPEC_FULL.md Open Question Decisions).
    MacroExpansion { lines: Rc<Vec<String>>, starting_line: u32, cursor: usize },
}

impl TextSource {
    pub fn file(file: TextFile) -> Self {
        TextSource::File { file }
    }

    pub fn lup(file: TextFile, iterations: u32) -> Self {
        TextSource::Lup { file, remaining: iterations }
    }

    pub fn filename(&self) -> &str {
        match self {
            TextSource::File { file } => file.filename(),
            TextSource::Lup { file, .. } => file.filename(),
            TextSource::MacroExpansion { .. } => "(macro)",
        }
    }

    pub fn line_number(&self) -> u32 {
        match self {
            TextSource::File { file } => file.line_number(),
            TextSource::Lup { file, .. } => file.line_number(),
            TextSource::MacroExpansion { starting_line, cursor, .. } => starting_line + *cursor as u32,
        }
    }

    /// True once this source has nothing further to yield, ever (for a
    /// `Lup`, only after its final iteration has also been exhausted).
    pub fn is_eof(&self) -> bool {
        match self {
            TextSource::File { file } => file.is_eof(),
            TextSource::Lup { file, remaining } => file.is_eof() && *remaining <= 1,
            TextSource::MacroExpansion { lines, cursor, .. } => *cursor >= lines.len(),
        }
    }

    /// Returns the next source line's text, re-spinning a `Lup`'s inner
    /// file if more iterations remain.
    pub fn next_line(&mut self) -> Option<String> {
        match self {
            TextSource::File { file } => file.next_line().map(|s| s.to_string()),
            TextSource::Lup { file, remaining } => {
                if file.is_eof() {
                    if *remaining > 1 {
                        *remaining -= 1;
                        file.reset();
                    } else {
                        return None;
                    }
                }
                file.next_line().map(|s| s.to_string())
            }
            TextSource::MacroExpansion { lines, cursor, .. } => {
                let line = lines.get(*cursor)?.clone();
                *cursor += 1;
                Some(line)
            }
        }
    }
}

/// The LIFO source stack. The assembler always attempts the top entry
/// first; on EOF it pops and retries once (§4.2). Reaching a second EOF,
/// or finding the stack empty, ends pass 1.
#[derive(Debug, Clone, Default)]
pub struct SourceStack {
    stack: Vec<TextSource>,
}

impl SourceStack {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn push(&mut self, source: TextSource) {
        self.stack.push(source);
    }

    pub fn pop(&mut self) -> Option<TextSource> {
        self.stack.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Indentation for the list file: nesting depth of the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> Option<&TextSource> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut TextSource> {
        self.stack.last_mut()
    }

    /// Pulls the next line from the stack, popping exhausted sources
    /// along the way. Returns `None` once the whole stack is drained.
    pub fn next_line(&mut self) -> Option<(String, TextSourceInfo)> {
        loop {
            let top = self.stack.last_mut()?;
            if let Some(line) = top.next_line() {
                let info = TextSourceInfo {
                    filename: top.filename().to_string(),
                    line_number: top.line_number(),
                    depth: self.stack.len(),
                };
                return Some((line, info));
            }
            if top.is_eof() {
                self.stack.pop();
                continue;
            }
            // A Lup/File reported no line without being EOF: treat as
            // exhausted too, rather than spinning.
            self.stack.pop();
        }
    }
}

/// Snapshot of "where did this line come from", attached to each
/// `LineInfo` for the list file and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSourceInfo {
    pub filename: String,
    pub line_number: u32,
    pub depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_mixed_line_endings() {
        let text = "a\nb\r\nc\rd\n\re\n";
        let lines = split_source_lines(text);
        assert_eq!(lines, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn file_source_yields_lines_in_order() {
        let file = TextFile::from_text("main.s", "one\ntwo\nthree\n");
        let mut src = TextSource::file(file);
        assert_eq!(src.next_line().as_deref(), Some("one"));
        assert_eq!(src.next_line().as_deref(), Some("two"));
        assert_eq!(src.next_line().as_deref(), Some("three"));
        assert_eq!(src.next_line(), None);
        assert!(src.is_eof());
    }

    #[test]
    fn lup_source_repeats_k_times() {
        let file = TextFile::from_text("main.s", "lda #1\nsta $10\n");
        let mut src = TextSource::lup(file, 3);
        let mut seen = Vec::new();
        while let Some(l) = src.next_line() {
            seen.push(l);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], "lda #1");
        assert_eq!(seen[4], "lda #1");
    }

    #[test]
    fn stack_pops_exhausted_sources_and_retries() {
        let mut stack = SourceStack::new();
        stack.push(TextSource::file(TextFile::from_text("outer.s", "outer1\nouter2\n")));
        stack.push(TextSource::file(TextFile::from_text("inner.s", "inner1\n")));

        let (l, info) = stack.next_line().unwrap();
        assert_eq!(l, "inner1");
        assert_eq!(info.filename, "inner.s");
        assert_eq!(info.depth, 2);

        let (l, info) = stack.next_line().unwrap();
        assert_eq!(l, "outer1");
        assert_eq!(info.filename, "outer.s");
        assert_eq!(info.depth, 1);

        let (l, _) = stack.next_line().unwrap();
        assert_eq!(l, "outer2");

        assert!(stack.next_line().is_none());
        assert!(stack.is_empty());
    }
}
