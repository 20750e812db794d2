//! Shared error types for the assembler and disk-image builder.
//!
//! Both halves of this crate follow the same two-level policy: a
//! diagnostic is recorded (with enough context to reproduce the
//! original tool's message) and processing continues. Nothing in here
//! ever panics or aborts a pass; `AsmError`/`DiskImageError` values
//! accumulate in a `Vec` on the orchestrator and are only inspected at
//! the end of a pass.

use std::fmt;

/// A half-open span of bytes (plus the 1-based line/col it starts at)
/// within a single source line's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const fn new(start: usize, end: usize, line: u32, col: u32) -> Self {
        Self { start, end, line, col }
    }

    /// A span with no useful byte offsets, only a line number — used for
    /// whole-program diagnostics (missing `END`, unclosed `DO`, ...).
    pub const fn whole_line(line: u32) -> Self {
        Self { start: 0, end: 0, line, col: 1 }
    }
}

/// Severity of a recorded diagnostic. Warnings do not suppress the
/// queued-file drain at the end of assembly; errors do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Tagged-sum error kind for the assembler core (components 1-9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    // Resource
    #[error("out of memory")]
    OutOfMemory,
    #[error("file open failure")]
    FileOpen,
    #[error("file I/O failure")]
    FileGeneric,
    #[error("buffer overrun")]
    BufferOverrun,

    // Syntax
    #[error("invalid hex digit")]
    InvalidHexDigit,
    #[error("invalid binary digit")]
    InvalidBinaryDigit,
    #[error("invalid decimal digit")]
    InvalidDecimalDigit,
    #[error("missing operand")]
    MissingOperand,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid argument count")]
    InvalidArgumentCount,
    #[error("invalid index register")]
    InvalidIndexRegister,

    // Semantic
    #[error("symbol already defined")]
    DuplicateLabel,
    #[error("symbol undefined")]
    UndefinedLabel,
    #[error("local label not allowed before first global label")]
    LocalLabelBeforeGlobal,
    #[error("forward reference not allowed here")]
    ForwardReferenceDisallowed,
    #[error("couldn't infer size of forward reference")]
    ForwardReferenceSizeMismatch,
    #[error("relative branch offset out of range")]
    OffsetOutOfRange,
    #[error("ORG required before first instruction")]
    MissingOrg,
    #[error("duplicate ELSE for this DO")]
    DuplicateElse,
    #[error("ELSE without matching DO")]
    ElseWithoutDo,
    #[error("FIN without matching DO")]
    FinWithoutDo,
    #[error("missing FIN at end of source")]
    MissingFin,
    #[error("DEND without matching DUM")]
    DendWithoutDum,
    #[error("LUP count must be in 1..=32768")]
    InvalidLupCount,
    #[error("--^ without matching LUP")]
    LupEndWithoutLup,
    #[error("address overflow")]
    AddressOverflow,

    // Internal control, never surfaced as a user diagnostic.
    #[error("encountered comment")]
    EncounteredComment,
}

/// A single recorded assembler diagnostic.
#[derive(Debug, Clone)]
pub struct AsmError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub severity: Severity,
}

impl AsmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self { kind, message: message.into(), span, severity: Severity::Error }
    }

    pub fn warning(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self { kind, message: message.into(), span, severity: Severity::Warning }
    }

    pub fn duplicate_label(label: &str, first_defined_line: u32, span: Span) -> Self {
        Self::new(
            ErrorKind::DuplicateLabel,
            format!("'{label}' symbol already defined on line {first_defined_line}."),
            span,
        )
    }

    pub fn undefined_label(label: &str, span: Span) -> Self {
        Self::new(ErrorKind::UndefinedLabel, format!("'{label}' symbol undefined."), span)
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span.line, self.severity, self.message)
    }
}

/// Tagged-sum error kind for the disk-image builder (components 10-12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DiskErrorKind {
    #[error("invalid source offset")]
    InvalidSourceOffset,
    #[error("invalid length")]
    InvalidLength,
    #[error("invalid side")]
    InvalidSide,
    #[error("invalid track")]
    InvalidTrack,
    #[error("invalid sector")]
    InvalidSector,
    #[error("invalid intra block offset")]
    InvalidIntraBlockOffset,
    #[error("invalid intra track offset")]
    InvalidIntraTrackOffset,
    #[error("write exceeds image bounds")]
    BlockExceedsImageBounds,
    #[error("invalid insertion type")]
    InvalidInsertionType,
    #[error("failed to open object file")]
    FileOpen,
    #[error("failed to process object file")]
    FileGeneric,
    #[error("bad track during RW18 read-back")]
    BadTrack,
}

#[derive(Debug, Clone)]
pub struct DiskImageError {
    pub kind: DiskErrorKind,
    pub message: String,
}

impl DiskImageError {
    pub fn new(kind: DiskErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for DiskImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DiskImageError {}
