//! # mos65
//!
//! A two-pass cross-assembler for the MOS 6502, WDC 65C02, and WDC 65816
//! instruction sets, paired with an Apple II disk-image builder (5.25″
//! nibble `NIB` and 3.5″ block `2MG`/`HDV`).
//!
//! ## Pipeline
//!
//! Assembly runs as a single [`assembler::Assembler`] pass that still
//! behaves like two passes: each line is parsed, classified, and encoded
//! as it is seen, and any operand that names a label not yet defined is
//! recorded against that label and re-encoded the moment the label's
//! value becomes known.
//!
//! 1. [`line_parser`] splits one source line into label/operator/operands.
//! 2. [`expression`] evaluates operand text against the [`symbol_table`]
//!    into a typed, possibly forward-referencing value.
//! 3. [`addressing_mode`] classifies the operand shape.
//! 4. [`opcode_table`] looks up the mnemonic's encoding for that mode.
//! 5. [`assembler::encode`] renders the final bytes into the
//!    [`binary_buffer::BinaryBuffer`].
//!
//! The disk-image builder in [`disk_image`] is a separate consumer of
//! `SAV` artifacts: [`disk_image::script`] drives a CSV script of insert
//! requests into either [`disk_image::nibble`] or [`disk_image::block`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use mos65::assembler::Assembler;
//!
//! let source = std::fs::read_to_string("program.s").unwrap();
//! let mut assembler = Assembler::new();
//! assembler.assemble("program.s", &source);
//! if assembler.error_count() == 0 {
//!     assembler.write_queued_files().unwrap();
//! }
//! ```

pub mod addressing_mode;
pub mod assembler;
pub mod binary_buffer;
pub mod disk_image;
pub mod error;
pub mod expression;
pub mod ids;
pub mod line_parser;
pub mod list_file;
pub mod opcode_table;
pub mod sized_string;
pub mod symbol_table;
pub mod text_source;

pub use assembler::Assembler;
pub use error::{AsmError, DiskImageError};
