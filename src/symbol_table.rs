//! Symbol table (§4.4): a hashed map from `(global_key, local_key)` to
//! `Symbol`, with a per-symbol list of unresolved line references.
//!
//! §4.4.1 resolves this component's one deliberate divergence from a
//! literal container translation: an LC-3 assembler's symbol table can
//! get away with an intentional linear `Vec` thanks to its small label
//! counts. 6502 sources routinely pull in hundreds of labels through
//! `PUT` includes, so the O(n) scan is the wrong tradeoff here; this
//! type wraps a `HashMap` instead while keeping the same `SymbolTable`
//! name and call-site shape.

use std::collections::HashMap;

use crate::expression::{Expression, ExprType, LabelLookup, LabelResolver};
use crate::ids::{LineId, SymbolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Global,
    Local,
    Variable,
}

/// Classifies a label name by its leading byte: `:` → local, `]` →
/// variable, anything else → global.
pub fn classify(name: &str) -> LabelKind {
    match name.as_bytes().first() {
        Some(b':') => LabelKind::Local,
        Some(b']') => LabelKind::Variable,
        _ => LabelKind::Global,
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub global_key: String,
    pub local_key: String,
    pub expression: Expression,
    pub defining_line: Option<LineId>,
    pub pending_references: Vec<LineId>,
    pub is_variable: bool,
}

impl Symbol {
    pub fn is_defined(&self) -> bool {
        self.defining_line.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    index: HashMap<(String, String), SymbolId>,
    symbols: Vec<Symbol>,
}

pub enum DefineOutcome {
    /// First definition (or a permitted variable redefinition); carries
    /// the pending references that must now be re-assembled.
    Defined { id: SymbolId, pending: Vec<LineId> },
    /// Redefining a non-variable symbol that already has a
    /// `defining_line` on a *different* line — a "symbol already
    /// defined" error (§4.4). The original `defining_line`'s source
    /// line number is included for the diagnostic.
    DuplicateLabel { first_defined_line: LineId },
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_for(global_label: &str, name: &str) -> (LabelKind, String, String) {
        match classify(name) {
            LabelKind::Local => (LabelKind::Local, global_label.to_string(), name.to_string()),
            LabelKind::Variable => (LabelKind::Variable, name.to_string(), String::new()),
            LabelKind::Global => (LabelKind::Global, name.to_string(), String::new()),
        }
    }

    /// Seeds `]0`/`]1`/`]2` as defined, value-0 variables (§4.8.1,
    /// `initParameterVariablesTo0`).
    pub fn seed_parameter_variables(&mut self) {
        for n in 0..3 {
            let name = format!("]{n}");
            let (_, global, local) = Self::key_for("", &name);
            let id = SymbolId(self.symbols.len() as u32);
            self.symbols.push(Symbol {
                global_key: global.clone(),
                local_key: local.clone(),
                expression: Expression { value: 0, ty: ExprType::Absolute, forward_reference: false },
                defining_line: Some(LineId(u32::MAX)),
                pending_references: Vec::new(),
                is_variable: true,
            });
            self.index.insert((global, local), id);
        }
    }

    pub fn find(&self, global_label: &str, name: &str) -> Option<SymbolId> {
        let (_, global, local) = Self::key_for(global_label, name);
        self.index.get(&(global, local)).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// Looks up `name`, creating an undefined placeholder symbol and
    /// recording `referencing_line` as a pending reference if it does
    /// not exist yet or is not yet defined. Returns the symbol id and
    /// whether it is currently defined.
    pub fn find_or_create(&mut self, global_label: &str, name: &str, referencing_line: LineId) -> SymbolId {
        let (kind, global, local) = Self::key_for(global_label, name);
        if let Some(&id) = self.index.get(&(global.clone(), local.clone())) {
            let sym = &mut self.symbols[id.0 as usize];
            if !sym.is_defined() && !sym.pending_references.contains(&referencing_line) {
                sym.pending_references.push(referencing_line);
            }
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            global_key: global.clone(),
            local_key: local.clone(),
            expression: Expression { value: 0, ty: ExprType::Absolute, forward_reference: true },
            defining_line: None,
            pending_references: vec![referencing_line],
            is_variable: matches!(kind, LabelKind::Variable),
        });
        self.index.insert((global, local), id);
        id
    }

    /// Defines (or variable-redefines) `name` at `defining_line` with
    /// `expression`. Drains and returns the pending-reference list so
    /// the caller can re-assemble each one (§4.8's forward-reference
    /// resolution); the list is left empty on the stored `Symbol`.
    pub fn define(
        &mut self,
        global_label: &str,
        name: &str,
        expression: Expression,
        defining_line: LineId,
    ) -> DefineOutcome {
        let (kind, global, local) = Self::key_for(global_label, name);
        let is_variable = matches!(kind, LabelKind::Variable);

        if let Some(&id) = self.index.get(&(global.clone(), local.clone())) {
            let sym = &mut self.symbols[id.0 as usize];
            if sym.is_defined() && !is_variable && sym.defining_line != Some(defining_line) {
                return DefineOutcome::DuplicateLabel { first_defined_line: sym.defining_line.unwrap() };
            }
            sym.expression = expression;
            sym.defining_line = Some(defining_line);
            let pending = std::mem::take(&mut sym.pending_references);
            return DefineOutcome::Defined { id, pending };
        }

        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            global_key: global.clone(),
            local_key: local.clone(),
            expression,
            defining_line: Some(defining_line),
            pending_references: Vec::new(),
            is_variable,
        });
        self.index.insert((global, local), id);
        DefineOutcome::Defined { id, pending: Vec::new() }
    }

    pub fn iter_undefined(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| !s.is_defined())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Bridges the symbol table into the expression evaluator's
/// [`LabelResolver`] trait for a single evaluation pass, tracking
/// forward references against `referencing_line`.
pub struct TableResolver<'a> {
    pub table: &'a mut SymbolTable,
    pub global_label: &'a str,
    pub referencing_line: LineId,
}

impl<'a> LabelResolver for TableResolver<'a> {
    fn resolve(&mut self, name: &str) -> LabelLookup {
        let id = self.table.find_or_create(self.global_label, name, self.referencing_line);
        let sym = self.table.get(id);
        if sym.is_defined() {
            LabelLookup::Defined(sym.expression)
        } else {
            LabelLookup::Undefined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::evaluate;
    use crate::error::Span;

    #[test]
    fn global_then_local_resolves_under_parent() {
        let mut table = SymbolTable::new();
        let outcome = table.define("", "entry", Expression::absolute(0x8000), LineId(0));
        assert!(matches!(outcome, DefineOutcome::Defined { .. }));
        let outcome = table.define("entry", ":loop", Expression::absolute(0x8003), LineId(1));
        assert!(matches!(outcome, DefineOutcome::Defined { .. }));
        assert!(table.find("entry", ":loop").is_some());
        assert!(table.find("other", ":loop").is_none());
    }

    #[test]
    fn duplicate_global_label_is_rejected() {
        let mut table = SymbolTable::new();
        table.define("", "entry", Expression::absolute(0x8000), LineId(0));
        let outcome = table.define("", "entry", Expression::absolute(0x9000), LineId(1));
        match outcome {
            DefineOutcome::DuplicateLabel { first_defined_line } => assert_eq!(first_defined_line, LineId(0)),
            _ => panic!("expected duplicate"),
        }
    }

    #[test]
    fn variable_label_may_be_redefined_freely() {
        let mut table = SymbolTable::new();
        table.define("", "]0", Expression::absolute(1), LineId(0));
        let outcome = table.define("", "]0", Expression::absolute(2), LineId(5));
        assert!(matches!(outcome, DefineOutcome::Defined { .. }));
    }

    #[test]
    fn forward_reference_then_define_drains_pending() {
        let mut table = SymbolTable::new();
        let mut resolver =
            TableResolver { table: &mut table, global_label: "", referencing_line: LineId(0) };
        let (expr, _) = evaluate("entry", 0, &mut resolver, Span::whole_line(1)).unwrap();
        assert!(expr.forward_reference);

        let outcome = table.define("", "entry", Expression::absolute(0x8000), LineId(3));
        match outcome {
            DefineOutcome::Defined { pending, .. } => assert_eq!(pending, vec![LineId(0)]),
            _ => panic!("expected defined"),
        }
        assert!(table.iter_undefined().next().is_none());
    }
}
