//! Pull-based evaluation of parameter values.

use std::collections::HashMap;

use crate::error::ModelResult;
use crate::param::ParamKind;
use crate::symbols::SymbolTable;

/// A read-only view of parameter values.
///
/// Values come from the symbol table, optionally shadowed by per-observation
/// overrides. The sampler uses overrides to evaluate dependent parameters at
/// a freshly drawn value of a shared variable without touching the table.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    symbols: &'a SymbolTable,
    overrides: Option<&'a HashMap<String, f64>>,
}

impl<'a> Scope<'a> {
    /// Scope over current table values.
    #[must_use]
    pub const fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            overrides: None,
        }
    }

    /// Scope where `overrides` shadow table values.
    #[must_use]
    pub const fn with_overrides(
        symbols: &'a SymbolTable,
        overrides: &'a HashMap<String, f64>,
    ) -> Self {
        Self {
            symbols,
            overrides: Some(overrides),
        }
    }

    /// Current value of a parameter. Derived parameters are recomputed from
    /// their dependencies on every call.
    pub fn value(&self, name: &str) -> ModelResult<f64> {
        if let Some(v) = self.overrides.and_then(|o| o.get(name)) {
            return Ok(*v);
        }
        let param = self.symbols.parameter(name)?;
        match &param.kind {
            ParamKind::Free { value, .. } => Ok(*value),
            ParamKind::Derived { formula } => formula.eval_with(|dep| self.value(dep)),
        }
    }
}

/// Evaluates a parameter against current table values.
pub fn evaluate(symbols: &SymbolTable, name: &str) -> ModelResult<f64> {
    Scope::new(symbols).value(name)
}
