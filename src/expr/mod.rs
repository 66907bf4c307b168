//! Expression engine for derived parameters.
//!
//! A [`Formula`] is compiled once, when its parameter is declared: the text is
//! parsed and every identifier is bound to a slot in the dependency list.
//! Evaluation is pull-based. Nothing is cached, so a derived value always
//! reflects the current values of the parameters it reads.

mod eval;
mod parser;

pub use eval::{evaluate, Scope};
pub use parser::{BinaryOp, Expr, Function};

use serde::{Deserialize, Serialize};

use crate::error::{FormulaError, ModelResult};

/// A compiled arithmetic formula over named dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FormulaRepr", into = "FormulaRepr")]
pub struct Formula {
    source: String,
    dependencies: Vec<String>,
    expr: Expr,
}

/// Serialized form: only the text and dependency list are stored, the tree is
/// rebuilt (and re-validated) on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormulaRepr {
    source: String,
    dependencies: Vec<String>,
}

impl TryFrom<FormulaRepr> for Formula {
    type Error = FormulaError;

    fn try_from(repr: FormulaRepr) -> Result<Self, Self::Error> {
        Self::compile(repr.source, repr.dependencies)
    }
}

impl From<Formula> for FormulaRepr {
    fn from(formula: Formula) -> Self {
        Self {
            source: formula.source,
            dependencies: formula.dependencies,
        }
    }
}

impl Formula {
    /// Parses `source` and binds identifiers to `dependencies`.
    ///
    /// Identifiers must appear in the dependency list; `@N` refers to the
    /// N-th dependency.
    pub fn compile(
        source: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<Self, FormulaError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(FormulaError::Empty);
        }
        let expr = parser::parse(&source, &dependencies)?;
        Ok(Self {
            source,
            dependencies,
            expr,
        })
    }

    /// The formula text as declared.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the parameters this formula reads, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The compiled expression tree.
    #[must_use]
    pub const fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluates the formula, pulling each dependency value through `lookup`.
    pub fn eval_with<F>(&self, mut lookup: F) -> ModelResult<f64>
    where
        F: FnMut(&str) -> ModelResult<f64>,
    {
        let mut slots = Vec::with_capacity(self.dependencies.len());
        for dep in &self.dependencies {
            slots.push(lookup(dep)?);
        }
        let value = self.expr.eval(&slots);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(FormulaError::NonFinite {
                formula: self.source.clone(),
            }
            .into())
        }
    }
}
