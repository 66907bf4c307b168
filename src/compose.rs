//! Structural rules for composite PDFs and conditional composition.
//!
//! The symbol table only checks that names resolve. The rules here check that
//! a node makes sense as a density: which variables it generates, that
//! product factors are independent, that mixture weights are valid, and that a
//! conditional really is conditioned on the variable its marginal generates.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::expr::Scope;
use crate::param::ParamKind;
use crate::pdf::{PdfKind, PdfNode, WeightedBranch};
use crate::symbols::SymbolTable;

/// Variables a PDF draws values for, in first-seen order.
pub fn generated_variables(symbols: &SymbolTable, pdf: &str) -> ModelResult<Vec<String>> {
    let node = symbols.pdf(pdf)?;
    node_variables(symbols, node)
}

fn node_variables(symbols: &SymbolTable, node: &PdfNode) -> ModelResult<Vec<String>> {
    let mut out = Vec::new();
    match &node.kind {
        PdfKind::Gaussian { x, .. } => push_unique(&mut out, x),
        PdfKind::Uniform { variables } => {
            for v in variables {
                push_unique(&mut out, v);
            }
        }
        PdfKind::Product { .. } | PdfKind::Sum { .. } | PdfKind::ConditionalJoint { .. } => {
            for child in node.pdf_refs() {
                for v in generated_variables(symbols, child)? {
                    push_unique(&mut out, &v);
                }
            }
        }
    }
    Ok(out)
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|v| v == name) {
        out.push(name.to_string());
    }
}

/// Returns true if `param` is `var` or is derived (transitively) from it.
pub fn parameter_reads(symbols: &SymbolTable, param: &str, var: &str) -> ModelResult<bool> {
    if param == var {
        return Ok(true);
    }
    let p = symbols.parameter(param)?;
    for dep in p.dependencies() {
        if parameter_reads(symbols, dep, var)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Returns true if drawing from `pdf` needs the value of `var` as an input,
/// i.e. some shape parameter or weight is, or derives from, `var`.
pub fn pdf_reads(symbols: &SymbolTable, pdf: &str, var: &str) -> ModelResult<bool> {
    let node = symbols.pdf(pdf)?;
    let inputs: Vec<&str> = match &node.kind {
        PdfKind::Gaussian { mean, sigma, .. } => vec![mean.as_str(), sigma.as_str()],
        PdfKind::Uniform { .. } | PdfKind::Product { .. } | PdfKind::ConditionalJoint { .. } => {
            Vec::new()
        }
        PdfKind::Sum { branches, .. } => branches.iter().map(|b| b.weight.as_str()).collect(),
    };
    for input in inputs {
        if parameter_reads(symbols, input, var)? {
            return Ok(true);
        }
    }
    for child in node.pdf_refs() {
        if pdf_reads(symbols, child, var)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Evaluates mixture weights in `scope` and appends the implicit remainder.
///
/// # Errors
/// `Composition` if an explicit weight is outside `[0, 1]` or the explicit
/// weights sum to more than 1.
pub fn mixture_weights(scope: &Scope<'_>, branches: &[WeightedBranch]) -> ModelResult<Vec<f64>> {
    let mut weights = Vec::with_capacity(branches.len() + 1);
    let mut total = 0.0;
    for branch in branches {
        let w = scope.value(&branch.weight)?;
        if !(0.0..=1.0).contains(&w) {
            return Err(ModelError::composition(format!(
                "weight '{}' = {w} is outside [0, 1]",
                branch.weight
            )));
        }
        total += w;
        weights.push(w);
    }
    // Tolerate rounding in sums like 0.1 + 0.2 + 0.7.
    if total > 1.0 + 1e-12 {
        return Err(ModelError::composition(format!(
            "explicit weights sum to {total}, which exceeds 1"
        )));
    }
    weights.push((1.0 - total).max(0.0));
    Ok(weights)
}

/// Checks the structural rules for a node whose references already resolve.
///
/// Mixture weight values are checked only when `check_values` is set; loaded
/// artifacts are checked structurally, since weights may have been moved after
/// declaration and are re-checked at draw time anyway.
pub fn validate_pdf(symbols: &SymbolTable, node: &PdfNode, check_values: bool) -> ModelResult<()> {
    match &node.kind {
        PdfKind::Gaussian { x, .. } => require_free(symbols, &node.name, x),
        PdfKind::Uniform { variables } => {
            if variables.is_empty() {
                return Err(ModelError::composition(format!(
                    "Uniform '{}' needs at least one variable",
                    node.name
                )));
            }
            let mut seen = HashSet::new();
            for v in variables {
                require_free(symbols, &node.name, v)?;
                if !seen.insert(v.as_str()) {
                    return Err(ModelError::composition(format!(
                        "Uniform '{}' lists '{v}' twice",
                        node.name
                    )));
                }
            }
            Ok(())
        }
        PdfKind::Product { factors } => {
            if factors.is_empty() {
                return Err(ModelError::composition(format!(
                    "Product '{}' needs at least one factor",
                    node.name
                )));
            }
            require_disjoint(symbols, &node.name, factors.iter().map(String::as_str))
        }
        PdfKind::Sum {
            branches,
            remainder,
        } => {
            if branches.is_empty() {
                return Err(ModelError::composition(format!(
                    "Sum '{}' needs at least two branches",
                    node.name
                )));
            }
            let expected: HashSet<String> =
                generated_variables(symbols, remainder)?.into_iter().collect();
            for branch in branches {
                let vars: HashSet<String> =
                    generated_variables(symbols, &branch.pdf)?.into_iter().collect();
                if vars != expected {
                    return Err(ModelError::composition(format!(
                        "Sum '{}': branch '{}' generates different variables than '{remainder}'",
                        node.name, branch.pdf
                    )));
                }
            }
            if check_values {
                mixture_weights(&Scope::new(symbols), branches)?;
            }
            Ok(())
        }
        PdfKind::ConditionalJoint {
            shared,
            marginal,
            conditionals,
        } => validate_conditional(symbols, &node.name, shared, marginal, conditionals),
    }
}

fn require_free(symbols: &SymbolTable, owner: &str, var: &str) -> ModelResult<()> {
    match symbols.parameter(var)?.kind {
        ParamKind::Free { .. } => Ok(()),
        ParamKind::Derived { .. } => Err(ModelError::composition(format!(
            "'{owner}' cannot generate derived parameter '{var}'"
        ))),
    }
}

fn require_disjoint<'a>(
    symbols: &SymbolTable,
    owner: &str,
    children: impl Iterator<Item = &'a str>,
) -> ModelResult<()> {
    let mut seen: HashSet<String> = HashSet::new();
    for child in children {
        for v in generated_variables(symbols, child)? {
            if !seen.insert(v.clone()) {
                return Err(ModelError::composition(format!(
                    "'{owner}': variable '{v}' is generated by more than one factor"
                )));
            }
        }
    }
    Ok(())
}

fn validate_conditional(
    symbols: &SymbolTable,
    owner: &str,
    shared: &str,
    marginal: &str,
    conditionals: &[String],
) -> ModelResult<()> {
    if conditionals.is_empty() {
        return Err(ModelError::composition(format!(
            "'{owner}' has no conditional PDF"
        )));
    }
    require_free(symbols, owner, shared)?;
    if !generated_variables(symbols, marginal)?.iter().any(|v| v == shared) {
        return Err(ModelError::composition(format!(
            "marginal '{marginal}' does not generate shared variable '{shared}'"
        )));
    }
    for conditional in conditionals {
        if generated_variables(symbols, conditional)?
            .iter()
            .any(|v| v == shared)
        {
            return Err(ModelError::composition(format!(
                "conditional '{conditional}' generates '{shared}' itself"
            )));
        }
        if !pdf_reads(symbols, conditional, shared)? {
            return Err(ModelError::composition(format!(
                "'{conditional}' is not conditioned on '{shared}': none of its parameters depend on it"
            )));
        }
    }
    require_disjoint(
        symbols,
        owner,
        std::iter::once(marginal).chain(conditionals.iter().map(String::as_str)),
    )
}

/// Builds a validated `ConditionalJoint` node `p(conditionals | shared) * p(shared)`.
///
/// # Errors
/// `Composition` unless the marginal generates `shared` and every conditional
/// reads `shared` without generating it.
pub fn conditional_joint(
    symbols: &SymbolTable,
    name: impl Into<String>,
    conditionals: Vec<String>,
    shared: impl Into<String>,
    marginal: impl Into<String>,
) -> ModelResult<PdfNode> {
    let node = PdfNode::new(
        name,
        PdfKind::ConditionalJoint {
            shared: shared.into(),
            marginal: marginal.into(),
            conditionals,
        },
    );
    for child in node.pdf_refs() {
        symbols.pdf(child)?;
    }
    validate_pdf(symbols, &node, true)?;
    debug!(name = %node.name, "composed conditional joint");
    Ok(node)
}
