//! Turns declaration trees into symbol-table nodes.

use crate::compose::{conditional_joint, generated_variables, validate_pdf};
use crate::error::{ModelError, ModelResult, SyntaxError};
use crate::expr::Formula;
use crate::param::Parameter;
use crate::pdf::{PdfKind, PdfNode, WeightedBranch};
use crate::symbols::SymbolTable;

use super::ast::{Arg, Declaration, PdfDeclKind};

/// Registers `decl` (and everything nested in it) in `symbols`.
///
/// Nodes are inserted as they are built, so callers that need all-or-nothing
/// behaviour must run this against a staged copy of the table.
pub fn build(symbols: &mut SymbolTable, decl: &Declaration) -> ModelResult<String> {
    let name = decl.name();
    // An existing name is reported as a duplicate by the insert below.
    if !symbols.contains(name) && names_itself(decl) {
        return Err(ModelError::Cycle {
            name: name.to_string(),
        });
    }
    match decl {
        Declaration::Variable {
            name,
            value,
            lower,
            upper,
            ..
        } => {
            let param = Parameter::free(name.clone(), *value, *lower, *upper)?;
            symbols.declare_parameter(param)?;
            Ok(name.clone())
        }
        Declaration::Formula {
            name,
            formula,
            dependencies,
            ..
        } => {
            let mut deps = Vec::with_capacity(dependencies.len());
            for dep in dependencies {
                deps.push(parameter_arg(symbols, dep)?);
            }
            let compiled = Formula::compile(formula.clone(), deps)?;
            symbols.declare_parameter(Parameter::derived(name.clone(), compiled))?;
            Ok(name.clone())
        }
        Declaration::Pdf {
            kind, name, args, ..
        } => {
            let node = match kind {
                PdfDeclKind::Gaussian => gaussian(symbols, name, args)?,
                PdfDeclKind::Uniform => uniform(symbols, name, args)?,
                PdfDeclKind::Sum => sum(symbols, name, args)?,
                PdfDeclKind::Product => return product(symbols, name, args),
            };
            insert_pdf(symbols, node)
        }
    }
}

/// True if any argument of `decl`, at any nesting depth, refers to the name
/// `decl` declares.
fn names_itself(decl: &Declaration) -> bool {
    let own = decl.name();
    match decl {
        Declaration::Variable { .. } => false,
        Declaration::Formula { dependencies, .. } => {
            dependencies.iter().any(|arg| arg_mentions(arg, own))
        }
        Declaration::Pdf { args, .. } => args.iter().any(|arg| arg_mentions(arg, own)),
    }
}

fn arg_mentions(arg: &Arg, target: &str) -> bool {
    match arg {
        Arg::Ref { name, .. } => name == target,
        Arg::Constant { .. } => false,
        Arg::Nested(decl) => match &**decl {
            Declaration::Variable { .. } => false,
            Declaration::Formula { dependencies, .. } => {
                dependencies.iter().any(|a| arg_mentions(a, target))
            }
            Declaration::Pdf { args, .. } => args.iter().any(|a| arg_mentions(a, target)),
        },
        Arg::Conditioned { pdf, var, .. } => var == target || arg_mentions(pdf, target),
        Arg::Weighted { weight, pdf, .. } => {
            arg_mentions(weight, target) || arg_mentions(pdf, target)
        }
    }
}

fn insert_pdf(symbols: &mut SymbolTable, node: PdfNode) -> ModelResult<String> {
    // Referential checks first so unknown names surface as such.
    if symbols.contains(&node.name) {
        return Err(ModelError::DuplicateName { name: node.name });
    }
    for p in node.parameter_refs() {
        symbols.parameter(p)?;
    }
    for child in node.pdf_refs() {
        symbols.pdf(child)?;
    }
    validate_pdf(symbols, &node, true)?;
    let name = node.name.clone();
    symbols.declare_pdf(node)?;
    Ok(name)
}

/// Resolves an argument that must name a parameter.
fn parameter_arg(symbols: &mut SymbolTable, arg: &Arg) -> ModelResult<String> {
    match arg {
        Arg::Ref { name, .. } => {
            symbols.parameter(name)?;
            Ok(name.clone())
        }
        Arg::Constant { value, text } => {
            if symbols.contains(text) {
                symbols.parameter(text)?;
            } else {
                symbols.declare_parameter(Parameter::constant(text.clone(), *value)?)?;
            }
            Ok(text.clone())
        }
        Arg::Nested(decl) => {
            let name = build(symbols, decl)?;
            symbols.parameter(&name)?;
            Ok(name)
        }
        Arg::Conditioned { offset, .. } | Arg::Weighted { offset, .. } => {
            Err(SyntaxError::Malformed {
                reason: "expected a parameter".to_string(),
                offset: *offset,
            }
            .into())
        }
    }
}

/// Resolves an argument that must name a PDF.
fn pdf_arg(symbols: &mut SymbolTable, arg: &Arg) -> ModelResult<String> {
    match arg {
        Arg::Ref { name, .. } => {
            symbols.pdf(name)?;
            Ok(name.clone())
        }
        Arg::Nested(decl) => {
            let name = build(symbols, decl)?;
            symbols.pdf(&name)?;
            Ok(name)
        }
        Arg::Constant { text, .. } => Err(ModelError::unknown(text.clone(), "pdf")),
        Arg::Conditioned { offset, .. } => Err(SyntaxError::Malformed {
            reason: "a conditioned pdf is only allowed as a product factor".to_string(),
            offset: *offset,
        }
        .into()),
        Arg::Weighted { offset, .. } => Err(SyntaxError::Malformed {
            reason: "a weighted pdf is only allowed as a sum branch".to_string(),
            offset: *offset,
        }
        .into()),
    }
}

fn arity(kind: PdfDeclKind, expected: &str, found: usize) -> ModelError {
    SyntaxError::InvalidArity {
        kind: kind.label().to_string(),
        expected: expected.to_string(),
        found,
    }
    .into()
}

fn gaussian(symbols: &mut SymbolTable, name: &str, args: &[Arg]) -> ModelResult<PdfNode> {
    let [x, mean, sigma] = args else {
        return Err(arity(PdfDeclKind::Gaussian, "3", args.len()));
    };
    let x = parameter_arg(symbols, x)?;
    let mean = parameter_arg(symbols, mean)?;
    let sigma = parameter_arg(symbols, sigma)?;
    Ok(PdfNode::new(name, PdfKind::Gaussian { x, mean, sigma }))
}

fn uniform(symbols: &mut SymbolTable, name: &str, args: &[Arg]) -> ModelResult<PdfNode> {
    if args.is_empty() {
        return Err(arity(PdfDeclKind::Uniform, "at least 1", 0));
    }
    let mut variables = Vec::with_capacity(args.len());
    for arg in args {
        variables.push(parameter_arg(symbols, arg)?);
    }
    Ok(PdfNode::new(name, PdfKind::Uniform { variables }))
}

fn sum(symbols: &mut SymbolTable, name: &str, args: &[Arg]) -> ModelResult<PdfNode> {
    let Some((last, explicit)) = args.split_last() else {
        return Err(arity(PdfDeclKind::Sum, "at least 2", 0));
    };
    if explicit.is_empty() {
        return Err(arity(PdfDeclKind::Sum, "at least 2", args.len()));
    }
    let mut branches = Vec::with_capacity(explicit.len());
    for arg in explicit {
        let Arg::Weighted { weight, pdf, .. } = arg else {
            return Err(SyntaxError::Malformed {
                reason: format!("every branch of '{name}' but the last needs a 'weight*pdf' form"),
                offset: arg_offset(arg),
            }
            .into());
        };
        let weight = parameter_arg(symbols, weight)?;
        let pdf = pdf_arg(symbols, pdf)?;
        branches.push(WeightedBranch { weight, pdf });
    }
    if let Arg::Weighted { offset, .. } = last {
        return Err(SyntaxError::Malformed {
            reason: format!("the last branch of '{name}' takes the remaining weight and must not be weighted"),
            offset: *offset,
        }
        .into());
    }
    let remainder = pdf_arg(symbols, last)?;
    Ok(PdfNode::new(
        name,
        PdfKind::Sum {
            branches,
            remainder,
        },
    ))
}

/// Builds a product. Conditioned factors (`pdf|var`) are paired with the
/// factor that generates `var` and folded into `ConditionalJoint` nodes.
fn product(symbols: &mut SymbolTable, name: &str, args: &[Arg]) -> ModelResult<String> {
    if args.is_empty() {
        return Err(arity(PdfDeclKind::Product, "at least 1", 0));
    }
    if symbols.contains(name) {
        return Err(ModelError::DuplicateName {
            name: name.to_string(),
        });
    }

    let mut plain: Vec<String> = Vec::new();
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for arg in args {
        match arg {
            Arg::Conditioned { pdf, var, .. } => {
                let pdf = pdf_arg(symbols, pdf)?;
                symbols.parameter(var)?;
                match groups.iter_mut().find(|(v, _)| v == var) {
                    Some((_, members)) => members.push(pdf),
                    None => groups.push((var.clone(), vec![pdf])),
                }
            }
            other => plain.push(pdf_arg(symbols, other)?),
        }
    }

    if groups.is_empty() {
        return insert_pdf(symbols, PdfNode::new(name, PdfKind::Product { factors: plain }));
    }

    let mut joints: Vec<(String, Vec<String>, String)> = Vec::with_capacity(groups.len());
    for (var, conditionals) in groups {
        let mut position = None;
        for (i, candidate) in plain.iter().enumerate() {
            if generated_variables(symbols, candidate)?.contains(&var) {
                position = Some(i);
                break;
            }
        }
        let Some(i) = position else {
            return Err(ModelError::composition(format!(
                "product '{name}': no factor generates '{var}' for {}",
                conditionals
                    .iter()
                    .map(|c| format!("'{c}|{var}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        };
        let marginal = plain.remove(i);
        joints.push((var, conditionals, marginal));
    }

    if joints.len() == 1 && plain.is_empty() {
        let (var, conditionals, marginal) = joints.remove(0);
        let node = conditional_joint(symbols, name, conditionals, var, marginal)?;
        let joined = node.name.clone();
        symbols.declare_pdf(node)?;
        return Ok(joined);
    }

    let mut factors = Vec::with_capacity(joints.len() + plain.len());
    for (var, conditionals, marginal) in joints {
        let joint_name = format!("{name}_{}_given_{var}", conditionals.join("_"));
        if symbols.contains(&joint_name) {
            return Err(ModelError::DuplicateName { name: joint_name });
        }
        let node = conditional_joint(symbols, joint_name.clone(), conditionals, var, marginal)?;
        symbols.declare_pdf(node)?;
        factors.push(joint_name);
    }
    factors.extend(plain);
    insert_pdf(symbols, PdfNode::new(name, PdfKind::Product { factors }))
}

fn arg_offset(arg: &Arg) -> usize {
    match arg {
        Arg::Ref { offset, .. } | Arg::Conditioned { offset, .. } | Arg::Weighted { offset, .. } => {
            *offset
        }
        Arg::Constant { .. } => 0,
        Arg::Nested(decl) => match **decl {
            Declaration::Variable { offset, .. }
            | Declaration::Formula { offset, .. }
            | Declaration::Pdf { offset, .. } => offset,
        },
    }
}
