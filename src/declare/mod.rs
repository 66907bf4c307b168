//! The factory language.
//!
//! A declaration is one line of text that creates one named object, along with
//! any inline declarations nested in its arguments:
//!
//! ```text
//! x[-5,5]                                  free variable, value at the midpoint
//! m[-1,-3,3]                               free variable with explicit value
//! expr::r('1.5*res',{res})                 derived parameter
//! Gaussian::g(x,m,res)                     Gaussian in x
//! Uniform::u(res)                          flat density
//! PROD::c(g|res,u)                         g conditioned on res, times u
//! SUM::s(f[0.3,0,1]*g1,g2)                 mixture, last branch takes 1 - f
//! ```

mod ast;
mod builder;
mod parser;
mod token;

use tracing::debug;

use crate::error::ModelResult;
use crate::symbols::SymbolTable;

pub use ast::{Arg, Declaration, PdfDeclKind};
pub use parser::parse_declaration;
pub use token::{tokenize, Spanned, Token};

/// Parses `text` and registers everything it declares in `symbols`.
///
/// Returns the name of the top-level object. On any error `symbols` is left
/// exactly as it was, including for nested declarations that succeeded before
/// the failure.
pub fn declare(symbols: &mut SymbolTable, text: &str) -> ModelResult<String> {
    let decl = parse_declaration(text)?;
    let mut staged = symbols.clone();
    let before = staged.len();
    let name = builder::build(&mut staged, &decl)?;
    debug!(name = %name, added = staged.len() - before, "applied declaration");
    *symbols = staged;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, SyntaxError};
    use crate::expr::evaluate;
    use crate::pdf::PdfKind;

    fn punzi() -> SymbolTable {
        let mut t = SymbolTable::new();
        for line in [
            "Gaussian::g1(x[-5,5],m1[-1,-3,3],res[1,0.1,2])",
            "Gaussian::g2(x,m2[1,-3,3],expr::resm('1.5*res',{res}))",
            "Uniform::p_res(res)",
            "SUM::model(f[0.3,0,1]*PROD::cat1(g1|res,p_res),PROD::cat2(g2|res,p_res))",
        ] {
            declare(&mut t, line).unwrap();
        }
        t
    }

    #[test]
    fn test_variable_midpoint() {
        let mut t = SymbolTable::new();
        assert_eq!(declare(&mut t, "x[-5,5]").unwrap(), "x");
        assert_eq!(t.parameter("x").unwrap().value(), Some(0.0));
    }

    #[test]
    fn test_full_model_builds() {
        let t = punzi();
        for name in ["x", "m1", "m2", "res", "resm", "f", "g1", "g2", "p_res", "cat1", "cat2", "model"] {
            assert!(t.contains(name), "missing {name}");
        }
        assert!((evaluate(&t, "resm").unwrap() - 1.5).abs() < 1e-12);
        match &t.pdf("cat1").unwrap().kind {
            PdfKind::ConditionalJoint {
                shared,
                marginal,
                conditionals,
            } => {
                assert_eq!(shared, "res");
                assert_eq!(marginal, "p_res");
                assert_eq!(conditionals, &vec!["g1".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &t.pdf("model").unwrap().kind {
            PdfKind::Sum {
                branches,
                remainder,
            } => {
                assert_eq!(branches.len(), 1);
                assert_eq!(branches[0].weight, "f");
                assert_eq!(branches[0].pdf, "cat1");
                assert_eq!(remainder, "cat2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_product_with_extra_factor_synthesizes_joint() {
        let mut t = punzi();
        declare(&mut t, "Uniform::flat_y(y[0,1])").unwrap();
        declare(&mut t, "PROD::joint(g1|res,p_res,flat_y)").unwrap();
        assert!(t.contains("joint_g1_given_res"));
        match &t.pdf("joint").unwrap().kind {
            PdfKind::Product { factors } => {
                assert_eq!(factors, &vec!["joint_g1_given_res".to_string(), "flat_y".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_plain_product() {
        let mut t = punzi();
        declare(&mut t, "PROD::indep(g1,p_res)").unwrap();
        assert!(matches!(
            t.pdf("indep").unwrap().kind,
            PdfKind::Product { .. }
        ));
    }

    #[test]
    fn test_failed_declaration_is_atomic() {
        let mut t = SymbolTable::new();
        let err = declare(&mut t, "Gaussian::g(x[-5,5],m[0,-1,1],nope)").unwrap_err();
        assert!(matches!(err, ModelError::UnknownReference { .. }));
        assert!(t.is_empty());
    }

    #[test]
    fn test_duplicate_name() {
        let mut t = punzi();
        let before = t.len();
        assert!(matches!(
            declare(&mut t, "x[0,1]"),
            Err(ModelError::DuplicateName { .. })
        ));
        assert_eq!(t.len(), before);
    }

    #[test]
    fn test_gaussian_arity() {
        let mut t = SymbolTable::new();
        let err = declare(&mut t, "Gaussian::g(x[-5,5],m[0,-1,1])").unwrap_err();
        assert!(matches!(
            err,
            ModelError::Syntax(SyntaxError::InvalidArity { found: 2, .. })
        ));
    }

    #[test]
    fn test_sum_requires_weights_on_leading_branches() {
        let mut t = punzi();
        let err = declare(&mut t, "SUM::s(cat1,cat2)").unwrap_err();
        assert!(matches!(err, ModelError::Syntax(SyntaxError::Malformed { .. })));
        let err = declare(&mut t, "SUM::s(f*cat1,f*cat2)").unwrap_err();
        assert!(matches!(err, ModelError::Syntax(SyntaxError::Malformed { .. })));
    }

    #[test]
    fn test_sum_weight_out_of_range() {
        let mut t = punzi();
        let err = declare(&mut t, "SUM::s(1.5*cat1,cat2)").unwrap_err();
        assert!(matches!(err, ModelError::Composition { .. }));
        assert!(!t.contains("1.5"));
    }

    #[test]
    fn test_numeric_constant_is_reused() {
        let mut t = punzi();
        declare(&mut t, "Gaussian::ga(x,0,1)").unwrap();
        declare(&mut t, "Gaussian::gb(x,0,1)").unwrap();
        let p = t.parameter("1").unwrap();
        assert_eq!(p.value(), Some(1.0));
        assert_eq!(t.pdfs().filter(|p| p.name == "ga" || p.name == "gb").count(), 2);
    }

    #[test]
    fn test_condition_without_marginal() {
        let mut t = punzi();
        let err = declare(&mut t, "PROD::bad(g1|res)").unwrap_err();
        assert!(matches!(err, ModelError::Composition { .. }));
    }

    #[test]
    fn test_conditioned_outside_product() {
        let mut t = punzi();
        let err = declare(&mut t, "SUM::bad(f*g1|res,g2)").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_formula_unknown_identifier() {
        let mut t = SymbolTable::new();
        declare(&mut t, "a[1,0,2]").unwrap();
        let err = declare(&mut t, "expr::b('a*c',{a})").unwrap_err();
        assert!(matches!(err, ModelError::Formula(_)));
        assert!(!t.contains("b"));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut t = SymbolTable::new();
        declare(&mut t, "Uniform::u(a[0,1])").unwrap();
        for line in [
            "expr::b('2*b',{b})",
            "PROD::p(p,u)",
            "SUM::s(a*s,u)",
            "PROD::q(PROD::inner(q,u),u)",
        ] {
            let err = declare(&mut t, line).unwrap_err();
            assert!(matches!(err, ModelError::Cycle { .. }), "{line}: {err:?}");
        }
        assert_eq!(t.len(), 2);

        // A taken name stays a duplicate.
        let err = declare(&mut t, "PROD::u(u)").unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { .. }));
    }
}
