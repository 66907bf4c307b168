//! Monte-Carlo generation of datasets from a PDF.
//!
//! Each observation walks the PDF tree once. Drawn values are kept in a
//! per-observation scope that shadows the symbol table, so parameters derived
//! from a drawn variable are evaluated at the drawn value while the table
//! itself is never written. Children are visited in declaration order; for a
//! conditional joint the marginal is always drawn before its conditionals.

mod dataset;

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compose::{generated_variables, mixture_weights};
use crate::error::{ModelError, ModelResult};
use crate::expr::Scope;
use crate::pdf::PdfKind;
use crate::symbols::SymbolTable;

pub use dataset::Dataset;

/// Sampler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Consecutive out-of-bounds Gaussian draws tolerated for one value
    /// before generation fails.
    pub max_truncation_attempts: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_truncation_attempts: 10_000,
        }
    }
}

impl SamplerConfig {
    /// Validates configuration.
    pub fn validate(&self) -> ModelResult<()> {
        if self.max_truncation_attempts == 0 {
            return Err(ModelError::InvalidConfig {
                reason: "max_truncation_attempts must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Draws `count` observations of `observables` from `pdf`.
///
/// # Errors
/// - `InvalidSampleCount` if `count` is zero
/// - `Sampler` if `pdf` is not a declared PDF, an observable is not
///   generated by it, a width is not positive, or truncation gives up
/// - `Composition` if mixture weights are invalid at draw time
pub fn generate<R: Rng + ?Sized>(
    symbols: &SymbolTable,
    pdf: &str,
    observables: &[String],
    count: usize,
    config: &SamplerConfig,
    rng: &mut R,
) -> ModelResult<Dataset> {
    if count == 0 {
        return Err(ModelError::InvalidSampleCount { count });
    }
    config.validate()?;
    if symbols.pdf(pdf).is_err() {
        return Err(ModelError::sampler(format!("'{pdf}' is not a declared pdf")));
    }
    let generated = generated_variables(symbols, pdf)?;
    for (i, obs) in observables.iter().enumerate() {
        if !generated.contains(obs) {
            return Err(ModelError::sampler(format!(
                "'{pdf}' does not generate observable '{obs}'"
            )));
        }
        if observables[..i].contains(obs) {
            return Err(ModelError::sampler(format!(
                "observable '{obs}' requested twice"
            )));
        }
    }

    let mut draw = Draw {
        symbols,
        config,
        drawn: HashMap::with_capacity(generated.len()),
        rejected: 0,
    };
    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        draw.drawn.clear();
        draw.pdf(pdf, rng)?;
        let mut row = Vec::with_capacity(observables.len());
        for obs in observables {
            let value = draw.drawn.get(obs).copied().ok_or_else(|| {
                ModelError::sampler(format!("'{obs}' was not drawn by '{pdf}'"))
            })?;
            row.push(value);
        }
        rows.push(row);
    }

    if draw.rejected > count as u64 {
        warn!(
            pdf,
            rejected = draw.rejected,
            count,
            "gaussian truncation rejected more draws than were kept"
        );
    }
    info!(pdf, count, observables = observables.len(), "generated dataset");
    Ok(Dataset::new_unchecked(
        format!("{pdf}_data"),
        observables.to_vec(),
        rows,
    ))
}

/// [`generate`] with a ChaCha8 generator seeded from `seed`.
pub fn generate_seeded(
    symbols: &SymbolTable,
    pdf: &str,
    observables: &[String],
    count: usize,
    config: &SamplerConfig,
    seed: u64,
) -> ModelResult<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    generate(symbols, pdf, observables, count, config, &mut rng)
}

struct Draw<'a> {
    symbols: &'a SymbolTable,
    config: &'a SamplerConfig,
    drawn: HashMap<String, f64>,
    rejected: u64,
}

impl Draw<'_> {
    fn scope(&self) -> Scope<'_> {
        Scope::with_overrides(self.symbols, &self.drawn)
    }

    fn bounds(&self, var: &str) -> ModelResult<(f64, f64)> {
        self.symbols
            .parameter(var)?
            .bounds()
            .map(|b| (b.lower, b.upper))
            .ok_or_else(|| ModelError::sampler(format!("'{var}' is not a free parameter")))
    }

    fn pdf<R: Rng + ?Sized>(&mut self, name: &str, rng: &mut R) -> ModelResult<()> {
        let symbols = self.symbols;
        let node = symbols.pdf(name)?;
        match &node.kind {
            PdfKind::Gaussian { x, mean, sigma } => {
                let scope = self.scope();
                let mean = scope.value(mean)?;
                let width = scope.value(sigma)?;
                if width <= 0.0 {
                    return Err(ModelError::sampler(format!(
                        "'{name}': width '{sigma}' = {width} is not positive"
                    )));
                }
                let value = self.truncated_normal(name, x, mean, width, rng)?;
                self.drawn.insert(x.clone(), value);
            }
            PdfKind::Uniform { variables } => {
                for var in variables {
                    let (lo, hi) = self.bounds(var)?;
                    let value = if lo < hi { rng.gen_range(lo..hi) } else { lo };
                    self.drawn.insert(var.clone(), value);
                }
            }
            PdfKind::Product { factors } => {
                for factor in factors {
                    self.pdf(factor, rng)?;
                }
            }
            PdfKind::Sum {
                branches,
                remainder,
            } => {
                let weights = mixture_weights(&self.scope(), branches)?;
                let u: f64 = rng.gen();
                let mut acc = 0.0;
                let mut chosen = remainder.as_str();
                for (branch, w) in branches.iter().zip(&weights) {
                    acc += w;
                    if u < acc {
                        chosen = branch.pdf.as_str();
                        break;
                    }
                }
                self.pdf(chosen, rng)?;
            }
            PdfKind::ConditionalJoint {
                marginal,
                conditionals,
                ..
            } => {
                self.pdf(marginal, rng)?;
                for conditional in conditionals {
                    self.pdf(conditional, rng)?;
                }
            }
        }
        Ok(())
    }

    fn truncated_normal<R: Rng + ?Sized>(
        &mut self,
        pdf: &str,
        x: &str,
        mean: f64,
        width: f64,
        rng: &mut R,
    ) -> ModelResult<f64> {
        let (lo, hi) = self.bounds(x)?;
        if lo == hi {
            return Ok(lo);
        }
        for _ in 0..self.config.max_truncation_attempts {
            let z: f64 = rng.sample(StandardNormal);
            let value = mean + width * z;
            if (lo..=hi).contains(&value) {
                return Ok(value);
            }
            self.rejected += 1;
        }
        Err(ModelError::sampler(format!(
            "'{pdf}': no draw of '{x}' inside [{lo}, {hi}] after {} attempts (mean {mean}, width {width})",
            self.config.max_truncation_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::declare;

    fn conditional_model() -> SymbolTable {
        let mut t = SymbolTable::new();
        for line in [
            "Gaussian::g1(x[-5,5],m1[-1,-3,3],res[1,0.1,2])",
            "Uniform::p_res(res)",
            "PROD::joint(g1|res,p_res)",
        ] {
            declare(&mut t, line).unwrap();
        }
        t
    }

    fn obs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_conditional_generation() {
        let t = conditional_model();
        let d = generate_seeded(&t, "joint", &obs(&["x", "res"]), 2000, &SamplerConfig::default(), 7)
            .unwrap();
        assert_eq!(d.len(), 2000);
        for row in d.iter() {
            assert!(row[0].is_finite() && (-5.0..=5.0).contains(&row[0]));
            assert!((0.1..=2.0).contains(&row[1]));
        }
    }

    #[test]
    fn test_table_untouched() {
        let t = conditional_model();
        let before = t.clone();
        generate_seeded(&t, "joint", &obs(&["x"]), 50, &SamplerConfig::default(), 1).unwrap();
        assert_eq!(t, before);
    }

    #[test]
    fn test_zero_count() {
        let t = conditional_model();
        let err = generate_seeded(&t, "joint", &obs(&["x"]), 0, &SamplerConfig::default(), 1)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidSampleCount { count: 0 }));
    }

    #[test]
    fn test_unknown_pdf_and_observable() {
        let t = conditional_model();
        let cfg = SamplerConfig::default();
        assert!(matches!(
            generate_seeded(&t, "nope", &obs(&["x"]), 5, &cfg, 1),
            Err(ModelError::Sampler { .. })
        ));
        assert!(matches!(
            generate_seeded(&t, "g1", &obs(&["res"]), 5, &cfg, 1),
            Err(ModelError::Sampler { .. })
        ));
    }

    #[test]
    fn test_seed_determinism() {
        let t = conditional_model();
        let cfg = SamplerConfig::default();
        let a = generate_seeded(&t, "joint", &obs(&["x", "res"]), 100, &cfg, 42).unwrap();
        let b = generate_seeded(&t, "joint", &obs(&["x", "res"]), 100, &cfg, 42).unwrap();
        let c = generate_seeded(&t, "joint", &obs(&["x", "res"]), 100, &cfg, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_truncation_gives_up() {
        let mut t = SymbolTable::new();
        declare(&mut t, "Gaussian::far(x[0,1],m[100,-200,200],w[0.01,0.001,1])").unwrap();
        let cfg = SamplerConfig {
            max_truncation_attempts: 20,
        };
        assert!(matches!(
            generate_seeded(&t, "far", &obs(&["x"]), 1, &cfg, 3),
            Err(ModelError::Sampler { .. })
        ));
    }

    #[test]
    fn test_non_positive_width() {
        let mut t = SymbolTable::new();
        declare(&mut t, "Gaussian::g(x[-1,1],m[0,-1,1],w[0,-1,1])").unwrap();
        let err = generate_seeded(&t, "g", &obs(&["x"]), 1, &SamplerConfig::default(), 3)
            .unwrap_err();
        assert!(matches!(err, ModelError::Sampler { .. }));
    }

    #[test]
    fn test_config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        let cfg = SamplerConfig {
            max_truncation_attempts: 0,
        };
        assert!(matches!(cfg.validate(), Err(ModelError::InvalidConfig { .. })));
    }
}
