//! Parameters: the numeric leaves of a model graph.
//!
//! A parameter is either free (a value inside inclusive bounds) or derived
//! (a formula over other parameters, evaluated on demand).

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::expr::Formula;

/// Inclusive value bounds of a free parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lower bound (inclusive).
    pub lower: f64,
    /// Upper bound (inclusive).
    pub upper: f64,
}

impl Bounds {
    /// Creates bounds, rejecting `lower > upper` and non-finite limits.
    pub fn new(name: &str, lower: f64, upper: f64) -> ModelResult<Self> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(ModelError::InvalidRange {
                name: name.to_string(),
                lower,
                upper,
            });
        }
        Ok(Self { lower, upper })
    }

    /// Returns true if `value` lies within the bounds.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }

    /// Clamps `value` into the bounds.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    /// Returns the midpoint.
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    /// Returns true if lower and upper coincide.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.lower == self.upper
    }
}

/// Kind-specific parameter state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    /// Independently settable value.
    Free {
        /// Current value.
        value: f64,
        /// Value bounds.
        bounds: Bounds,
    },
    /// Value computed from other parameters.
    Derived {
        /// Compiled formula, including its dependency list.
        formula: Formula,
    },
}

/// A named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique name.
    pub name: String,
    /// Free or derived state.
    pub kind: ParamKind,
}

impl Parameter {
    /// Creates a free parameter, enforcing `lower <= value <= upper`.
    pub fn free(name: impl Into<String>, value: f64, lower: f64, upper: f64) -> ModelResult<Self> {
        let name = name.into();
        let bounds = Bounds::new(&name, lower, upper)?;
        if !value.is_finite() || !bounds.contains(value) {
            return Err(ModelError::BoundsViolation {
                name,
                value,
                lower,
                upper,
            });
        }
        Ok(Self {
            name,
            kind: ParamKind::Free { value, bounds },
        })
    }

    /// Creates a constant: a free parameter whose bounds pin its value.
    pub fn constant(name: impl Into<String>, value: f64) -> ModelResult<Self> {
        Self::free(name, value, value, value)
    }

    /// Creates a derived parameter from a compiled formula.
    #[must_use]
    pub fn derived(name: impl Into<String>, formula: Formula) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Derived { formula },
        }
    }

    /// Returns true for free parameters.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self.kind, ParamKind::Free { .. })
    }

    /// Returns true for derived parameters.
    #[must_use]
    pub const fn is_derived(&self) -> bool {
        matches!(self.kind, ParamKind::Derived { .. })
    }

    /// Stored value of a free parameter. Derived parameters have none;
    /// evaluate them through [`crate::expr::evaluate`].
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        match &self.kind {
            ParamKind::Free { value, .. } => Some(*value),
            ParamKind::Derived { .. } => None,
        }
    }

    /// Bounds of a free parameter.
    #[must_use]
    pub const fn bounds(&self) -> Option<Bounds> {
        match &self.kind {
            ParamKind::Free { bounds, .. } => Some(*bounds),
            ParamKind::Derived { .. } => None,
        }
    }

    /// Formula of a derived parameter.
    #[must_use]
    pub const fn formula(&self) -> Option<&Formula> {
        match &self.kind {
            ParamKind::Free { .. } => None,
            ParamKind::Derived { formula } => Some(formula),
        }
    }

    /// Names this parameter depends on (empty for free parameters).
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        match &self.kind {
            ParamKind::Free { .. } => &[],
            ParamKind::Derived { formula } => formula.dependencies(),
        }
    }

    /// Sets the value of a free parameter, checking bounds.
    pub fn set_value(&mut self, new_value: f64) -> ModelResult<()> {
        match &mut self.kind {
            ParamKind::Free { value, bounds } => {
                if !new_value.is_finite() || !bounds.contains(new_value) {
                    return Err(ModelError::BoundsViolation {
                        name: self.name.clone(),
                        value: new_value,
                        lower: bounds.lower,
                        upper: bounds.upper,
                    });
                }
                *value = new_value;
                Ok(())
            }
            ParamKind::Derived { .. } => Err(ModelError::ReadOnlyParameter {
                name: self.name.clone(),
            }),
        }
    }

    /// Replaces the bounds of a free parameter, clamping the current value
    /// into the new range.
    pub fn set_range(&mut self, lower: f64, upper: f64) -> ModelResult<()> {
        let new_bounds = Bounds::new(&self.name, lower, upper)?;
        match &mut self.kind {
            ParamKind::Free { value, bounds } => {
                *bounds = new_bounds;
                *value = new_bounds.clamp(*value);
                Ok(())
            }
            ParamKind::Derived { .. } => Err(ModelError::ReadOnlyParameter {
                name: self.name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_parameter_within_bounds() {
        let p = Parameter::free("m1", -1.0, -3.0, 3.0).unwrap();
        assert!(p.is_free());
        assert_eq!(p.value(), Some(-1.0));
        let b = p.bounds().unwrap();
        assert!(b.lower <= -1.0 && -1.0 <= b.upper);
    }

    #[test]
    fn test_free_parameter_rejects_out_of_bounds() {
        let err = Parameter::free("m1", 4.0, -3.0, 3.0).unwrap_err();
        assert!(matches!(err, ModelError::BoundsViolation { .. }));
    }

    #[test]
    fn test_free_parameter_rejects_inverted_range() {
        let err = Parameter::free("x", 0.0, 5.0, -5.0).unwrap_err();
        assert!(matches!(err, ModelError::InvalidRange { .. }));
    }

    #[test]
    fn test_constant_is_degenerate() {
        let c = Parameter::constant("0.5", 0.5).unwrap();
        assert!(c.bounds().unwrap().is_degenerate());
    }

    #[test]
    fn test_set_value_checks_bounds() {
        let mut p = Parameter::free("f", 0.3, 0.0, 1.0).unwrap();
        p.set_value(0.9).unwrap();
        assert_eq!(p.value(), Some(0.9));
        assert!(p.set_value(1.5).is_err());
        assert_eq!(p.value(), Some(0.9));
    }

    #[test]
    fn test_set_range_clamps_value() {
        let mut p = Parameter::free("m1", -1.0, -3.0, 3.0).unwrap();
        p.set_range(0.0, 2.0).unwrap();
        assert_eq!(p.value(), Some(0.0));
        assert!(p.set_range(2.0, 1.0).is_err());
    }

    #[test]
    fn test_derived_is_read_only() {
        let formula = Formula::compile("1.5*res", vec!["res".to_string()]).unwrap();
        let mut p = Parameter::derived("resm", formula);
        assert!(p.is_derived());
        assert_eq!(p.dependencies(), ["res".to_string()]);
        assert!(matches!(
            p.set_value(1.0),
            Err(ModelError::ReadOnlyParameter { .. })
        ));
    }
}
