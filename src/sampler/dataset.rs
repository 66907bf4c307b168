//! Generated datasets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// An ordered table of observations.
///
/// Columns follow the observable order requested at generation time and rows
/// follow draw order. A dataset cannot be edited once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    variables: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Dataset {
    /// Builds a dataset, checking that every row has one finite value per
    /// variable and that variable names are unique.
    pub fn from_rows(
        name: impl Into<String>,
        variables: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> ModelResult<Self> {
        let dataset = Self {
            name: name.into(),
            variables,
            rows,
        };
        dataset.check()?;
        Ok(dataset)
    }

    /// Re-checks the invariants [`Dataset::from_rows`] enforces.
    pub(crate) fn check(&self) -> ModelResult<()> {
        let name = &self.name;
        for (i, v) in self.variables.iter().enumerate() {
            if self.variables[..i].contains(v) {
                return Err(ModelError::DuplicateName { name: v.clone() });
            }
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.variables.len() {
                return Err(ModelError::corrupt(format!(
                    "dataset '{name}': row {i} has {} values, expected {}",
                    row.len(),
                    self.variables.len()
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::corrupt(format!(
                    "dataset '{name}': row {i} holds a non-finite value"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn new_unchecked(name: String, variables: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self {
            name,
            variables,
            rows,
        }
    }

    /// Dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy of this dataset under another name.
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Column names, in order.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw row `i`, in column order.
    #[must_use]
    pub fn row(&self, i: usize) -> Option<&[f64]> {
        self.rows.get(i).map(Vec::as_slice)
    }

    /// Observation `i` keyed by variable name.
    #[must_use]
    pub fn record(&self, i: usize) -> Option<BTreeMap<&str, f64>> {
        let row = self.rows.get(i)?;
        Some(
            self.variables
                .iter()
                .map(String::as_str)
                .zip(row.iter().copied())
                .collect(),
        )
    }

    /// Value of `variable` in observation `i`.
    #[must_use]
    pub fn get(&self, i: usize, variable: &str) -> Option<f64> {
        let col = self.variables.iter().position(|v| v == variable)?;
        self.rows.get(i).map(|row| row[col])
    }

    /// Every value of one variable, in draw order.
    #[must_use]
    pub fn column(&self, variable: &str) -> Option<Vec<f64>> {
        let col = self.variables.iter().position(|v| v == variable)?;
        Some(self.rows.iter().map(|row| row[col]).collect())
    }

    /// Iterates rows in draw order.
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.rows.iter().map(Vec::as_slice)
    }
}
