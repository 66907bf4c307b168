//! PDF nodes: the density components of a model graph.
//!
//! Nodes never own their children. Every edge is a name that the symbol
//! table resolves, so shared parameters and shared sub-PDFs are plain
//! repeated references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One explicitly weighted branch of a mixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedBranch {
    /// Parameter holding the branch weight.
    pub weight: String,
    /// Branch PDF.
    pub pdf: String,
}

/// Kind-specific PDF wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PdfKind {
    /// Normal density of `x` with the given mean and width.
    Gaussian {
        /// Observable drawn by this PDF.
        x: String,
        /// Mean parameter.
        mean: String,
        /// Width (standard deviation) parameter.
        sigma: String,
    },

    /// Flat density over the bounds of each variable.
    Uniform {
        /// Observables drawn by this PDF.
        variables: Vec<String>,
    },

    /// Product of independent factors over disjoint variables.
    Product {
        /// Factor PDFs.
        factors: Vec<String>,
    },

    /// Mixture: explicit branches plus one remainder branch whose weight is
    /// `1 - sum(explicit weights)`.
    Sum {
        /// Explicitly weighted branches.
        branches: Vec<WeightedBranch>,
        /// Branch taking the implicit remaining weight.
        remainder: String,
    },

    /// `p(x | shared) * p(shared)`: the shared variable is drawn once from the
    /// marginal, then every conditional is drawn at that value.
    ConditionalJoint {
        /// The shared variable.
        shared: String,
        /// PDF generating the shared variable.
        marginal: String,
        /// PDFs conditioned on the shared variable.
        conditionals: Vec<String>,
    },
}

/// A named PDF node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfNode {
    /// Unique name.
    pub name: String,
    /// Kind and wiring.
    pub kind: PdfKind,
}

/// Discriminant of [`PdfKind`], handy for assertions and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdfType {
    /// [`PdfKind::Gaussian`].
    Gaussian,
    /// [`PdfKind::Uniform`].
    Uniform,
    /// [`PdfKind::Product`].
    Product,
    /// [`PdfKind::Sum`].
    Sum,
    /// [`PdfKind::ConditionalJoint`].
    ConditionalJoint,
}

impl fmt::Display for PdfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gaussian => "Gaussian",
            Self::Uniform => "Uniform",
            Self::Product => "Product",
            Self::Sum => "Sum",
            Self::ConditionalJoint => "ConditionalJoint",
        };
        f.write_str(s)
    }
}

impl PdfNode {
    /// Creates a node.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PdfKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Kind discriminant.
    #[must_use]
    pub const fn pdf_type(&self) -> PdfType {
        match self.kind {
            PdfKind::Gaussian { .. } => PdfType::Gaussian,
            PdfKind::Uniform { .. } => PdfType::Uniform,
            PdfKind::Product { .. } => PdfType::Product,
            PdfKind::Sum { .. } => PdfType::Sum,
            PdfKind::ConditionalJoint { .. } => PdfType::ConditionalJoint,
        }
    }

    /// Parameters referenced directly by this node.
    #[must_use]
    pub fn parameter_refs(&self) -> Vec<&str> {
        match &self.kind {
            PdfKind::Gaussian { x, mean, sigma } => vec![x.as_str(), mean.as_str(), sigma.as_str()],
            PdfKind::Uniform { variables } => variables.iter().map(String::as_str).collect(),
            PdfKind::Product { .. } => Vec::new(),
            PdfKind::Sum { branches, .. } => branches.iter().map(|b| b.weight.as_str()).collect(),
            PdfKind::ConditionalJoint { shared, .. } => vec![shared.as_str()],
        }
    }

    /// Child PDFs referenced directly by this node.
    #[must_use]
    pub fn pdf_refs(&self) -> Vec<&str> {
        match &self.kind {
            PdfKind::Gaussian { .. } | PdfKind::Uniform { .. } => Vec::new(),
            PdfKind::Product { factors } => factors.iter().map(String::as_str).collect(),
            PdfKind::Sum {
                branches,
                remainder,
            } => branches
                .iter()
                .map(|b| b.pdf.as_str())
                .chain(std::iter::once(remainder.as_str()))
                .collect(),
            PdfKind::ConditionalJoint {
                marginal,
                conditionals,
                ..
            } => std::iter::once(marginal.as_str())
                .chain(conditionals.iter().map(String::as_str))
                .collect(),
        }
    }

    /// All direct dependencies: parameters first, then child PDFs.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps = self.parameter_refs();
        deps.extend(self.pdf_refs());
        deps
    }
}
