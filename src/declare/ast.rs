//! Declaration syntax tree.
//!
//! The parser produces these without looking at the symbol table, so a
//! malformed declaration is always reported as a syntax error before any
//! name is resolved.

/// PDF kinds the factory language knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfDeclKind {
    /// `Gaussian::name(x, mean, sigma)`
    Gaussian,
    /// `Uniform::name(vars...)`
    Uniform,
    /// `PROD::name(factors...)`
    Product,
    /// `SUM::name(w*pdf..., pdf)`
    Sum,
}

impl PdfDeclKind {
    /// Case-insensitive kind lookup (`Gaussian`, `Uniform`, `PROD`/`Product`,
    /// `SUM`/`Sum`).
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "gaussian" => Some(Self::Gaussian),
            "uniform" => Some(Self::Uniform),
            "prod" | "product" => Some(Self::Product),
            "sum" => Some(Self::Sum),
            _ => None,
        }
    }

    /// Display name used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gaussian => "Gaussian",
            Self::Uniform => "Uniform",
            Self::Product => "Product",
            Self::Sum => "Sum",
        }
    }
}

/// One declaration, possibly containing nested declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// `name[v]`, `name[lo, hi]` or `name[v, lo, hi]`.
    Variable {
        /// Declared name.
        name: String,
        /// Initial value.
        value: f64,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
        /// Byte offset of the name.
        offset: usize,
    },
    /// `expr::name('formula', {deps})`.
    Formula {
        /// Declared name.
        name: String,
        /// Formula text.
        formula: String,
        /// Dependency arguments, in `@N` order.
        dependencies: Vec<Arg>,
        /// Byte offset of the name.
        offset: usize,
    },
    /// `Kind::name(args...)`.
    Pdf {
        /// PDF kind keyword.
        kind: PdfDeclKind,
        /// Declared name.
        name: String,
        /// Arguments in order.
        args: Vec<Arg>,
        /// Byte offset of the name.
        offset: usize,
    },
}

impl Declaration {
    /// Name being declared.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Variable { name, .. } | Self::Formula { name, .. } | Self::Pdf { name, .. } => {
                name
            }
        }
    }
}

/// An argument inside a declaration's parentheses.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Bare name of an existing parameter or PDF.
    Ref {
        /// Referenced name.
        name: String,
        /// Byte offset of the name.
        offset: usize,
    },
    /// Numeric literal, becomes a constant named by its text.
    Constant {
        /// Parsed value.
        value: f64,
        /// Literal as written.
        text: String,
    },
    /// Inline declaration.
    Nested(Box<Declaration>),
    /// `pdf|var`.
    Conditioned {
        /// The conditional PDF.
        pdf: Box<Arg>,
        /// Variable it is conditioned on.
        var: String,
        /// Byte offset of the `|`.
        offset: usize,
    },
    /// `weight*pdf`.
    Weighted {
        /// Weight parameter.
        weight: Box<Arg>,
        /// Branch PDF.
        pdf: Box<Arg>,
        /// Byte offset of the `*`.
        offset: usize,
    },
}
