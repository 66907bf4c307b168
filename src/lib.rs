//! # kyromodel - Statistical model workspaces
//!
//! kyromodel builds probability models from a compact factory language,
//! keeps them in a named workspace, generates toy datasets from them and
//! persists the whole workspace as a single checksummed artifact.
//!
//! ## Core Concepts
//!
//! - **Parameter**: a bounded free value, or a formula over other parameters
//! - **PDF node**: a density (Gaussian, Uniform, Product, Sum, ConditionalJoint)
//! - **Conditional composition**: `p(x | y) * p(y)` built from `pdf|y` factors
//! - **Snapshot**: a named, immutable capture of parameter values
//! - **Dataset**: observations generated from a PDF
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kyromodel::Workspace;
//!
//! let mut ws = Workspace::new("w");
//! ws.declare("Gaussian::g1(x[-5,5],m1[-1,-3,3],res[1,0.1,2])")?;
//! ws.declare("Uniform::p_res(res)")?;
//! ws.declare("PROD::joint(g1|res,p_res)")?;
//! ws.define_set("observables", ["x", "res"])?;
//!
//! let data = ws.generate_seeded("joint", ws.set("observables")?, 2000, 42)?;
//! ws.import_dataset(data.renamed("sample"))?;
//! ws.save("model.kmdl")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Model graph
pub mod compose;
pub mod error;
pub mod expr;
pub mod param;
pub mod pdf;
pub mod symbols;

// Front end and workspace
pub mod declare;
pub mod job;
pub mod sampler;
pub mod snapshot;
pub mod storage;
pub mod workspace;

pub use declare::{declare, parse_declaration, Declaration};
pub use error::{FormulaError, ModelError, ModelResult, SyntaxError};
pub use expr::{evaluate, Formula, Scope};
pub use job::Job;
pub use param::{Bounds, ParamKind, Parameter};
pub use pdf::{PdfKind, PdfNode, PdfType, WeightedBranch};
pub use sampler::{generate, generate_seeded, Dataset, SamplerConfig};
pub use snapshot::{Snapshot, SnapshotStore};
pub use storage::PersistConfig;
pub use symbols::{Node, NodeId, SymbolTable};
pub use workspace::{ObjectRef, Workspace};
