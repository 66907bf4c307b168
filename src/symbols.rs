//! Symbol table: the arena that owns every parameter and PDF node.
//!
//! Nodes live in a `Vec` and are addressed by stable [`NodeId`]s; edges are
//! names resolved through a `HashMap` index. Parameters and PDFs share one
//! namespace.
//!
//! Dependencies must already be declared when a node is declared, so the only
//! cycle a declaration can introduce is a node naming itself. Graphs loaded
//! from an artifact are checked with a full topological sort.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, ModelResult, SyntaxError};
use crate::param::{ParamKind, Parameter};
use crate::pdf::PdfNode;

/// Stable index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in declaration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    /// Free or derived parameter.
    Parameter(Parameter),
    /// Probability density.
    Pdf(PdfNode),
}

impl Node {
    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Parameter(p) => &p.name,
            Self::Pdf(p) => &p.name,
        }
    }

    /// Direct dependency names.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::Parameter(p) => p.dependencies().iter().map(String::as_str).collect(),
            Self::Pdf(p) => p.dependencies(),
        }
    }

    #[must_use]
    pub const fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Self::Parameter(p) => Some(p),
            Self::Pdf(_) => None,
        }
    }

    #[must_use]
    pub const fn as_pdf(&self) -> Option<&PdfNode> {
        match self {
            Self::Parameter(_) => None,
            Self::Pdf(p) => Some(p),
        }
    }
}

/// Returns true if `name` is an identifier (`[A-Za-z_][A-Za-z0-9_]*`) or the
/// text of a numeric literal (constant parameters are named by their value).
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        Some(_) => name.parse::<f64>().map_or(false, f64::is_finite),
        None => false,
    }
}

/// Owns all named parameters and PDFs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Node>", into = "Vec<Node>")]
pub struct SymbolTable {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of declared nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Id of a declared name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Node at `id`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Nodes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.nodes.iter().filter_map(Node::as_parameter)
    }

    /// PDFs in declaration order.
    pub fn pdfs(&self) -> impl Iterator<Item = &PdfNode> {
        self.nodes.iter().filter_map(Node::as_pdf)
    }

    /// Resolves any node by name.
    pub fn resolve(&self, name: &str) -> ModelResult<&Node> {
        self.index
            .get(name)
            .map(|id| &self.nodes[id.0])
            .ok_or_else(|| ModelError::unknown(name, "node"))
    }

    /// Resolves a parameter by name.
    pub fn parameter(&self, name: &str) -> ModelResult<&Parameter> {
        self.resolve(name)
            .ok()
            .and_then(Node::as_parameter)
            .ok_or_else(|| ModelError::unknown(name, "parameter"))
    }

    /// Resolves a PDF by name.
    pub fn pdf(&self, name: &str) -> ModelResult<&PdfNode> {
        self.resolve(name)
            .ok()
            .and_then(Node::as_pdf)
            .ok_or_else(|| ModelError::unknown(name, "pdf"))
    }

    fn parameter_mut(&mut self, name: &str) -> ModelResult<&mut Parameter> {
        let id = self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::unknown(name, "parameter"))?;
        match &mut self.nodes[id.0] {
            Node::Parameter(p) => Ok(p),
            Node::Pdf(_) => Err(ModelError::unknown(name, "parameter")),
        }
    }

    /// Direct dependency names of a node.
    pub fn dependencies(&self, name: &str) -> ModelResult<Vec<String>> {
        Ok(self
            .resolve(name)?
            .dependencies()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Declares a parameter.
    ///
    /// # Errors
    /// - `DuplicateName` if the name is taken
    /// - `Cycle` if a derived parameter's formula names itself
    /// - `UnknownReference` if a formula dependency is not a declared parameter
    pub fn declare_parameter(&mut self, param: Parameter) -> ModelResult<NodeId> {
        self.check_new_name(&param.name)?;
        for dep in param.dependencies() {
            if *dep == param.name {
                return Err(ModelError::Cycle {
                    name: param.name.clone(),
                });
            }
            self.parameter(dep)?;
        }
        debug!(name = %param.name, derived = param.is_derived(), "declared parameter");
        Ok(self.push(Node::Parameter(param)))
    }

    /// Declares a PDF node.
    ///
    /// # Errors
    /// - `DuplicateName` if the name is taken
    /// - `Cycle` if the node names itself as a dependency
    /// - `UnknownReference` if a parameter or child PDF is missing
    pub fn declare_pdf(&mut self, pdf: PdfNode) -> ModelResult<NodeId> {
        self.check_new_name(&pdf.name)?;
        if pdf.dependencies().contains(&pdf.name.as_str()) {
            return Err(ModelError::Cycle {
                name: pdf.name.clone(),
            });
        }
        for p in pdf.parameter_refs() {
            self.parameter(p)?;
        }
        for child in pdf.pdf_refs() {
            self.pdf(child)?;
        }
        debug!(name = %pdf.name, kind = %pdf.pdf_type(), "declared pdf");
        Ok(self.push(Node::Pdf(pdf)))
    }

    /// Sets the value of a free parameter.
    pub fn set_value(&mut self, name: &str, value: f64) -> ModelResult<()> {
        self.parameter_mut(name)?.set_value(value)
    }

    /// Replaces the bounds of a free parameter, clamping its value.
    pub fn set_range(&mut self, name: &str, lower: f64, upper: f64) -> ModelResult<()> {
        self.parameter_mut(name)?.set_range(lower, upper)
    }

    /// All node ids ordered so that every node follows its dependencies.
    ///
    /// # Errors
    /// - `Cycle` naming a node on a loop
    /// - `UnknownReference` for a dangling edge
    pub fn topological_order(&self) -> ModelResult<Vec<NodeId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::New {
                continue;
            }
            // Iterative DFS: (node, next dependency position).
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::Active;
            while let Some(top) = stack.last_mut() {
                let id = top.0;
                let deps = self.nodes[id].dependencies();
                if top.1 < deps.len() {
                    let dep = deps[top.1];
                    top.1 += 1;
                    let dep_id = self
                        .index
                        .get(dep)
                        .ok_or_else(|| ModelError::unknown(dep, "node"))?
                        .0;
                    match marks[dep_id] {
                        Mark::New => {
                            marks[dep_id] = Mark::Active;
                            stack.push((dep_id, 0));
                        }
                        Mark::Active => {
                            return Err(ModelError::Cycle {
                                name: dep.to_string(),
                            });
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[id] = Mark::Done;
                    order.push(NodeId(id));
                    stack.pop();
                }
            }
        }
        Ok(order)
    }

    fn check_new_name(&self, name: &str) -> ModelResult<()> {
        if !is_valid_name(name) {
            return Err(SyntaxError::Malformed {
                reason: format!("'{name}' is not a valid name"),
                offset: 0,
            }
            .into());
        }
        if self.index.contains_key(name) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.index.insert(node.name().to_string(), id);
        self.nodes.push(node);
        id
    }
}

impl TryFrom<Vec<Node>> for SymbolTable {
    type Error = ModelError;

    /// Rebuilds the index and re-checks every invariant a declaration would
    /// have enforced.
    fn try_from(nodes: Vec<Node>) -> Result<Self, Self::Error> {
        let mut table = Self {
            nodes: Vec::with_capacity(nodes.len()),
            index: HashMap::with_capacity(nodes.len()),
        };
        for node in nodes {
            table.check_new_name(node.name())?;
            if let Node::Parameter(Parameter {
                name,
                kind: ParamKind::Free { value, bounds },
            }) = &node
            {
                Parameter::free(name.clone(), *value, bounds.lower, bounds.upper)?;
            }
            table.push(node);
        }
        for node in &table.nodes {
            match node {
                Node::Parameter(p) => {
                    for dep in p.dependencies() {
                        table.parameter(dep)?;
                    }
                }
                Node::Pdf(pdf) => {
                    for p in pdf.parameter_refs() {
                        table.parameter(p)?;
                    }
                    for child in pdf.pdf_refs() {
                        table.pdf(child)?;
                    }
                }
            }
        }
        table.topological_order()?;
        Ok(table)
    }
}

impl From<SymbolTable> for Vec<Node> {
    fn from(table: SymbolTable) -> Self {
        table.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Formula;
    use crate::pdf::{PdfKind, PdfType};

    fn gaussian(name: &str, x: &str, mean: &str, sigma: &str) -> PdfNode {
        PdfNode::new(
            name,
            PdfKind::Gaussian {
                x: x.into(),
                mean: mean.into(),
                sigma: sigma.into(),
            },
        )
    }

    fn base() -> SymbolTable {
        let mut t = SymbolTable::new();
        t.declare_parameter(Parameter::free("x", 0.0, -5.0, 5.0).unwrap())
            .unwrap();
        t.declare_parameter(Parameter::free("m1", -1.0, -3.0, 3.0).unwrap())
            .unwrap();
        t.declare_parameter(Parameter::free("res", 1.0, 0.1, 2.0).unwrap())
            .unwrap();
        t
    }

    #[test]
    fn test_resolve_returns_declared_kind_and_deps() {
        let mut t = base();
        t.declare_pdf(gaussian("g1", "x", "m1", "res")).unwrap();
        let pdf = t.pdf("g1").unwrap();
        assert_eq!(pdf.pdf_type(), PdfType::Gaussian);
        assert_eq!(
            t.dependencies("g1").unwrap(),
            vec!["x".to_string(), "m1".to_string(), "res".to_string()]
        );
    }

    #[test]
    fn test_duplicate_name_rejected_across_kinds() {
        let mut t = base();
        let err = t
            .declare_parameter(Parameter::free("x", 0.0, -1.0, 1.0).unwrap())
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { .. }));

        let err = t.declare_pdf(gaussian("res", "x", "m1", "res")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { .. }));
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut t = base();
        let err = t.declare_pdf(gaussian("g", "x", "mu", "res")).unwrap_err();
        assert!(matches!(err, ModelError::UnknownReference { ref name, .. } if name == "mu"));
        assert!(!t.contains("g"));
    }

    #[test]
    fn test_parameter_used_as_pdf_rejected() {
        let mut t = base();
        let err = t
            .declare_pdf(PdfNode::new(
                "p",
                PdfKind::Product {
                    factors: vec!["x".into()],
                },
            ))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownReference { expected: "pdf", .. }));
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut t = base();
        let err = t
            .declare_pdf(PdfNode::new(
                "loop",
                PdfKind::Product {
                    factors: vec!["loop".into()],
                },
            ))
            .unwrap_err();
        assert!(matches!(err, ModelError::Cycle { .. }));

        let f = Formula::compile("2*a", vec!["a".to_string()]).unwrap();
        let err = t.declare_parameter(Parameter::derived("a", f)).unwrap_err();
        assert!(matches!(err, ModelError::Cycle { .. }));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut t = SymbolTable::new();
        let err = t
            .declare_parameter(Parameter::free("bad name", 0.0, 0.0, 1.0).unwrap())
            .unwrap_err();
        assert!(err.is_syntax());
        assert!(is_valid_name("_m1"));
        assert!(is_valid_name("1.5"));
        assert!(is_valid_name("-3"));
        assert!(!is_valid_name("1x"));
    }

    #[test]
    fn test_topological_order_puts_dependencies_first() {
        let mut t = base();
        t.declare_pdf(gaussian("g1", "x", "m1", "res")).unwrap();
        let order = t.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|id| *id == t.id_of(name).unwrap());
        assert!(pos("x") < pos("g1"));
        assert!(pos("res") < pos("g1"));
    }

    #[test]
    fn test_loaded_cycle_detected() {
        let nodes = vec![
            Node::Pdf(PdfNode::new(
                "a",
                PdfKind::Product {
                    factors: vec!["b".into()],
                },
            )),
            Node::Pdf(PdfNode::new(
                "b",
                PdfKind::Product {
                    factors: vec!["a".into()],
                },
            )),
        ];
        let err = SymbolTable::try_from(nodes).unwrap_err();
        assert!(matches!(err, ModelError::Cycle { .. }));
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_index() {
        let mut t = base();
        t.declare_pdf(gaussian("g1", "x", "m1", "res")).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        let back: SymbolTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.id_of("g1"), t.id_of("g1"));
    }

    #[test]
    fn test_set_value_through_table() {
        let mut t = base();
        t.set_value("m1", 0.5).unwrap();
        assert_eq!(t.parameter("m1").unwrap().value(), Some(0.5));
        assert!(t.set_value("m1", 9.0).is_err());
        assert!(t.set_value("g1", 0.0).is_err());
    }
}
