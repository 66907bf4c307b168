//! The workspace: everything one model artifact holds.
//!
//! A [`Workspace`] owns the symbol table plus the named objects that sit
//! beside it: observable sets, parameter snapshots and imported datasets. It is
//! the unit that is saved to and loaded from disk.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compose::{conditional_joint, validate_pdf};
use crate::declare;
use crate::error::{ModelError, ModelResult, SyntaxError};
use crate::expr::evaluate;
use crate::param::Parameter;
use crate::pdf::PdfNode;
use crate::sampler::{self, Dataset, SamplerConfig};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::storage::{self, PersistConfig};
use crate::symbols::{is_valid_name, Node, SymbolTable};

/// Any named object in a workspace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectRef<'a> {
    /// Free or derived parameter.
    Parameter(&'a Parameter),
    /// Probability density.
    Pdf(&'a PdfNode),
    /// Members of a named set.
    Set(&'a [String]),
    /// Saved parameter values.
    Snapshot(&'a Snapshot),
    /// Imported dataset.
    Dataset(&'a Dataset),
}

impl ObjectRef<'_> {
    /// Short kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Parameter(_) => "parameter",
            Self::Pdf(_) => "pdf",
            Self::Set(_) => "set",
            Self::Snapshot(_) => "snapshot",
            Self::Dataset(_) => "dataset",
        }
    }
}

/// A model and everything attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    name: String,
    created_at: DateTime<Utc>,
    symbols: SymbolTable,
    sets: BTreeMap<String, Vec<String>>,
    snapshots: SnapshotStore,
    datasets: BTreeMap<String, Dataset>,
    #[serde(skip)]
    sampler_config: SamplerConfig,
    #[serde(skip)]
    persist_config: PersistConfig,
}

/// Compares persisted state only. Sampler and persistence settings are not
/// saved, so they do not take part.
impl PartialEq for Workspace {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.created_at == other.created_at
            && self.symbols == other.symbols
            && self.sets == other.sets
            && self.snapshots == other.snapshots
            && self.datasets == other.datasets
    }
}

impl Workspace {
    /// Creates an empty workspace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            symbols: SymbolTable::new(),
            sets: BTreeMap::new(),
            snapshots: SnapshotStore::new(),
            datasets: BTreeMap::new(),
            sampler_config: SamplerConfig::default(),
            persist_config: PersistConfig::default(),
        }
    }

    /// Replaces sampler and persistence settings after validating them.
    pub fn with_config(mut self, sampler: SamplerConfig, persist: PersistConfig) -> ModelResult<Self> {
        sampler.validate()?;
        self.persist_config = persist.validate()?;
        self.sampler_config = sampler;
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub const fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    // Model building

    /// Applies one factory declaration; see [`crate::declare`].
    pub fn declare(&mut self, text: &str) -> ModelResult<String> {
        declare::declare(&mut self.symbols, text)
    }

    /// Declares `name` as `p(conditional | shared) * p(shared)` from
    /// existing PDFs.
    pub fn compose(
        &mut self,
        name: &str,
        conditional: &str,
        shared: &str,
        marginal: &str,
    ) -> ModelResult<String> {
        if self.symbols.contains(name) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        let node = conditional_joint(
            &self.symbols,
            name,
            vec![conditional.to_string()],
            shared,
            marginal,
        )?;
        self.symbols.declare_pdf(node)?;
        Ok(name.to_string())
    }

    /// Names an ordered list of parameters, typically observables.
    ///
    /// # Errors
    /// - `DuplicateName` if the set exists or lists a member twice
    /// - `UnknownReference` if a member is not a declared parameter
    pub fn define_set<I, S>(&mut self, name: &str, members: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !is_valid_name(name) {
            return Err(SyntaxError::Malformed {
                reason: format!("invalid set name '{name}'"),
                offset: 0,
            }
            .into());
        }
        if self.sets.contains_key(name) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        let mut list: Vec<String> = Vec::new();
        for member in members {
            let member = member.as_ref().trim();
            self.symbols.parameter(member)?;
            if list.iter().any(|m| m == member) {
                return Err(ModelError::DuplicateName {
                    name: member.to_string(),
                });
            }
            list.push(member.to_string());
        }
        debug!(set = name, members = list.len(), "defined set");
        self.sets.insert(name.to_string(), list);
        Ok(())
    }

    /// Members of a named set.
    pub fn set(&self, name: &str) -> ModelResult<&[String]> {
        self.sets
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ModelError::unknown(name, "set"))
    }

    pub fn parameter(&self, name: &str) -> ModelResult<&Parameter> {
        self.symbols.parameter(name)
    }

    pub fn pdf(&self, name: &str) -> ModelResult<&PdfNode> {
        self.symbols.pdf(name)
    }

    /// Current value of any parameter, evaluating derived ones.
    pub fn value(&self, name: &str) -> ModelResult<f64> {
        evaluate(&self.symbols, name)
    }

    pub fn set_value(&mut self, name: &str, value: f64) -> ModelResult<()> {
        self.symbols.set_value(name, value)
    }

    pub fn set_range(&mut self, name: &str, lower: f64, upper: f64) -> ModelResult<()> {
        self.symbols.set_range(name, lower, upper)
    }

    // Snapshots

    /// Captures current values of `parameters` under `name`.
    pub fn save_snapshot<S: AsRef<str>>(&mut self, name: &str, parameters: &[S]) -> ModelResult<()> {
        let names: Vec<String> = parameters
            .iter()
            .map(|p| p.as_ref().trim().to_string())
            .collect();
        self.snapshots.save(&self.symbols, name, &names)
    }

    /// Writes a snapshot's values back.
    pub fn restore_snapshot(&mut self, name: &str) -> ModelResult<()> {
        self.snapshots.restore(&mut self.symbols, name)
    }

    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.get(name)
    }

    pub fn snapshot_names(&self) -> impl Iterator<Item = &str> {
        self.snapshots.names()
    }

    // Sampling

    /// Draws `count` observations of `observables` from `pdf`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        pdf: &str,
        observables: &[String],
        count: usize,
        rng: &mut R,
    ) -> ModelResult<Dataset> {
        sampler::generate(&self.symbols, pdf, observables, count, &self.sampler_config, rng)
    }

    /// [`Workspace::generate`] with a seeded generator.
    pub fn generate_seeded(
        &self,
        pdf: &str,
        observables: &[String],
        count: usize,
        seed: u64,
    ) -> ModelResult<Dataset> {
        sampler::generate_seeded(&self.symbols, pdf, observables, count, &self.sampler_config, seed)
    }

    /// [`Workspace::generate`] over the members of a named set.
    pub fn generate_set<R: Rng + ?Sized>(
        &self,
        pdf: &str,
        set: &str,
        count: usize,
        rng: &mut R,
    ) -> ModelResult<Dataset> {
        let observables = self.set(set)?;
        self.generate(pdf, observables, count, rng)
    }

    // Datasets

    /// Stores a dataset under its own name.
    pub fn import_dataset(&mut self, dataset: Dataset) -> ModelResult<()> {
        if !is_valid_name(dataset.name()) {
            return Err(SyntaxError::Malformed {
                reason: format!("invalid dataset name '{}'", dataset.name()),
                offset: 0,
            }
            .into());
        }
        if self.datasets.contains_key(dataset.name()) {
            return Err(ModelError::DuplicateName {
                name: dataset.name().to_string(),
            });
        }
        debug!(dataset = dataset.name(), rows = dataset.len(), "imported dataset");
        self.datasets.insert(dataset.name().to_string(), dataset);
        Ok(())
    }

    #[must_use]
    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    pub fn set_names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Looks a name up across every kind of object. Parameters and PDFs are
    /// searched first, then sets, snapshots and datasets.
    #[must_use]
    pub fn object(&self, name: &str) -> Option<ObjectRef<'_>> {
        if let Some(id) = self.symbols.id_of(name) {
            return self.symbols.node(id).map(|node| match node {
                Node::Parameter(p) => ObjectRef::Parameter(p),
                Node::Pdf(pdf) => ObjectRef::Pdf(pdf),
            });
        }
        if let Some(members) = self.sets.get(name) {
            return Some(ObjectRef::Set(members));
        }
        if let Some(snapshot) = self.snapshots.get(name) {
            return Some(ObjectRef::Snapshot(snapshot));
        }
        self.datasets.get(name).map(ObjectRef::Dataset)
    }

    // Persistence

    /// Atomically writes the workspace to `path`. Returns bytes written.
    pub fn save(&self, path: impl AsRef<Path>) -> ModelResult<u64> {
        let path = path.as_ref();
        let bytes = storage::save_artifact(path, self, self.persist_config)?;
        info!(
            path = %path.display(),
            bytes,
            nodes = self.symbols.len(),
            datasets = self.datasets.len(),
            "saved workspace"
        );
        Ok(bytes)
    }

    /// Loads and validates a workspace written by [`Workspace::save`].
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let workspace: Self = storage::load_artifact(path)?;
        workspace.check_loaded()?;
        info!(
            path = %path.display(),
            name = %workspace.name,
            nodes = workspace.symbols.len(),
            datasets = workspace.datasets.len(),
            "loaded workspace"
        );
        Ok(workspace)
    }

    /// Pretty JSON of the whole workspace.
    pub fn to_json_pretty(&self) -> ModelResult<String> {
        storage::to_json_pretty(self)
    }

    /// Parses and validates JSON from [`Workspace::to_json_pretty`].
    pub fn from_json(json: &str) -> ModelResult<Self> {
        let workspace: Self = storage::from_json(json)?;
        workspace.check_loaded()?;
        Ok(workspace)
    }

    /// Cross-object checks the symbol table cannot do on its own. Every
    /// failure is reported as a corrupt artifact.
    fn check_loaded(&self) -> ModelResult<()> {
        let corrupt = |e: ModelError| match e {
            ModelError::CorruptArtifact { .. } => e,
            other => ModelError::corrupt(other.to_string()),
        };
        for pdf in self.symbols.pdfs() {
            validate_pdf(&self.symbols, pdf, false).map_err(corrupt)?;
        }
        for (set, members) in &self.sets {
            for m in members {
                if self.symbols.parameter(m).is_err() {
                    return Err(ModelError::corrupt(format!(
                        "set '{set}' names unknown parameter '{m}'"
                    )));
                }
            }
        }
        self.snapshots.check_against(&self.symbols)?;
        for (key, dataset) in &self.datasets {
            if key != dataset.name() {
                return Err(ModelError::corrupt(format!(
                    "dataset stored as '{key}' is named '{}'",
                    dataset.name()
                )));
            }
            dataset.check().map_err(corrupt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    fn punzi() -> Workspace {
        let mut ws = Workspace::new("w");
        for line in [
            "Gaussian::g1(x[-5,5],m1[-1,-3,3],res[1,0.1,2])",
            "Gaussian::g2(x,m2[1,-3,3],expr::resm('1.5*res',{res}))",
            "Uniform::p_res(res)",
            "SUM::model(f[0.3,0,1]*PROD::cat1(g1|res,p_res),PROD::cat2(g2|res,p_res))",
        ] {
            ws.declare(line).unwrap();
        }
        ws.define_set("observables", ["x", "res"]).unwrap();
        ws
    }

    #[test]
    fn test_compose_api() {
        let mut ws = Workspace::new("w");
        ws.declare("Gaussian::g1(x[-5,5],m1[-1,-3,3],res[1,0.1,2])").unwrap();
        ws.declare("Uniform::p_res(res)").unwrap();
        ws.compose("joint", "g1", "res", "p_res").unwrap();
        assert!(matches!(ws.object("joint"), Some(ObjectRef::Pdf(_))));
        assert!(matches!(
            ws.compose("joint", "g1", "res", "p_res"),
            Err(ModelError::DuplicateName { .. })
        ));
        assert!(matches!(
            ws.compose("bad", "g1", "m1", "p_res"),
            Err(ModelError::Composition { .. })
        ));
    }

    #[test]
    fn test_define_set_errors() {
        let mut ws = punzi();
        assert!(matches!(
            ws.define_set("observables", ["x"]),
            Err(ModelError::DuplicateName { .. })
        ));
        assert!(matches!(
            ws.define_set("other", ["x", "nope"]),
            Err(ModelError::UnknownReference { .. })
        ));
        assert!(ws.set("other").is_err());
    }

    #[test]
    fn test_generate_set() {
        let ws = punzi();
        let mut rng = rand::thread_rng();
        let d = ws.generate_set("model", "observables", 100, &mut rng).unwrap();
        assert_eq!(d.variables(), ["x".to_string(), "res".to_string()]);
        assert_eq!(d.len(), 100);
    }

    #[test]
    fn test_object_lookup() {
        let mut ws = punzi();
        ws.save_snapshot("param_point", &["f", "m1", "m2"]).unwrap();
        let d = ws
            .generate_seeded("model", ws.set("observables").unwrap(), 10, 1)
            .unwrap()
            .renamed("punzi_example");
        ws.import_dataset(d).unwrap();

        assert_eq!(ws.object("res").map(|o| o.kind()), Some("parameter"));
        assert_eq!(ws.object("model").map(|o| o.kind()), Some("pdf"));
        assert_eq!(ws.object("observables").map(|o| o.kind()), Some("set"));
        assert_eq!(ws.object("param_point").map(|o| o.kind()), Some("snapshot"));
        assert_eq!(ws.object("punzi_example").map(|o| o.kind()), Some("dataset"));
        assert!(ws.object("nothing").is_none());
    }

    #[test]
    fn test_duplicate_dataset() {
        let mut ws = punzi();
        let d = ws
            .generate_seeded("model", ws.set("observables").unwrap(), 5, 1)
            .unwrap();
        ws.import_dataset(d.clone()).unwrap();
        assert!(matches!(
            ws.import_dataset(d),
            Err(ModelError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut ws = punzi();
        ws.save_snapshot("param_point", &["f", "m1", "m2"]).unwrap();
        let json = ws.to_json_pretty().unwrap();
        let back = Workspace::from_json(&json).unwrap();
        assert_eq!(back, ws);
    }

    #[test]
    fn test_saved_workspace_equals_original_with_custom_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("w.kmdl");
        let ws = punzi()
            .with_config(
                SamplerConfig {
                    max_truncation_attempts: 50,
                },
                PersistConfig {
                    sync_on_write: false,
                    ..PersistConfig::default()
                },
            )
            .unwrap();
        ws.save(&path).unwrap();
        let back = Workspace::load(&path).unwrap();
        assert_ne!(back.sampler_config, ws.sampler_config);
        assert_eq!(back, ws);
    }

    #[test]
    fn test_json_with_dangling_set_is_corrupt() {
        let ws = punzi();
        let mut value: serde_json::Value =
            serde_json::from_str(&ws.to_json_pretty().unwrap()).unwrap();
        value["sets"]["observables"][1] = serde_json::Value::from("gone");
        assert!(matches!(
            Workspace::from_json(&value.to_string()),
            Err(ModelError::CorruptArtifact { .. })
        ));
    }

    #[test]
    fn test_json_with_bad_formula_is_corrupt() {
        let ws = punzi();
        let json = ws.to_json_pretty().unwrap().replace("1.5*res", "1.5*nope");
        assert!(matches!(
            Workspace::from_json(&json),
            Err(ModelError::CorruptArtifact { .. })
        ));
    }

    #[test]
    fn test_value_of_derived() {
        let mut ws = punzi();
        ws.set_value("res", 2.0).unwrap();
        assert!((ws.value("resm").unwrap() - 3.0).abs() < 1e-12);
        assert!(matches!(
            ws.set_value("resm", 1.0),
            Err(ModelError::ReadOnlyParameter { .. })
        ));
    }
}
