//! Batch jobs: a TOML description of a model, the objects to attach to it
//! and the datasets to generate.
//!
//! ```toml
//! name = "w"
//! output = "punzi.kmdl"
//! declarations = [
//!     "Gaussian::g1(x[-5,5],m1[-1,-3,3],res[1,0.1,2])",
//!     "Uniform::p_res(res)",
//!     "PROD::joint(g1|res,p_res)",
//! ]
//!
//! [sets]
//! observables = ["x", "res"]
//!
//! [[generate]]
//! pdf = "joint"
//! observables = "observables"
//! count = 2000
//! dataset = "sample"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ModelError, ModelResult};
use crate::sampler::SamplerConfig;
use crate::storage::PersistConfig;
use crate::workspace::Workspace;

/// Top-level job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Workspace name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Artifact path written at the end of the run.
    pub output: PathBuf,

    /// Factory declarations, applied in order.
    pub declarations: Vec<String>,

    /// Named observable sets.
    #[serde(default)]
    pub sets: BTreeMap<String, Vec<String>>,

    /// Values assigned to free parameters after the model is built.
    #[serde(default)]
    pub values: BTreeMap<String, f64>,

    /// Snapshots taken after values are assigned.
    #[serde(default)]
    pub snapshots: Vec<SnapshotRequest>,

    /// Datasets to generate and import.
    #[serde(default)]
    pub generate: Vec<GenerateRequest>,

    /// Sampler settings.
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Artifact settings.
    #[serde(default)]
    pub persist: PersistConfig,
}

fn default_name() -> String {
    "workspace".to_string()
}

/// A snapshot request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRequest {
    /// Snapshot name.
    pub name: String,
    /// Free parameters to capture.
    pub parameters: Vec<String>,
}

/// Observables of a generation request: a set name or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservableList {
    /// Name of a set declared under `[sets]`.
    Set(String),
    /// Variable names.
    List(Vec<String>),
}

/// A generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// PDF to draw from.
    pub pdf: String,
    /// Columns of the dataset.
    pub observables: ObservableList,
    /// Number of observations.
    pub count: usize,
    /// Name the dataset is imported under.
    pub dataset: String,
    /// Fixed seed; a fresh entropy seed is used when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Job {
    /// Reads and validates a job file.
    pub fn from_file(path: &Path) -> ModelResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::io(format!("reading {}", path.display()), e))?;
        Self::from_toml(&content)
    }

    /// Parses and validates job text.
    pub fn from_toml(content: &str) -> ModelResult<Self> {
        let job: Self = toml::from_str(content).map_err(|e| ModelError::InvalidConfig {
            reason: e.to_string(),
        })?;
        job.validate()?;
        Ok(job)
    }

    /// Checks settings that do not need the model.
    pub fn validate(&self) -> ModelResult<()> {
        self.sampler.validate()?;
        self.persist.validate()?;
        if self.declarations.is_empty() {
            return Err(ModelError::InvalidConfig {
                reason: "job has no declarations".to_string(),
            });
        }
        for request in &self.generate {
            if request.count == 0 {
                return Err(ModelError::InvalidConfig {
                    reason: format!("dataset '{}' requests zero observations", request.dataset),
                });
            }
        }
        Ok(())
    }

    /// Builds the workspace the job describes. Nothing is written to disk.
    pub fn build(&self) -> ModelResult<Workspace> {
        let mut ws = Workspace::new(self.name.clone()).with_config(self.sampler.clone(), self.persist)?;
        for decl in &self.declarations {
            ws.declare(decl)?;
        }
        for (name, members) in &self.sets {
            ws.define_set(name, members)?;
        }
        for (name, value) in &self.values {
            ws.set_value(name, *value)?;
        }
        for snap in &self.snapshots {
            ws.save_snapshot(&snap.name, &snap.parameters)?;
        }
        for request in &self.generate {
            let observables = match &request.observables {
                ObservableList::Set(set) => ws.set(set)?.to_vec(),
                ObservableList::List(list) => list.clone(),
            };
            let dataset = match request.seed {
                Some(seed) => ws.generate_seeded(&request.pdf, &observables, request.count, seed)?,
                None => ws.generate(&request.pdf, &observables, request.count, &mut rand::thread_rng())?,
            };
            ws.import_dataset(dataset.renamed(request.dataset.clone()))?;
        }
        Ok(ws)
    }

    /// Builds the workspace and saves it to `output`.
    pub fn run(&self) -> ModelResult<Workspace> {
        let ws = self.build()?;
        let bytes = ws.save(&self.output)?;
        info!(job = %self.name, output = %self.output.display(), bytes, "job complete");
        Ok(ws)
    }

    /// Example job reproducing the two-category resolution model.
    #[must_use]
    pub const fn example() -> &'static str {
        EXAMPLE_JOB
    }
}

const EXAMPLE_JOB: &str = r#"# kyromodel job file
name = "w"
output = "punzi.kmdl"

declarations = [
    "Gaussian::_g1(x[-5,5],_m1[-1,-3,3],res[1,0.1,2])",
    "Gaussian::_g2(x,_m2[1,-3,3],expr::_resm('1.5*res',{res}))",
    "Uniform::_p_res(res)",
    "SUM::_punzi_model(_f[0.3,0,1]*PROD::_cat1(_g1|res,_p_res),PROD::_cat2(_g2|res,_p_res))",
]

[sets]
observables = ["x", "res"]

[[snapshots]]
name = "param_point"
parameters = ["_f", "_m1", "_m2"]

[[generate]]
pdf = "_punzi_model"
observables = "observables"
count = 2000
dataset = "punzi_example"
# seed = 42

[sampler]
max_truncation_attempts = 10000

[persist]
sync_on_write = true
"#;
