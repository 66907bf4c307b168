//! kyromodel CLI - build, sample and inspect model workspaces.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kyromodel::{Job, ObjectRef, Workspace};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "kyromodel")]
#[command(author = "KyroDB Team <kishan@kyrodb.com>")]
#[command(version)]
#[command(about = "Build probability models from factory declarations, sample them and save workspaces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a TOML job: build the model, take snapshots, generate datasets, save
    Run {
        /// Path to the job file
        job: PathBuf,

        /// Override the job's output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the objects stored in an artifact
    Inspect {
        /// Path to the artifact
        artifact: PathBuf,

        /// Dump the whole workspace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an example job file
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn describe(ws: &Workspace) {
    println!("workspace '{}' (created {})", ws.name(), ws.created_at());
    println!("\nparameters:");
    for p in ws.symbols().parameters() {
        match (p.bounds(), p.formula()) {
            (Some(b), _) => println!(
                "  {:<16} = {:<10} [{}, {}]",
                p.name,
                p.value().unwrap_or(f64::NAN),
                b.lower,
                b.upper
            ),
            (None, Some(f)) => println!(
                "  {:<16} = {:<10} ({} of {})",
                p.name,
                ws.value(&p.name)
                    .map_or_else(|e| format!("<{e}>"), |v| v.to_string()),
                f.source(),
                f.dependencies().join(", ")
            ),
            (None, None) => println!("  {}", p.name),
        }
    }
    println!("\npdfs:");
    for pdf in ws.symbols().pdfs() {
        println!(
            "  {:<16} {:<17} {}",
            pdf.name,
            pdf.pdf_type().to_string(),
            pdf.dependencies().join(", ")
        );
    }
    let sets: Vec<&str> = ws.set_names().collect();
    if !sets.is_empty() {
        println!("\nsets:");
        for name in sets {
            if let Some(ObjectRef::Set(members)) = ws.object(name) {
                println!("  {name:<16} ({})", members.join(", "));
            }
        }
    }
    let snapshots: Vec<&str> = ws.snapshot_names().collect();
    if !snapshots.is_empty() {
        println!("\nsnapshots:");
        for name in snapshots {
            if let Some(snap) = ws.snapshot(name) {
                let values: Vec<String> = snap
                    .values()
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                println!("  {name:<16} {}", values.join(", "));
            }
        }
    }
    let datasets: Vec<_> = ws.datasets().collect();
    if !datasets.is_empty() {
        println!("\ndatasets:");
        for d in datasets {
            println!(
                "  {:<16} {} rows ({})",
                d.name(),
                d.len(),
                d.variables().join(", ")
            );
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            println!("{}", Job::example());
        }

        Commands::Run { job, output } => {
            let mut job_file = Job::from_file(&job)
                .with_context(|| format!("Failed to load job from {job:?}"))?;
            if let Some(output) = output {
                job_file.output = output;
            }
            let ws = job_file
                .run()
                .with_context(|| format!("Job {job:?} failed"))?;
            info!(
                datasets = ws.datasets().count(),
                output = %job_file.output.display(),
                "workspace written"
            );
        }

        Commands::Inspect { artifact, json } => {
            let ws = Workspace::load(&artifact)
                .with_context(|| format!("Failed to load artifact {artifact:?}"))?;
            if json {
                println!("{}", ws.to_json_pretty()?);
            } else {
                describe(&ws);
            }
        }
    }

    Ok(())
}
