//! Binary entry point for patient-kg.
//!
//! Thin CLI over the library: warm ontology caches, inspect relations, and
//! build a patient's knowledge graph.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output goes to stdout/stderr
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use patient_kg::config::PipelineConfig;
use patient_kg::embedding::FastEmbedEmbedder;
use patient_kg::literature::PubMedClient;
use patient_kg::llm::{RetryPolicy, build_provider};
use patient_kg::models::{EhrVisit, PatientFields};
use patient_kg::observability::{self, LoggingConfig};
use patient_kg::services::{
    FusionService, GraphMerger, OntologyStore, TripleExtractor, ehr_to_triples, patient_context,
};
use patient_kg::storage::TripleArtifactStore;
#[cfg(feature = "usearch-hnsw")]
use patient_kg::storage::UsearchIndex;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Per-patient medical knowledge graph builder.
#[derive(Parser)]
#[command(name = "patient-kg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ontology data directory (overrides configuration).
    #[arg(long, global = true)]
    ontology_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Ontology maintenance and inspection.
    Ontology {
        #[command(subcommand)]
        action: OntologyAction,
    },

    /// Converts EHR visits (JSON array) to triples.
    Ehr {
        /// Path to a JSON array of visits.
        visits: PathBuf,
    },

    /// Builds a patient's knowledge graph.
    Build {
        /// Patient identifier.
        #[arg(long)]
        patient: String,

        /// Free-text patient context.
        #[arg(long, conflicts_with = "fields", required_unless_present = "fields")]
        context: Option<String>,

        /// Path to a JSON file of coded patient fields.
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Directory for per-patient triple artifacts (overrides configuration).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Prints a shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Ontology subcommands.
#[derive(Subcommand)]
enum OntologyAction {
    /// Parses the source files and writes the snapshots.
    Warm,

    /// Lists relations touching a concept.
    Relations {
        /// Concept identifier.
        concept_id: String,
    },

    /// Maps clinical codes to named concepts.
    Codes {
        /// Clinical codes.
        #[arg(required = true)]
        codes: Vec<String>,
    },
}

fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = observability::init(LoggingConfig::from_env(cli.verbose)) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration: file (or default location), then environment overrides.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::load_default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(dir) = &cli.ontology_dir {
        config = config.with_ontology_dir(dir);
    }
    Ok(config)
}

/// Runs the selected command.
fn run_command(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "patient-kg", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ontology { action } => cmd_ontology(&config, action),
        Commands::Ehr { visits } => cmd_ehr(&visits),
        Commands::Build {
            patient,
            context,
            fields,
            output_dir,
        } => {
            let config = match output_dir {
                Some(dir) => config.with_output_dir(dir),
                None => config,
            };
            cmd_build(&config, &patient, context, fields.as_deref())
        },
        Commands::Completions { .. } => Ok(()),
    }
}

fn cmd_ontology(config: &PipelineConfig, action: OntologyAction) -> Result<()> {
    let store = OntologyStore::open(&config.ontology).context("opening ontology")?;

    match action {
        OntologyAction::Warm => {
            println!(
                "{} concepts, {} relation types, {} relations (cache: {})",
                store.concepts().len(),
                store.relation_types().len(),
                store.relation_count(),
                config.ontology.cache_dir().display()
            );
        },
        OntologyAction::Relations { concept_id } => {
            let relations = store.query_relations(&concept_id);
            println!("{}", serde_json::to_string_pretty(&relations)?);
        },
        OntologyAction::Codes { codes } => {
            let matches = store.query_by_codes(&codes)?;
            println!("{}", serde_json::to_string_pretty(&matches)?);
        },
    }
    Ok(())
}

fn cmd_ehr(path: &Path) -> Result<()> {
    let visits: Vec<EhrVisit> = read_json(path)?;
    let triples = ehr_to_triples(&visits);
    println!("{}", serde_json::to_string_pretty(&triples)?);
    Ok(())
}

fn cmd_build(
    config: &PipelineConfig,
    patient_id: &str,
    context: Option<String>,
    fields_path: Option<&Path>,
) -> Result<()> {
    let fields: Option<PatientFields> = fields_path.map(read_json::<PatientFields>).transpose()?;
    let context = match (context, &fields) {
        (Some(text), _) => text,
        (None, Some(fields)) => patient_context(patient_id, fields),
        (None, None) => anyhow::bail!("either --context or --fields is required"),
    };

    let ontology = Arc::new(OntologyStore::open(&config.ontology).context("opening ontology")?);
    let embedder = Arc::new(FastEmbedEmbedder::new().with_batch_size(config.embedding.batch_size));
    let literature = Arc::new(PubMedClient::from_config(&config.literature)?);

    #[cfg(feature = "usearch-hnsw")]
    let fusion = FusionService::<UsearchIndex>::with_index_backend(
        embedder,
        ontology,
        literature,
        config.scoring,
    );
    #[cfg(not(feature = "usearch-hnsw"))]
    let fusion = FusionService::new(embedder, ontology, literature, config.scoring);
    let fusion = fusion
        .with_batch_size(config.embedding.batch_size)
        .with_query_mode(config.literature.query_mode);

    let fused = match &fields {
        Some(fields) => {
            fusion.fuse_with_fields(&context, fields, config.k_ontology, config.k_literature)?
        },
        None => fusion.fuse(&context, config.k_ontology, config.k_literature)?,
    };

    let llm = build_provider(&config.llm)?;
    let mut merger = GraphMerger::new(TripleExtractor::new(llm))
        .with_retry_policy(RetryPolicy::from_config(&config.extraction));
    if let Some(dir) = &config.output_dir {
        merger = merger.with_artifacts(TripleArtifactStore::new(dir));
    }

    let triples = merger.merge(patient_id, &fused, &context)?;
    println!("{}", serde_json::to_string_pretty(&triples)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}
