use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quarry::config::{CONFIG_DIR, SETTINGS_FILE};
use quarry::semantic::{EmbeddingGenerator, FastEmbedGenerator};
use quarry::vector::VectorStore;
use quarry::{
    EmbeddingError, IndexReport, RetrieveError, Retriever, ScoredFragment, Settings, logging,
};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(version, about = "Semantic retrieval over source trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration in the current directory
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Chunk, embed and index files (the workspace root when no paths are given)
    Index {
        /// Files or directories to index
        paths: Vec<PathBuf>,

        /// Discard the saved index and build a new one
        #[arg(long)]
        rebuild: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the fragments most similar to a query
    Query {
        /// Query text
        text: String,

        /// Number of results
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what the saved index contains
    Status,

    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });
    logging::init_with_config(&settings.logging);

    match run(cli.command, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("Failed to initialize configuration")?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(())
        }

        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&settings).context("Failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }

        Commands::Status => {
            let index_path = settings.resolve(&settings.index_path);
            if !VectorStore::exists(&index_path) {
                println!("No index at {}", index_path.display());
                println!("Run `quarry index` to build one.");
                return Ok(());
            }
            let store = VectorStore::open(&index_path, settings.vector.index_config())
                .with_context(|| format!("Failed to open index at {}", index_path.display()))?;
            println!("Index:      {}", index_path.display());
            println!("Entries:    {}", store.len());
            println!("Variant:    {}", store.variant());
            println!("Dimension:  {}", store.dimension());
            println!("Model:      {}", store.model().unwrap_or("unknown"));
            Ok(())
        }

        Commands::Index {
            paths,
            rebuild,
            json,
        } => {
            let (retriever, report) = if rebuild {
                // a corrupt index must not block its own replacement
                let mut retriever = Retriever::configured(&settings, generator(&settings)?)?;
                let report = retriever.rebuild(&paths)?;
                (retriever, report)
            } else {
                let mut retriever = Retriever::from_settings(&settings, generator(&settings)?)?;
                let report = retriever.index_source_tree(&paths)?;
                (retriever, report)
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, &retriever);
            }
            Ok(())
        }

        Commands::Query { text, limit, json } => {
            let retriever = Retriever::from_settings(&settings, generator(&settings)?)?;
            let results = retriever.query(&text, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&text, &results);
            }
            Ok(())
        }
    }
}

fn generator(settings: &Settings) -> Result<Arc<dyn EmbeddingGenerator>> {
    let models_dir = settings
        .semantic
        .models_dir
        .as_ref()
        .map(|dir| settings.resolve(dir));
    let generator = FastEmbedGenerator::new(
        &settings.semantic.model,
        models_dir.as_deref(),
        settings.semantic.show_download_progress,
    )?;
    Ok(Arc::new(generator))
}

fn print_report(report: &IndexReport, retriever: &Retriever) {
    println!(
        "Indexed {} files into {} fragments ({})",
        report.files_chunked, report.fragments, report.mode
    );
    println!("  Embedded:         {}", report.embedded);
    if report.skipped_existing > 0 {
        println!("  Already indexed:  {}", report.skipped_existing);
    }
    if report.skipped_blank > 0 {
        println!("  Blank skipped:    {}", report.skipped_blank);
    }
    println!(
        "  Cache:            {} hits, {} misses",
        report.cache.hits, report.cache.misses
    );
    if report.cache.write_failures > 0 {
        println!("  Cache writes failed: {}", report.cache.write_failures);
    }
    println!("  Total entries:    {}", report.total);
    println!("\nIndex saved to: {}", retriever.index_path().display());
}

fn print_results(text: &str, results: &[ScoredFragment]) {
    if results.is_empty() {
        println!("No results for: {text}");
        return;
    }
    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{}. {}:{}-{} {} {} (score {:.3})",
            rank + 1,
            hit.path,
            hit.start_line,
            hit.end_line,
            hit.kind,
            hit.name,
            hit.score
        );
    }
}

fn report_error(error: &anyhow::Error) {
    eprintln!("Error: {error:#}");

    if error
        .downcast_ref::<EmbeddingError>()
        .is_some_and(EmbeddingError::is_configuration)
    {
        eprintln!("Check the [semantic] section of {CONFIG_DIR}/{SETTINGS_FILE}.");
        return;
    }
    let Some(error) = error.downcast_ref::<RetrieveError>() else {
        return;
    };
    if error.is_first_run() {
        eprintln!("No index found. Run `quarry index` first.");
    } else if error.needs_rebuild() {
        eprintln!("The saved index is unusable. Run `quarry index --rebuild`.");
    } else if error.is_configuration() {
        eprintln!("Check the [semantic] section of {CONFIG_DIR}/{SETTINGS_FILE}.");
    }
}
