mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnemos::config::MnemosConfig;

#[derive(Parser)]
#[command(name = "mnemos", version, about = "Hybrid retrieval ranking for AI agent memory")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank records for a query (BM25 + full text + triggers + degree, fused)
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Match a prompt against trigger phrases and report signals
    Triggers {
        prompt: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Graph degree boost for the given record ids
    Degree {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Classify a query and show its token budget
    Budget { query: String },
    /// Add or update a record
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Trigger phrase (repeatable)
        #[arg(long = "trigger")]
        triggers: Vec<String>,
        #[arg(long, default_value = "")]
        path: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        importance: Option<f64>,
        #[arg(long, default_value = "normal")]
        tier: String,
    },
    /// Add or re-weight a typed edge between two records
    Relate {
        source: String,
        target: String,
        #[arg(long, default_value = "supports")]
        relation: String,
        #[arg(long, default_value_t = 1.0)]
        strength: f64,
    },
    /// Lexical index and trigger cache statistics
    Stats,
    /// Run database diagnostics
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MnemosConfig::load()?;

    // Log to stderr so stdout carries only command output.
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    match cli.command {
        Command::Search { query, limit } => cli::search::search(&config, &query, limit, json)?,
        Command::Triggers { prompt, limit } => cli::triggers::triggers(&config, &prompt, limit, json)?,
        Command::Degree { ids } => cli::degree::degree(&config, &ids, json)?,
        Command::Budget { query } => cli::budget::budget(&config, &query, json)?,
        Command::Add {
            title,
            body,
            triggers,
            path,
            id,
            importance,
            tier,
        } => {
            let input = cli::records::AddInput {
                id,
                title,
                body,
                triggers,
                path,
                importance,
                tier,
            };
            cli::records::add(&config, input)?
        }
        Command::Relate {
            source,
            target,
            relation,
            strength,
        } => cli::records::relate(&config, &source, &target, &relation, strength)?,
        Command::Stats => cli::stats::stats(&config, json)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
