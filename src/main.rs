use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use link_import::{
    score, Candidate, CandidateResolver, Destination, FetchOptions, GooglePlacesClient,
    ImportConfig, ResolveRequest, SafeFetcher,
};

#[derive(Parser)]
#[command(name = "link-import", version, about = "Fetch shared links and resolve the places they mention")]
struct Cli {
    /// TOML config file with [fetch] and [resolver] sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a URL through the SSRF guard and print the result as JSON
    Fetch {
        url: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        max_bytes: Option<u64>,
    },
    /// Print the match score of a place name against a query
    Score { query: String, name: String },
    /// Resolve a JSON array of candidates against Google Places
    Resolve {
        #[arg(long)]
        city: String,
        #[arg(long)]
        country: String,
        #[arg(long)]
        candidates: PathBuf,
        #[arg(long)]
        max_operations: Option<usize>,
    },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,link_import=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ImportConfig> {
    match path {
        Some(path) => ImportConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ImportConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Fetch {
            url,
            timeout_ms,
            max_bytes,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let fetcher = SafeFetcher::from_config(config.fetch)?;
            let options = FetchOptions {
                timeout_ms,
                max_bytes,
            };
            match fetcher.fetch(&url, options).await {
                Ok(page) => {
                    print_json(&page)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    print_json(&e)?;
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Score { query, name } => {
            println!("{:.3}", score(&query, &name));
            Ok(ExitCode::SUCCESS)
        }
        Command::Resolve {
            city,
            country,
            candidates,
            max_operations,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let raw = std::fs::read_to_string(&candidates)
                .with_context(|| format!("reading {}", candidates.display()))?;
            let candidates: Vec<Candidate> =
                serde_json::from_str(&raw).context("parsing candidates JSON")?;

            let google = Arc::new(
                GooglePlacesClient::from_env()?.with_max_results(
                    u8::try_from(config.resolver.max_results).unwrap_or(u8::MAX),
                ),
            );
            let resolver = CandidateResolver::new(google.clone(), google, config.resolver);
            let outcome = resolver
                .resolve(ResolveRequest {
                    destination: Destination::new(city, country),
                    candidates,
                    max_operations,
                })
                .await;
            print_json(&outcome)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
