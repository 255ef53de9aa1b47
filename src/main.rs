use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rust_queryconv::project::{parse_project, QuerySource, ReportSummary};
use rust_queryconv::{convert_project, convert_query_source, ConvertOptions, DatabaseDialect};

#[derive(Parser)]
#[command(name = "rust-queryconv")]
#[command(author, version, about = "Convert JPA repository queries into native SQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every query of a project file
    Convert {
        /// Path to the project JSON file
        #[arg(short, long)]
        project: PathBuf,

        /// Output path for the JSON report (printed to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target dialect (oracle, postgresql, pg) or a JDBC URL; overrides the project
        #[arg(short, long, value_parser = parse_dialect)]
        dialect: Option<DatabaseDialect>,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Convert a single query against a project's entities
    Query {
        /// Path to the project JSON file
        #[arg(short, long)]
        project: PathBuf,

        /// JPQL/HQL query text
        #[arg(long, conflicts_with = "method")]
        jpql: Option<String>,

        /// Repository method name, e.g. findByAgeGreaterThan
        #[arg(long, requires = "entity")]
        method: Option<String>,

        /// Entity the repository method belongs to
        #[arg(long)]
        entity: Option<String>,

        /// Method parameter names, in declaration order
        #[arg(long = "param")]
        params: Vec<String>,

        /// Target dialect; overrides the project
        #[arg(short, long, value_parser = parse_dialect)]
        dialect: Option<DatabaseDialect>,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn parse_dialect(value: &str) -> Result<DatabaseDialect, String> {
    value.parse().map_err(|e: rust_queryconv::error::ProjectError| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            project,
            output,
            dialect,
            verbose,
        } => {
            init_tracing(verbose);
            let options = ConvertOptions {
                project_path: project,
                dialect,
                output_path: output,
            };

            let reports = convert_project(&options)?;
            if options.output_path.is_none() {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            }
            let summary = ReportSummary::of(&reports);
            eprintln!(
                "Converted {} of {} queries ({} failed)",
                summary.converted,
                reports.len(),
                summary.failed
            );
        }
        Commands::Query {
            project,
            jpql,
            method,
            entity,
            params,
            dialect,
            verbose,
        } => {
            init_tracing(verbose);
            let project = parse_project(&project)?;
            let dialect = match dialect {
                Some(dialect) => dialect,
                None => project.target_dialect()?,
            };
            let metadata = rust_queryconv::model::resolve_entities(project.entities)?;

            let source = match (jpql, method, entity) {
                (Some(query), _, _) => QuerySource::Jpql {
                    name: "query".to_string(),
                    query,
                },
                (None, Some(method), Some(entity)) => QuerySource::Method {
                    name: method.clone(),
                    method,
                    entity,
                    parameters: params,
                },
                _ => bail!("either --jpql or --method with --entity is required"),
            };

            let report = convert_query_source(&source, &metadata, dialect);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
