//! devpulse-analyze - engineering health metrics for Azure DevOps projects
//!
//! Runs one analysis pass over every configured project (or the one given on
//! the command line) and prints the results as JSON on stdout.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use devpulse_core::cache::DiskCache;
use devpulse_core::fetch::AzureHttp;
use devpulse_core::{Config, ProjectAnalyser, ProjectAnalysis, ProjectRef};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "devpulse-analyze")]
#[command(about = "Analyse builds, pull requests, branches and work items of Azure DevOps projects")]
#[command(version)]
struct Args {
    /// Collection (organization) to analyse; requires --project
    #[arg(long, requires = "project")]
    collection: Option<String>,

    /// Project to analyse instead of the configured list; requires --collection
    #[arg(long, requires = "collection")]
    project: Option<String>,

    /// Drop every cached response before fetching
    #[arg(long)]
    refresh: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

impl Args {
    /// Projects named on the command line, falling back to the config file.
    fn projects(&self, config: &Config) -> Vec<ProjectRef> {
        match (&self.collection, &self.project) {
            (Some(collection), Some(project)) => vec![ProjectRef {
                collection: collection.clone(),
                project: project.clone(),
            }],
            _ => config.azure.projects.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config_path = Config::config_path();
    let config_found = config_path.exists();
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        devpulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    if config_found {
        tracing::info!(path = %config_path.display(), "Loaded configuration");
    } else {
        tracing::info!(path = %config_path.display(), "No config file found, using defaults");
    }

    config.validate().context("invalid configuration")?;

    let projects = args.projects(&config);
    if projects.is_empty() {
        anyhow::bail!(
            "No projects to analyse. Add [[azure.projects]] to {} or pass --collection and --project",
            config_path.display()
        );
    }

    let http = Arc::new(AzureHttp::new(&config.azure).context("failed to build HTTP client")?);
    let cache = Arc::new(DiskCache::new(config.cache.resolved_dir(), config.cache.ttl()));

    if args.refresh {
        cache.clear().await.context("failed to clear cache")?;
        tracing::info!(root = %cache.root().display(), "Cache cleared");
    }

    let analyser = ProjectAnalyser::from_config(&config, http, cache)
        .context("failed to set up analyser")?;

    let results = analyser.analyse_all(&projects).await;
    let failed = results.iter().filter(|(_, result)| result.is_err()).count();

    let output = Value::Array(
        results
            .into_iter()
            .map(|(project, result)| project_report(&project, result))
            .collect(),
    );

    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", serde_json::to_string(&output)?);
    }

    if failed > 0 {
        eprintln!(
            "{} of {} project(s) failed; see the logs in {}",
            failed,
            projects.len(),
            Config::state_dir().display()
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

fn project_report(project: &ProjectRef, result: devpulse_core::Result<ProjectAnalysis>) -> Value {
    match result {
        Ok(analysis) => json!({
            "collection": project.collection,
            "project": project.project,
            "analysis": analysis,
        }),
        Err(e) => json!({
            "collection": project.collection,
            "project": project.project,
            "error": e.to_string(),
        }),
    }
}
