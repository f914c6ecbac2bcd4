//! # devpulse-core
//!
//! Core library for devpulse - engineering health metrics from Azure DevOps.
//!
//! This library provides:
//! - Raw API types for repositories, builds, commits, pull requests, branches,
//!   test runs, releases and work items
//! - A TTL-gated disk cache and a paginated fetcher on top of it
//! - Statistical combinators that fold raw records into per-entity summaries
//! - Work-item hierarchy analysis
//! - The project analyser that ties everything together
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Fetch:** [`fetch::HttpGet`] → [`fetch::PagedFetcher`] → [`fetch::AzureApi`],
//!   every response stored in the [`cache::DiskCache`]
//! - **Aggregate:** [`stats`] and [`workitems`] reduce raw records to summaries
//! - **Analyse:** [`ProjectAnalyser`] runs both for a project and assembles a
//!   [`ProjectAnalysis`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use devpulse_core::cache::DiskCache;
//! use devpulse_core::fetch::AzureHttp;
//! use devpulse_core::{Config, ProjectAnalyser};
//!
//! # async fn run() -> devpulse_core::Result<()> {
//! let config = Config::load()?;
//! let http = Arc::new(AzureHttp::new(&config.azure)?);
//! let cache = Arc::new(DiskCache::new(config.cache.resolved_dir(), config.cache.ttl()));
//! let analyser = ProjectAnalyser::from_config(&config, http, cache)?;
//!
//! for (project, result) in analyser.analyse_all(&config.azure.projects).await {
//!     println!("{}: {}", project, result.is_ok());
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use analyser::{ProjectAnalyser, ProjectAnalysis, RepoAnalysis, RepoOutcome};
pub use config::{Config, ProjectRef};
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analyser;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod format;
pub mod logging;
pub mod stats;
pub mod types;
pub mod workitems;
