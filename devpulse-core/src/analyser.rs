//! One analysis pass over a project
//!
//! Fetches every project-level resource concurrently, folds them with the
//! stats combinators, then analyses all repositories concurrently. A
//! repository that fails to analyse is reported as [`RepoOutcome::Failed`]
//! and doesn't affect its siblings; a failing project-level fetch fails the
//! project. [`ProjectAnalyser::analyse_all`] runs several projects
//! independently of each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::future::{join_all, try_join_all};
use serde::Serialize;

use crate::cache::DiskCache;
use crate::config::{Config, ProjectRef};
use crate::error::{Error, Result};
use crate::fetch::{AzureApi, HttpGet, PagedFetcher, ProjectApi};
use crate::stats::{
    aggregate_branches, aggregate_builds, aggregate_commits, aggregate_prs, aggregate_releases,
    aggregate_test_runs, tests_for_repo, AggregatedBuilds, BranchSummary, CommitStats, PrStats,
    PrSummary, ReleaseStats, RepoBuilds, TestRunIndex, TestSummary, WeekBucketer,
};
use crate::types::{BuildDefinition, CodeCoverage, Repository, WorkItemQueryResult, WorkItemType};
use crate::workitems::{self, WorkItemAnalysis};

/// Everything known about one repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAnalysis {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub default_branch: String,
    pub builds: Option<RepoBuilds>,
    pub branches: BranchSummary,
    pub commits: CommitStats,
    pub prs: Option<PrSummary>,
    pub tests: Option<TestSummary>,
}

/// Result of analysing one repository.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RepoOutcome {
    Analysed(RepoAnalysis),
    Failed { id: String, name: String, error: String },
}

impl RepoOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RepoOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalysis {
    pub collection: String,
    pub project: String,
    pub analysed_at: DateTime<Utc>,
    pub weeks: usize,
    pub repos: Vec<RepoOutcome>,
    pub releases: Vec<ReleaseStats>,
    pub work_items: Option<WorkItemAnalysis>,
    pub elapsed_ms: u64,
}

/// Project-level data shared by every repository analysis.
struct ProjectContext {
    builds: AggregatedBuilds,
    definitions: Vec<BuildDefinition>,
    test_runs: TestRunIndex,
    prs: HashMap<String, PrStats>,
    weeks: WeekBucketer,
}

pub struct ProjectAnalyser {
    api: AzureApi,
    lookback: Duration,
    work_item_query: Option<String>,
}

impl ProjectAnalyser {
    pub fn new(api: AzureApi, lookback: Duration, work_item_query: Option<String>) -> Self {
        Self {
            api,
            lookback,
            work_item_query,
        }
    }

    /// Wire the fetch stack from configuration around an HTTP client and cache.
    pub fn from_config(config: &Config, http: Arc<dyn HttpGet>, cache: Arc<DiskCache>) -> Result<Self> {
        let base_url = config
            .azure
            .base_url()
            .ok_or_else(|| Error::Config("azure.host is required".to_string()))?;
        let lookback = config.analysis.lookback();
        let fetcher = Arc::new(PagedFetcher::new(http, cache, config.analysis.page_size));
        let api = AzureApi::new(fetcher, base_url, Utc::now() - lookback);

        Ok(Self::new(api, lookback, config.work_items.query_id.clone()))
    }

    /// Analyse one project. Fails if any project-level resource can't be
    /// fetched; per-repository failures are captured in the result.
    pub async fn analyse(&self, project: &ProjectRef) -> Result<ProjectAnalysis> {
        let started = Instant::now();
        let now = Utc::now();
        let weeks = WeekBucketer::for_lookback(now, self.lookback);
        let api = self.api.for_project(project);

        tracing::info!(project = %project, "Starting analysis");

        let (repos, builds, definitions, test_runs, releases, prs, work_item_query) = tokio::try_join!(
            api.repositories(),
            api.builds(),
            api.build_definitions(),
            api.test_runs(),
            api.releases(),
            api.pull_requests(),
            self.fetch_work_item_query(&api),
        )?;

        tracing::debug!(
            project = %project,
            repos = repos.len(),
            builds = builds.len(),
            prs = prs.len(),
            "Fetched project resources"
        );

        let context = ProjectContext {
            builds: aggregate_builds(&builds, &weeks),
            definitions,
            test_runs: aggregate_test_runs(test_runs),
            prs: aggregate_prs(&prs, self.api.since(), &weeks),
            weeks,
        };

        let repos: Vec<RepoOutcome> =
            join_all(repos.iter().map(|repo| self.repo_outcome(&api, repo, &context))).await;

        let work_items = match work_item_query {
            Some((relations, types)) => {
                Some(workitems::aggregate(&relations.work_item_relations, &types, &api).await?)
            }
            None => None,
        };

        let failed = repos.iter().filter(|r| r.is_failed()).count();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            project = %project,
            repos = repos.len(),
            failed,
            elapsed_ms,
            "Finished analysis"
        );

        Ok(ProjectAnalysis {
            collection: project.collection.clone(),
            project: project.project.clone(),
            analysed_at: now,
            weeks: weeks.weeks(),
            repos,
            releases: aggregate_releases(&releases),
            work_items,
            elapsed_ms,
        })
    }

    /// Analyse every project independently; one failure never hides another
    /// project's result.
    pub async fn analyse_all(&self, projects: &[ProjectRef]) -> Vec<(ProjectRef, Result<ProjectAnalysis>)> {
        let results = join_all(projects.iter().map(|project| self.analyse(project))).await;

        projects
            .iter()
            .cloned()
            .zip(results)
            .inspect(|(project, result)| {
                if let Err(e) = result {
                    tracing::warn!(project = %project, error = %e, "Project analysis failed");
                }
            })
            .collect()
    }

    async fn fetch_work_item_query(
        &self,
        api: &ProjectApi,
    ) -> Result<Option<(WorkItemQueryResult, Vec<WorkItemType>)>> {
        let Some(query_id) = &self.work_item_query else {
            return Ok(None);
        };
        let (relations, types) = tokio::try_join!(api.work_item_query(query_id), api.work_item_types())?;
        Ok(Some((relations, types)))
    }

    async fn repo_outcome(&self, api: &ProjectApi, repo: &Repository, context: &ProjectContext) -> RepoOutcome {
        match analyse_repo(api, repo, context).await {
            Ok(analysis) => RepoOutcome::Analysed(analysis),
            Err(e) => {
                tracing::warn!(repo = %repo.name, error = %e, "Repository analysis failed");
                RepoOutcome::Failed {
                    id: repo.id.clone(),
                    name: repo.name.clone(),
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn analyse_repo(api: &ProjectApi, repo: &Repository, context: &ProjectContext) -> Result<RepoAnalysis> {
    let latest_builds = context.builds.latest_builds_for_repo(&repo.id);
    // Empty repositories have no branches or commits to ask for
    let is_empty = repo.size == 0;

    let (branch_stats, commits, coverage) = tokio::try_join!(
        async {
            if is_empty {
                Ok(vec![])
            } else {
                api.branch_stats(&repo.id).await
            }
        },
        async {
            if is_empty {
                Ok(vec![])
            } else {
                api.commits(&repo.id).await
            }
        },
        try_join_all(latest_builds.iter().map(|build| async move {
            let coverage = api.test_coverage(build.id).await?;
            Ok::<(u64, CodeCoverage), Error>((build.id, coverage))
        })),
    )?;

    let coverage: HashMap<u64, CodeCoverage> = coverage.into_iter().collect();
    let repo_url = repo.web_url.clone().unwrap_or_default();

    Ok(RepoAnalysis {
        id: repo.id.clone(),
        name: repo.name.clone(),
        url: repo.web_url.clone(),
        default_branch: repo.default_branch_name(),
        builds: context.builds.pipelines_for_repo(&repo.id, &context.definitions),
        branches: aggregate_branches(
            &repo_url,
            repo.default_branch.as_deref(),
            &branch_stats,
            context.weeks.now(),
        ),
        commits: aggregate_commits(&commits, &context.weeks),
        prs: context.prs.get(&repo.id).map(PrStats::summary),
        tests: tests_for_repo(&repo.id, &context.builds, &context.test_runs, &coverage),
    })
}
