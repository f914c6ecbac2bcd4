//! Build statistics per repository and pipeline definition

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::status::{BuildStatus, PipelineStatus};
use super::week::{add_histograms, WeekBucketer};
use super::Combine;
use crate::format::{format_duration_ms, percentage};
use crate::types::{is_default_branch, Build, BuildDefinition};

/// Running totals for one pipeline definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub name: String,
    pub url: String,
    pub count: u64,
    pub success: u64,
    /// One sample per build, in milliseconds
    pub durations: Vec<i64>,
    pub builds_by_week: Vec<u32>,
    pub successes_by_week: Vec<u32>,
    pub status: BuildStatus,
}

impl BuildStats {
    pub fn empty(weeks: &WeekBucketer) -> Self {
        Self {
            builds_by_week: weeks.empty_histogram(),
            successes_by_week: weeks.empty_histogram(),
            ..Default::default()
        }
    }

    /// Summary of a single build.
    pub fn from_build(build: &Build, weeks: &WeekBucketer) -> Self {
        let mut stats = Self::empty(weeks);
        stats.add(build, weeks);
        stats
    }

    /// Fold one build into the running totals.
    pub fn add(&mut self, build: &Build, weeks: &WeekBucketer) {
        let succeeded = build.is_success();

        if self.name.is_empty() {
            self.name = build.definition.name.clone();
            self.url = definition_web_url(&build.definition.url);
        }
        self.count += 1;
        if succeeded {
            self.success += 1;
        }
        self.durations.push(build.duration_ms());

        if let Some(finished) = build.finish_time {
            weeks.record(&mut self.builds_by_week, finished);
            if succeeded {
                weeks.record(&mut self.successes_by_week, finished);
            }
            let status = if succeeded {
                BuildStatus::Succeeded { latest: finished }
            } else {
                BuildStatus::Failed { since: finished }
            };
            self.status = status.merge(self.status);
        }
    }

    pub fn success_rate(&self) -> u32 {
        success_rate(self.success, self.count)
    }

    pub fn duration(&self) -> DurationSummary {
        DurationSummary::from_samples(&self.durations)
    }
}

impl Combine for BuildStats {
    fn combine(mut self, other: Self) -> Self {
        if self.name.is_empty() {
            self.name = other.name;
            self.url = other.url;
        }
        self.count += other.count;
        self.success += other.success;
        self.durations.extend(other.durations);
        self.builds_by_week = add_histograms(&self.builds_by_week, &other.builds_by_week);
        self.successes_by_week = add_histograms(&self.successes_by_week, &other.successes_by_week);
        self.status = self.status.merge(other.status);
        self
    }
}

/// Rounded success percentage; `0` when there were no builds.
pub fn success_rate(success: u64, count: u64) -> u32 {
    percentage(success, count)
}

/// Human-readable average, min and max of a set of durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DurationSummary {
    pub average: String,
    pub min: String,
    pub max: String,
}

impl DurationSummary {
    /// `"0"` everywhere when there are no samples.
    pub fn from_samples(samples: &[i64]) -> Self {
        let (Some(min), Some(max)) = (samples.iter().min(), samples.iter().max()) else {
            return Self::zero();
        };
        let average = samples.iter().sum::<i64>() / samples.len() as i64;

        Self {
            average: format_duration_ms(average),
            min: format_duration_ms(*min),
            max: format_duration_ms(*max),
        }
    }

    pub fn zero() -> Self {
        Self {
            average: "0".to_string(),
            min: "0".to_string(),
            max: "0".to_string(),
        }
    }
}

/// Turns a definition's REST URL into the page a person would open.
pub fn definition_web_url(api_url: &str) -> String {
    let url = api_url.replace("_apis/build/Definitions/", "_build/definition?definitionId=");
    match url.find("?revision=") {
        Some(idx) => url[..idx].to_string(),
        None => url,
    }
}

/// Result of one pass over a project's builds.
#[derive(Debug, Default)]
pub struct AggregatedBuilds {
    /// repo id -> definition id -> stats
    pub stats_by_repo: HashMap<String, BTreeMap<u64, BuildStats>>,
    /// repo id -> definition id -> most recent default-branch build
    pub latest_default_branch: HashMap<String, BTreeMap<u64, Build>>,
}

/// Fold builds, most recently finished first.
pub fn aggregate_builds(builds: &[Build], weeks: &WeekBucketer) -> AggregatedBuilds {
    let mut sorted: Vec<&Build> = builds.iter().collect();
    // None sorts before Some, so reversing puts unfinished builds last
    sorted.sort_by(|a, b| b.finish_time.cmp(&a.finish_time));

    let mut aggregated = AggregatedBuilds::default();

    for build in sorted {
        let repo_id = build.repo_id();
        let definition_id = build.definition.id;

        aggregated
            .stats_by_repo
            .entry(repo_id.to_string())
            .or_default()
            .entry(definition_id)
            .or_insert_with(|| BuildStats::empty(weeks))
            .add(build, weeks);

        if is_default_branch(&build.source_branch) {
            aggregated
                .latest_default_branch
                .entry(repo_id.to_string())
                .or_default()
                .entry(definition_id)
                .or_insert_with(|| build.clone());
        }
    }

    aggregated
}

/// One row of a repository's pipeline list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPipeline {
    pub definition_id: u64,
    pub name: String,
    pub url: String,
    pub count: u64,
    pub success: u64,
    pub success_rate: u32,
    pub duration: DurationSummary,
    pub status: PipelineStatus,
    /// `ui` for designer pipelines, `yml` for YAML ones
    #[serde(rename = "type")]
    pub pipeline_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub builds_by_week: Vec<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub successes_by_week: Vec<u32>,
}

/// Pipelines of one repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepoBuilds {
    pub count: u64,
    pub pipelines: Vec<BuildPipeline>,
}

fn pipeline_type(definition: Option<&BuildDefinition>) -> &'static str {
    match definition {
        Some(d) if !d.is_yaml() => "ui",
        _ => "yml",
    }
}

impl AggregatedBuilds {
    /// Pipelines with builds in the window (by definition id), then the
    /// repository's definitions without any, oldest last build first.
    /// `None` when the repository has neither.
    pub fn pipelines_for_repo(&self, repo_id: &str, definitions: &[BuildDefinition]) -> Option<RepoBuilds> {
        let repo_definitions: Vec<&BuildDefinition> = definitions
            .iter()
            .filter(|d| d.repository.as_ref().is_some_and(|r| r.id == repo_id))
            .collect();
        let active = self.stats_by_repo.get(repo_id);

        if active.is_none() && repo_definitions.is_empty() {
            return None;
        }

        let mut pipelines: Vec<BuildPipeline> = active
            .into_iter()
            .flatten()
            .map(|(definition_id, stats)| BuildPipeline {
                definition_id: *definition_id,
                name: stats.name.clone(),
                url: stats.url.clone(),
                count: stats.count,
                success: stats.success,
                success_rate: stats.success_rate(),
                duration: stats.duration(),
                status: stats.status.into(),
                pipeline_type: pipeline_type(
                    repo_definitions.iter().copied().find(|d| d.id == *definition_id),
                ),
                builds_by_week: stats.builds_by_week.clone(),
                successes_by_week: stats.successes_by_week.clone(),
            })
            .collect();

        let mut unused: Vec<(DateTime<Utc>, &BuildDefinition)> = repo_definitions
            .iter()
            .filter(|d| !active.is_some_and(|a| a.contains_key(&d.id)))
            .map(|d| {
                let since = d
                    .latest_build
                    .as_ref()
                    .and_then(|b| b.start_time)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                (since, *d)
            })
            .collect();
        unused.sort_by_key(|(since, _)| *since);

        pipelines.extend(unused.into_iter().map(|(since, d)| BuildPipeline {
            definition_id: d.id,
            name: d.name.clone(),
            url: definition_web_url(&d.url),
            count: 0,
            success: 0,
            success_rate: 0,
            duration: DurationSummary::zero(),
            status: PipelineStatus::Unused { since },
            pipeline_type: pipeline_type(Some(d)),
            builds_by_week: vec![],
            successes_by_week: vec![],
        }));

        Some(RepoBuilds {
            count: pipelines.iter().map(|p| p.count).sum(),
            pipelines,
        })
    }

    /// Latest default-branch build of every pipeline in a repository.
    pub fn latest_builds_for_repo(&self, repo_id: &str) -> Vec<&Build> {
        self.latest_default_branch
            .get(repo_id)
            .map(|by_definition| by_definition.values().collect())
            .unwrap_or_default()
    }
}
