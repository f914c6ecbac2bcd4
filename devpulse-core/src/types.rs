//! Raw records pulled from the Azure DevOps REST API
//!
//! These types mirror the JSON returned by the remote API (camelCase, with
//! work-item fields keyed by their `System.*` reference names). They are
//! immutable facts: the stats combinators only read them.
//!
//! Every record carries an owning-entity identifier (repository id,
//! definition id, work-item id) and at least one timestamp used for
//! week-bucketing and recency ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Work-item identifiers are numeric in Azure DevOps.
pub type WorkItemId = u64;

/// Branch names considered the default branch for build recency tracking.
pub const DEFAULT_BRANCH_REFS: [&str; 2] = ["refs/heads/master", "refs/heads/main"];

/// Returns true when a full ref name points at a default branch.
pub fn is_default_branch(source_branch: &str) -> bool {
    DEFAULT_BRANCH_REFS.contains(&source_branch)
}

// ============================================
// Repositories
// ============================================

/// A git repository in a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub name: String,
    /// Browser URL for the repository
    #[serde(default)]
    pub web_url: Option<String>,
    /// Full ref of the default branch (`refs/heads/main`); absent for empty repos
    #[serde(default)]
    pub default_branch: Option<String>,
    /// Repository size in bytes; 0 for empty repositories
    #[serde(default)]
    pub size: u64,
}

impl Repository {
    /// Default branch without the `refs/heads/` prefix.
    pub fn default_branch_name(&self) -> String {
        self.default_branch
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches("refs/heads/")
            .to_string()
    }
}

// ============================================
// Builds
// ============================================

/// Final outcome of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildResult {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Canceled,
    #[serde(other)]
    None,
}

/// Reference to the pipeline definition that produced a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionReference {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// Repository a build or definition points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRepository {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: u64,
    #[serde(default)]
    pub result: Option<BuildResult>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_branch: String,
    pub definition: DefinitionReference,
    #[serde(default)]
    pub repository: Option<BuildRepository>,
}

impl Build {
    /// Owning repository id, or `<unknown>` for builds without one.
    pub fn repo_id(&self) -> &str {
        self.repository
            .as_ref()
            .map(|r| r.id.as_str())
            .unwrap_or("<unknown>")
    }

    /// Anything that isn't an explicit failure counts as a success.
    pub fn is_success(&self) -> bool {
        self.result != Some(BuildResult::Failed)
    }

    /// Wall-clock duration in milliseconds, 0 when either end is missing.
    pub fn duration_ms(&self) -> i64 {
        match (self.start_time, self.finish_time) {
            (Some(start), Some(finish)) => (finish - start).num_milliseconds().max(0),
            _ => 0,
        }
    }
}

/// Process kind of a build definition (`1` = designer/UI, `2` = YAML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildProcess {
    #[serde(rename = "type")]
    pub process_type: u32,
}

/// Shallow information about the latest run of a definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBuild {
    pub id: u64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
}

/// A pipeline definition, listed with `includeLatestBuilds=true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDefinition {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub process: Option<BuildProcess>,
    #[serde(default)]
    pub latest_build: Option<LatestBuild>,
    #[serde(default)]
    pub repository: Option<BuildRepository>,
}

impl BuildDefinition {
    pub fn is_yaml(&self) -> bool {
        self.process.as_ref().map(|p| p.process_type) != Some(1)
    }
}

// ============================================
// Commits
// ============================================

/// Author or committer signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitUserDate {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub date: DateTime<Utc>,
}

/// Per-commit change counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChangeCounts {
    #[serde(rename = "Add", default)]
    pub add: u64,
    #[serde(rename = "Edit", default)]
    pub edit: u64,
    #[serde(rename = "Delete", default)]
    pub delete: u64,
}

/// A commit on a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommit {
    pub commit_id: String,
    pub author: GitUserDate,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub change_counts: ChangeCounts,
}

// ============================================
// Pull requests
// ============================================

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullRequestStatus {
    Active,
    Abandoned,
    Completed,
    #[serde(other)]
    NotSet,
}

/// A pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub pull_request_id: u64,
    pub repository: BuildRepository,
    pub status: PullRequestStatus,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub closed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: String,
}

// ============================================
// Branches
// ============================================

/// Commit reference carried by branch stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchCommit {
    #[serde(default)]
    pub committer: Option<GitUserDate>,
}

/// Ahead/behind counts of a branch relative to the default branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchStat {
    pub name: String,
    #[serde(default)]
    pub ahead_count: u32,
    #[serde(default)]
    pub behind_count: u32,
    #[serde(default)]
    pub is_base_version: bool,
    pub commit: BranchCommit,
}

impl BranchStat {
    pub fn last_commit_date(&self) -> Option<DateTime<Utc>> {
        self.commit.committer.as_ref().map(|c| c.date)
    }
}

// ============================================
// Tests and coverage
// ============================================

/// Shallow reference; Azure returns ids as strings here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShallowReference {
    pub id: String,
}

/// A test run, usually attached to a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub build: Option<ShallowReference>,
    #[serde(default)]
    pub started_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub passed_tests: u64,
    /// Failed tests that nobody has triaged yet
    #[serde(default)]
    pub unanalyzed_tests: u64,
    #[serde(default)]
    pub total_tests: u64,
}

impl TestRun {
    pub fn build_id(&self) -> Option<u64> {
        self.build.as_ref().and_then(|b| b.id.parse().ok())
    }

    pub fn duration_ms(&self) -> i64 {
        match (self.started_date, self.completed_date) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
            _ => 0,
        }
    }
}

/// One coverage statistic (`Lines`, `Branches`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageStat {
    pub label: String,
    #[serde(default)]
    pub covered: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageData {
    #[serde(default)]
    pub coverage_stats: Vec<CoverageStat>,
}

/// Code coverage for one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCoverage {
    #[serde(default)]
    pub coverage_data: Vec<CoverageData>,
}

impl CodeCoverage {
    /// Summed `Lines` statistic as `(covered, total)`.
    pub fn lines(&self) -> Option<(u64, u64)> {
        let stats: Vec<_> = self
            .coverage_data
            .iter()
            .flat_map(|d| d.coverage_stats.iter())
            .filter(|s| s.label.eq_ignore_ascii_case("lines"))
            .collect();
        if stats.is_empty() {
            return None;
        }
        Some(stats.iter().fold((0, 0), |(covered, total), s| {
            (covered + s.covered, total + s.total)
        }))
    }
}

// ============================================
// Releases
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDefinitionRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEnvironment {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// A classic release pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub release_definition: ReleaseDefinitionRef,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub environments: Vec<ReleaseEnvironment>,
}

// ============================================
// Work items
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemReference {
    pub id: WorkItemId,
}

/// One edge of a hierarchical query; either end may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRelation {
    #[serde(default)]
    pub source: Option<WorkItemReference>,
    #[serde(default)]
    pub target: Option<WorkItemReference>,
    #[serde(default)]
    pub rel: Option<String>,
}

impl WorkItemRelation {
    pub fn new(source: Option<WorkItemId>, target: Option<WorkItemId>) -> Self {
        Self {
            source: source.map(|id| WorkItemReference { id }),
            target: target.map(|id| WorkItemReference { id }),
            rel: None,
        }
    }

    pub fn source_id(&self) -> Option<WorkItemId> {
        self.source.as_ref().map(|r| r.id)
    }

    pub fn target_id(&self) -> Option<WorkItemId> {
        self.target.as_ref().map(|r| r.id)
    }
}

/// Result of running a saved tree query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemQueryResult {
    #[serde(default)]
    pub work_item_relations: Vec<WorkItemRelation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemFields {
    #[serde(rename = "System.Title", default)]
    pub title: String,
    #[serde(rename = "System.WorkItemType")]
    pub work_item_type: String,
    #[serde(rename = "System.State", default)]
    pub state: String,
    #[serde(rename = "System.TeamProject", default)]
    pub project: String,
    #[serde(rename = "System.CreatedDate")]
    pub created_date: DateTime<Utc>,
    #[serde(rename = "System.ChangedDate", default)]
    pub changed_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    #[serde(default)]
    pub url: String,
    pub fields: WorkItemFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionFields {
    #[serde(rename = "System.State")]
    pub state: String,
    #[serde(rename = "System.ChangedDate")]
    pub changed_date: DateTime<Utc>,
}

/// A historical snapshot of a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemRevision {
    pub id: WorkItemId,
    #[serde(default)]
    pub rev: u32,
    pub fields: RevisionFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemIcon {
    pub url: String,
}

/// Static display metadata for a work-item type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemType {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<WorkItemIcon>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_deserialize() {
        let build: Build = serde_json::from_value(json!({
            "id": 42,
            "result": "failed",
            "startTime": "2024-03-01T10:00:00.000Z",
            "finishTime": "2024-03-01T10:05:30.000Z",
            "sourceBranch": "refs/heads/main",
            "definition": { "id": 7, "name": "ci", "url": "https://x/_apis/build/Definitions/7" },
            "repository": { "id": "repo-1", "name": "payments" }
        }))
        .unwrap();

        assert_eq!(build.repo_id(), "repo-1");
        assert!(!build.is_success());
        assert_eq!(build.duration_ms(), 330_000);
        assert!(is_default_branch(&build.source_branch));
    }

    #[test]
    fn test_unknown_build_result_is_not_failure() {
        let build: Build = serde_json::from_value(json!({
            "id": 1,
            "result": "somethingNew",
            "definition": { "id": 1, "name": "ci" }
        }))
        .unwrap();
        assert_eq!(build.result, Some(BuildResult::None));
        assert!(build.is_success());
        assert_eq!(build.repo_id(), "<unknown>");
        assert_eq!(build.duration_ms(), 0);
    }

    #[test]
    fn test_work_item_fields() {
        let wi: WorkItem = serde_json::from_value(json!({
            "id": 12,
            "url": "https://x/_apis/wit/workItems/12",
            "fields": {
                "System.Title": "Checkout flow",
                "System.WorkItemType": "Feature",
                "System.State": "Active",
                "System.TeamProject": "payments",
                "System.CreatedDate": "2024-01-02T03:04:05.678Z"
            }
        }))
        .unwrap();
        assert_eq!(wi.fields.work_item_type, "Feature");
        assert!(wi.fields.changed_date.is_none());
    }

    #[test]
    fn test_relation_with_null_ends() {
        let rel: WorkItemRelation =
            serde_json::from_value(json!({ "source": null, "target": { "id": 3 } })).unwrap();
        assert_eq!(rel.source_id(), None);
        assert_eq!(rel.target_id(), Some(3));
    }

    #[test]
    fn test_coverage_lines() {
        let coverage: CodeCoverage = serde_json::from_value(json!({
            "coverageData": [
                { "coverageStats": [
                    { "label": "Lines", "covered": 40, "total": 100 },
                    { "label": "Branches", "covered": 1, "total": 2 }
                ]},
                { "coverageStats": [ { "label": "Lines", "covered": 10, "total": 100 } ] }
            ]
        }))
        .unwrap();
        assert_eq!(coverage.lines(), Some((50, 200)));
        assert_eq!(CodeCoverage::default().lines(), None);
    }

    #[test]
    fn test_repository_default_branch_name() {
        let repo: Repository = serde_json::from_value(json!({
            "id": "r", "name": "n", "defaultBranch": "refs/heads/develop"
        }))
        .unwrap();
        assert_eq!(repo.default_branch_name(), "develop");
        assert_eq!(repo.size, 0);
    }
}
