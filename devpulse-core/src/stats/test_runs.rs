//! Test results and coverage of each repository's latest default-branch builds

use std::collections::HashMap;

use serde::Serialize;

use super::builds::{definition_web_url, AggregatedBuilds};
use super::Combine;
use crate::format::format_duration_ms;
use crate::types::{CodeCoverage, TestRun};

/// Test runs grouped by the build that produced them.
#[derive(Debug, Default)]
pub struct TestRunIndex {
    by_build: HashMap<u64, Vec<TestRun>>,
}

impl TestRunIndex {
    pub fn runs_for_build(&self, build_id: u64) -> &[TestRun] {
        self.by_build
            .get(&build_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_build.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_build.is_empty()
    }
}

/// Runs without a build reference are ignored.
pub fn aggregate_test_runs(runs: Vec<TestRun>) -> TestRunIndex {
    let mut index = TestRunIndex::default();
    for run in runs {
        if let Some(build_id) = run.build_id() {
            index.by_build.entry(build_id).or_default().push(run);
        }
    }
    index
}

/// Test results of one pipeline's latest default-branch build.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPipeline {
    pub definition_id: u64,
    pub name: String,
    pub url: String,
    pub build_id: u64,
    pub passed: u64,
    pub failed: u64,
    pub execution_time_ms: i64,
    pub execution_time: String,
    /// `Lines` coverage as `"NN%"`, `-` when unavailable
    pub coverage: String,
}

impl Combine for TestPipeline {
    fn combine(mut self, other: Self) -> Self {
        self.passed += other.passed;
        self.failed += other.failed;
        self.execution_time_ms += other.execution_time_ms;
        self.execution_time = format_duration_ms(self.execution_time_ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub pipelines: Vec<TestPipeline>,
}

fn coverage_label(coverage: Option<&CodeCoverage>) -> String {
    match coverage.and_then(CodeCoverage::lines) {
        Some((covered, total)) if total > 0 => {
            format!("{:.2}%", covered as f64 * 100.0 / total as f64)
        }
        _ => "-".to_string(),
    }
}

/// Summarize tests for `repo_id`. `coverage` maps build id to its coverage,
/// for whichever builds it could be fetched. `None` when the repository has
/// no default-branch builds.
pub fn tests_for_repo(
    repo_id: &str,
    builds: &AggregatedBuilds,
    runs: &TestRunIndex,
    coverage: &HashMap<u64, CodeCoverage>,
) -> Option<TestSummary> {
    let latest = builds.latest_builds_for_repo(repo_id);
    if latest.is_empty() {
        return None;
    }

    let pipelines: Vec<TestPipeline> = latest
        .into_iter()
        .map(|build| {
            let (passed, failed, execution_time_ms) = runs.runs_for_build(build.id).iter().fold(
                (0, 0, 0),
                |(passed, failed, time), run| {
                    (
                        passed + run.passed_tests,
                        failed + run.unanalyzed_tests,
                        time + run.duration_ms(),
                    )
                },
            );

            TestPipeline {
                definition_id: build.definition.id,
                name: build.definition.name.clone(),
                url: definition_web_url(&build.definition.url),
                build_id: build.id,
                passed,
                failed,
                execution_time_ms,
                execution_time: format_duration_ms(execution_time_ms),
                coverage: coverage_label(coverage.get(&build.id)),
            }
        })
        .collect();

    let passed = pipelines.iter().map(|p| p.passed).sum();
    let failed = pipelines.iter().map(|p| p.failed).sum();

    Some(TestSummary {
        total: passed + failed,
        passed,
        failed,
        pipelines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::builds::aggregate_builds;
    use crate::stats::WeekBucketer;
    use crate::types::Build;
    use serde_json::json;

    fn build(id: u64, definition: u64, finish: &str) -> Build {
        serde_json::from_value(json!({
            "id": id,
            "result": "succeeded",
            "startTime": "2024-03-01T00:00:00.000Z",
            "finishTime": finish,
            "sourceBranch": "refs/heads/main",
            "definition": { "id": definition, "name": format!("ci-{}", definition), "url": "" },
            "repository": { "id": "repo-1" }
        }))
        .unwrap()
    }

    fn run(id: u64, build: Option<u64>, passed: u64, failed: u64) -> TestRun {
        serde_json::from_value(json!({
            "id": id,
            "build": build.map(|b| json!({ "id": b.to_string() })),
            "startedDate": "2024-03-01T10:00:00.000Z",
            "completedDate": "2024-03-01T10:00:30.000Z",
            "passedTests": passed,
            "unanalyzedTests": failed,
            "totalTests": passed + failed
        }))
        .unwrap()
    }

    fn coverage(covered: u64, total: u64) -> CodeCoverage {
        serde_json::from_value(json!({
            "coverageData": [{ "coverageStats": [{ "label": "Lines", "covered": covered, "total": total }] }]
        }))
        .unwrap()
    }

    #[test]
    fn test_index_skips_runs_without_build() {
        let index = aggregate_test_runs(vec![run(1, Some(10), 1, 0), run(2, None, 1, 0), run(3, Some(10), 2, 1)]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.runs_for_build(10).len(), 2);
        assert!(index.runs_for_build(11).is_empty());
    }

    #[test]
    fn test_tests_for_repo() {
        let weeks = WeekBucketer::new("2024-03-29T00:00:00Z".parse().unwrap(), 4);
        let builds = aggregate_builds(
            &[
                build(10, 1, "2024-03-20T00:00:00.000Z"),
                build(11, 1, "2024-03-21T00:00:00.000Z"),
                build(20, 2, "2024-03-21T00:00:00.000Z"),
            ],
            &weeks,
        );
        let runs = aggregate_test_runs(vec![
            run(1, Some(11), 40, 2),
            run(2, Some(11), 10, 0),
            run(3, Some(10), 99, 99),
        ]);
        let coverage: HashMap<u64, CodeCoverage> = [(11, coverage(50, 200))].into_iter().collect();

        let summary = tests_for_repo("repo-1", &builds, &runs, &coverage).unwrap();

        assert_eq!(summary.passed, 50);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total, 52);
        assert_eq!(summary.pipelines.len(), 2);

        let first = &summary.pipelines[0];
        assert_eq!(first.build_id, 11);
        assert_eq!(first.execution_time, "1m");
        assert_eq!(first.coverage, "25.00%");

        let second = &summary.pipelines[1];
        assert_eq!(second.passed, 0);
        assert_eq!(second.coverage, "-");

        assert!(tests_for_repo("repo-2", &builds, &runs, &coverage).is_none());
    }
}
