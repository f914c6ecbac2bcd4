//! Pull request flow per repository

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::builds::DurationSummary;
use super::week::{add_histograms, WeekBucketer};
use super::Combine;
use crate::types::{PullRequest, PullRequestStatus};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrStats {
    pub total: u64,
    pub active: u64,
    pub abandoned: u64,
    pub completed: u64,
    /// `closed - created` of completed PRs, in milliseconds
    pub approve_samples: Vec<i64>,
    pub opened_by_week: Vec<u32>,
    pub completed_by_week: Vec<u32>,
}

/// Serializable view of [`PrStats`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrSummary {
    pub total: u64,
    pub active: u64,
    pub abandoned: u64,
    pub completed: u64,
    pub time_to_approve: Option<DurationSummary>,
    pub opened_by_week: Vec<u32>,
    pub completed_by_week: Vec<u32>,
}

impl PrStats {
    fn empty(weeks: &WeekBucketer) -> Self {
        Self {
            opened_by_week: weeks.empty_histogram(),
            completed_by_week: weeks.empty_histogram(),
            ..Default::default()
        }
    }

    fn add(&mut self, pr: &PullRequest, weeks: &WeekBucketer) {
        self.total += 1;
        weeks.record(&mut self.opened_by_week, pr.creation_date);

        match pr.status {
            PullRequestStatus::Active => self.active += 1,
            PullRequestStatus::Abandoned => self.abandoned += 1,
            PullRequestStatus::Completed => {
                self.completed += 1;
                if let Some(closed) = pr.closed_date {
                    self.approve_samples
                        .push((closed - pr.creation_date).num_milliseconds().max(0));
                    weeks.record(&mut self.completed_by_week, closed);
                }
            }
            PullRequestStatus::NotSet => {}
        }
    }

    /// `None` until at least one PR has been completed.
    pub fn time_to_approve(&self) -> Option<DurationSummary> {
        if self.approve_samples.is_empty() {
            return None;
        }
        Some(DurationSummary::from_samples(&self.approve_samples))
    }

    pub fn summary(&self) -> PrSummary {
        PrSummary {
            total: self.total,
            active: self.active,
            abandoned: self.abandoned,
            completed: self.completed,
            time_to_approve: self.time_to_approve(),
            opened_by_week: self.opened_by_week.clone(),
            completed_by_week: self.completed_by_week.clone(),
        }
    }
}

impl Combine for PrStats {
    fn combine(mut self, other: Self) -> Self {
        self.total += other.total;
        self.active += other.active;
        self.abandoned += other.abandoned;
        self.completed += other.completed;
        self.approve_samples.extend(other.approve_samples);
        self.opened_by_week = add_histograms(&self.opened_by_week, &other.opened_by_week);
        self.completed_by_week = add_histograms(&self.completed_by_week, &other.completed_by_week);
        self
    }
}

/// PRs created on or after `since`, plus any still active, keyed by repository id.
pub fn aggregate_prs(
    prs: &[PullRequest],
    since: DateTime<Utc>,
    weeks: &WeekBucketer,
) -> HashMap<String, PrStats> {
    let mut by_repo: HashMap<String, PrStats> = HashMap::new();

    for pr in prs
        .iter()
        .filter(|pr| pr.creation_date >= since || pr.status == PullRequestStatus::Active)
    {
        by_repo
            .entry(pr.repository.id.clone())
            .or_insert_with(|| PrStats::empty(weeks))
            .add(pr, weeks);
    }

    by_repo
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pr(id: u64, repo: &str, status: &str, created: &str, closed: Option<&str>) -> PullRequest {
        serde_json::from_value(json!({
            "pullRequestId": id,
            "repository": { "id": repo },
            "status": status,
            "creationDate": created,
            "closedDate": closed,
            "title": format!("PR {}", id)
        }))
        .unwrap()
    }

    fn since() -> DateTime<Utc> {
        "2024-03-01T00:00:00Z".parse().unwrap()
    }

    fn weeks() -> WeekBucketer {
        WeekBucketer::new("2024-03-29T00:00:00Z".parse().unwrap(), 4)
    }

    fn sample() -> Vec<PullRequest> {
        vec![
            pr(1, "r1", "completed", "2024-03-25T10:00:00Z", Some("2024-03-25T12:00:00Z")),
            pr(2, "r1", "completed", "2024-03-10T10:00:00Z", Some("2024-03-11T10:00:00Z")),
            pr(3, "r1", "abandoned", "2024-03-12T10:00:00Z", Some("2024-03-13T10:00:00Z")),
            pr(4, "r1", "active", "2023-12-01T10:00:00Z", None),
            pr(5, "r1", "completed", "2023-12-01T10:00:00Z", Some("2023-12-02T10:00:00Z")),
            pr(6, "r2", "active", "2024-03-28T10:00:00Z", None),
        ]
    }

    #[test]
    fn test_aggregate_prs() {
        let by_repo = aggregate_prs(&sample(), since(), &weeks());
        let r1 = &by_repo["r1"];

        assert_eq!(r1.total, 4);
        assert_eq!(r1.active, 1);
        assert_eq!(r1.abandoned, 1);
        assert_eq!(r1.completed, 2);
        assert_eq!(r1.approve_samples, vec![7_200_000, 86_400_000]);
        assert_eq!(r1.opened_by_week, vec![0, 2, 0, 1]);
        assert_eq!(r1.completed_by_week, vec![0, 1, 0, 1]);

        let time = r1.time_to_approve().unwrap();
        assert_eq!(time.min, "2h");
        assert_eq!(time.max, "1d");

        assert_eq!(by_repo["r2"].active, 1);
        assert!(by_repo["r2"].time_to_approve().is_none());
    }

    #[test]
    fn test_combine_matches_whole() {
        let prs = sample();
        let weeks = weeks();
        let whole = aggregate_prs(&prs, since(), &weeks).remove("r1").unwrap();
        let left = aggregate_prs(&prs[..2], since(), &weeks).remove("r1").unwrap();
        let right = aggregate_prs(&prs[2..], since(), &weeks).remove("r1").unwrap();

        assert_eq!(left.combine(right), whole);
    }
}
