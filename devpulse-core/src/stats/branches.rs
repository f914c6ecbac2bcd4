//! Branch hygiene relative to the default branch

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::BranchStat;

/// A branch with a commit in the last this many days is active.
pub const ACTIVE_BRANCH_DAYS: i64 = 15;

/// Behind by more than this while also ahead: likely to conflict.
pub const CONFLICT_BEHIND_THRESHOLD: u32 = 10;

/// Ahead by more than this: should probably be merged.
pub const SIGNIFICANTLY_AHEAD_THRESHOLD: u32 = 10;

/// Lists expose at most this many branches; counts stay exact.
pub const BRANCH_LIST_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    pub name: String,
    pub url: String,
    pub ahead: u32,
    pub behind: u32,
    pub last_commit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BranchList {
    pub count: usize,
    pub branches: Vec<BranchInfo>,
}

impl BranchList {
    fn from_branches(mut branches: Vec<BranchInfo>) -> Self {
        let count = branches.len();
        branches.truncate(BRANCH_LIST_LIMIT);
        Self { count, branches }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    pub total: usize,
    pub active: BranchList,
    pub abandoned: BranchList,
    pub delete_candidates: BranchList,
    pub possibly_conflicting: BranchList,
    pub significantly_ahead: BranchList,
}

fn branch_url(repo_url: &str, name: &str) -> String {
    format!("{}?version=GB{}", repo_url, urlencoding::encode(name))
}

fn pick(branches: &[BranchInfo], keep: impl Fn(&BranchInfo) -> bool) -> Vec<BranchInfo> {
    branches.iter().filter(|b| keep(b)).cloned().collect()
}

/// Classify every non-default branch. Lists are most recent commit first,
/// except `significantly_ahead` which is most ahead first.
pub fn aggregate_branches(
    repo_url: &str,
    default_branch: Option<&str>,
    stats: &[BranchStat],
    now: DateTime<Utc>,
) -> BranchSummary {
    let default_name = default_branch.map(|b| b.trim_start_matches("refs/heads/"));
    let active_cutoff = now - Duration::days(ACTIVE_BRANCH_DAYS);

    let mut branches: Vec<BranchInfo> = stats
        .iter()
        .filter(|b| !b.is_base_version && Some(b.name.as_str()) != default_name)
        .map(|b| BranchInfo {
            name: b.name.clone(),
            url: branch_url(repo_url, &b.name),
            ahead: b.ahead_count,
            behind: b.behind_count,
            last_commit: b.last_commit_date(),
        })
        .collect();
    branches.sort_by(|a, b| b.last_commit.cmp(&a.last_commit));

    let is_active = |b: &BranchInfo| b.last_commit.is_some_and(|d| d >= active_cutoff);

    let active = pick(&branches, is_active);
    let abandoned = pick(&branches, |b| !is_active(b));
    let delete_candidates = pick(&branches, |b| !is_active(b) && b.ahead == 0);
    let possibly_conflicting = pick(&branches, |b| {
        b.ahead > 0 && b.behind > CONFLICT_BEHIND_THRESHOLD
    });
    let mut significantly_ahead = pick(&branches, |b| b.ahead > SIGNIFICANTLY_AHEAD_THRESHOLD);
    significantly_ahead.sort_by(|a, b| b.ahead.cmp(&a.ahead));

    BranchSummary {
        total: branches.len(),
        active: BranchList::from_branches(active),
        abandoned: BranchList::from_branches(abandoned),
        delete_candidates: BranchList::from_branches(delete_candidates),
        possibly_conflicting: BranchList::from_branches(possibly_conflicting),
        significantly_ahead: BranchList::from_branches(significantly_ahead),
    }
}
