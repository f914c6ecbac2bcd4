//! Statistical combinators
//!
//! Each submodule folds one kind of raw record into small per-entity
//! summaries. Summaries start from `Default`/empty, are mutated only by
//! their fold loop, and can be merged with [`Combine`] so that summaries of
//! two slices of a record list add up to the summary of the whole list.

pub mod branches;
pub mod builds;
pub mod commits;
pub mod prs;
pub mod releases;
pub mod status;
pub mod test_runs;
pub mod week;

pub use branches::{aggregate_branches, BranchInfo, BranchList, BranchSummary};
pub use builds::{
    aggregate_builds, success_rate, AggregatedBuilds, BuildPipeline, BuildStats, DurationSummary,
    RepoBuilds,
};
pub use commits::{aggregate_commits, CommitStats, DevCommits};
pub use prs::{aggregate_prs, PrStats, PrSummary};
pub use releases::{aggregate_releases, ReleaseStats};
pub use status::{BuildStatus, PipelineStatus};
pub use test_runs::{aggregate_test_runs, tests_for_repo, TestPipeline, TestRunIndex, TestSummary};
pub use week::WeekBucketer;

/// Associative merge of two partial summaries.
pub trait Combine {
    fn combine(self, other: Self) -> Self;
}

/// Fold any number of partial summaries into one.
pub fn combine_all<T, I>(parts: I) -> Option<T>
where
    T: Combine,
    I: IntoIterator<Item = T>,
{
    parts.into_iter().reduce(Combine::combine)
}
