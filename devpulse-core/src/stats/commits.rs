//! Commit activity per repository and developer

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use super::week::{add_histograms, WeekBucketer};
use super::Combine;
use crate::types::{ChangeCounts, GitCommit};

/// Commits of one developer in one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevCommits {
    pub name: String,
    pub email: String,
    pub count: u64,
    pub changes: ChangeTotals,
    pub by_date: BTreeMap<NaiveDate, u32>,
}

/// Summed add/edit/delete counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeTotals {
    pub add: u64,
    pub edit: u64,
    pub delete: u64,
}

impl ChangeTotals {
    fn add_counts(&mut self, counts: &ChangeCounts) {
        self.add += counts.add;
        self.edit += counts.edit;
        self.delete += counts.delete;
    }
}

impl DevCommits {
    fn merge(&mut self, other: DevCommits) {
        self.count += other.count;
        self.changes.add += other.changes.add;
        self.changes.edit += other.changes.edit;
        self.changes.delete += other.changes.delete;
        for (date, n) in other.by_date {
            *self.by_date.entry(date).or_default() += n;
        }
    }
}

/// Commit summary for one repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitStats {
    pub count: u64,
    pub by_week: Vec<u32>,
    /// Most active first, ties by name
    pub by_dev: Vec<DevCommits>,
}

/// Developers are keyed by lowercased email, or by name when the email is blank.
fn dev_key(name: &str, email: &str) -> String {
    if email.trim().is_empty() {
        name.to_lowercase()
    } else {
        email.to_lowercase()
    }
}

fn sort_devs(devs: &mut [DevCommits]) {
    devs.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
}

pub fn aggregate_commits(commits: &[GitCommit], weeks: &WeekBucketer) -> CommitStats {
    let mut by_week = weeks.empty_histogram();
    let mut devs: HashMap<String, DevCommits> = HashMap::new();

    for commit in commits {
        let author = &commit.author;
        weeks.record(&mut by_week, author.date);

        let dev = devs
            .entry(dev_key(&author.name, &author.email))
            .or_insert_with(|| DevCommits {
                name: author.name.clone(),
                email: author.email.clone(),
                ..Default::default()
            });
        dev.count += 1;
        dev.changes.add_counts(&commit.change_counts);
        *dev.by_date.entry(author.date.date_naive()).or_default() += 1;
    }

    let mut by_dev: Vec<DevCommits> = devs.into_values().collect();
    sort_devs(&mut by_dev);

    CommitStats {
        count: commits.len() as u64,
        by_week,
        by_dev,
    }
}

impl Combine for CommitStats {
    fn combine(mut self, other: Self) -> Self {
        self.count += other.count;
        self.by_week = add_histograms(&self.by_week, &other.by_week);

        let mut devs: HashMap<String, DevCommits> = self
            .by_dev
            .into_iter()
            .map(|d| (dev_key(&d.name, &d.email), d))
            .collect();
        for dev in other.by_dev {
            match devs.get_mut(&dev_key(&dev.name, &dev.email)) {
                Some(existing) => existing.merge(dev),
                None => {
                    devs.insert(dev_key(&dev.name, &dev.email), dev);
                }
            }
        }

        self.by_dev = devs.into_values().collect();
        sort_devs(&mut self.by_dev);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn commit(name: &str, email: &str, date: &str, add: u64, edit: u64) -> GitCommit {
        serde_json::from_value(json!({
            "commitId": format!("{}-{}", name, date),
            "author": { "name": name, "email": email, "date": date },
            "changeCounts": { "Add": add, "Edit": edit, "Delete": 0 }
        }))
        .unwrap()
    }

    fn weeks() -> WeekBucketer {
        let now: DateTime<Utc> = "2024-03-29T00:00:00Z".parse().unwrap();
        WeekBucketer::new(now, 2)
    }

    fn sample() -> Vec<GitCommit> {
        vec![
            commit("Ana", "ana@acme.io", "2024-03-28T10:00:00Z", 1, 2),
            commit("Ana", "ANA@acme.io", "2024-03-28T16:00:00Z", 0, 1),
            commit("Bo", "bo@acme.io", "2024-03-20T10:00:00Z", 3, 0),
            commit("Cy", "", "2024-01-01T10:00:00Z", 0, 0),
        ]
    }

    #[test]
    fn test_aggregate_commits() {
        let stats = aggregate_commits(&sample(), &weeks());

        assert_eq!(stats.count, 4);
        assert_eq!(stats.by_week, vec![1, 2]);
        assert_eq!(stats.by_dev.len(), 3);

        let ana = &stats.by_dev[0];
        assert_eq!(ana.name, "Ana");
        assert_eq!(ana.count, 2);
        assert_eq!(ana.changes, ChangeTotals { add: 1, edit: 3, delete: 0 });
        assert_eq!(ana.by_date.values().copied().collect::<Vec<_>>(), vec![2]);

        assert_eq!(stats.by_dev[1].name, "Bo");
        assert_eq!(stats.by_dev[2].name, "Cy");
    }

    #[test]
    fn test_combine_matches_whole() {
        let commits = sample();
        let weeks = weeks();
        let whole = aggregate_commits(&commits, &weeks);
        let combined = aggregate_commits(&commits[..1], &weeks)
            .combine(aggregate_commits(&commits[1..], &weeks));

        assert_eq!(combined, whole);
    }

    #[test]
    fn test_empty() {
        let stats = aggregate_commits(&[], &weeks());
        assert_eq!(stats.count, 0);
        assert_eq!(stats.by_week, vec![0, 0]);
        assert!(stats.by_dev.is_empty());
    }
}
