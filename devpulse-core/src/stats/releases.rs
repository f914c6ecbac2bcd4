//! Classic release pipelines

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Combine;
use crate::types::Release;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStats {
    pub definition_id: u64,
    pub name: String,
    pub count: u64,
    /// Releases where every environment succeeded
    pub successful: u64,
    pub last_release: Option<DateTime<Utc>>,
}

impl Combine for ReleaseStats {
    fn combine(mut self, other: Self) -> Self {
        self.count += other.count;
        self.successful += other.successful;
        self.last_release = self.last_release.max(other.last_release);
        self
    }
}

fn is_successful(release: &Release) -> bool {
    !release.environments.is_empty()
        && release
            .environments
            .iter()
            .all(|env| env.status.eq_ignore_ascii_case("succeeded"))
}

/// One entry per release definition, sorted by name.
pub fn aggregate_releases(releases: &[Release]) -> Vec<ReleaseStats> {
    let mut by_definition: BTreeMap<u64, ReleaseStats> = BTreeMap::new();

    for release in releases {
        let definition = &release.release_definition;
        let stats = by_definition
            .entry(definition.id)
            .or_insert_with(|| ReleaseStats {
                definition_id: definition.id,
                name: definition.name.clone(),
                count: 0,
                successful: 0,
                last_release: None,
            });
        stats.count += 1;
        if is_successful(release) {
            stats.successful += 1;
        }
        stats.last_release = stats.last_release.max(Some(release.created_on));
    }

    let mut stats: Vec<ReleaseStats> = by_definition.into_values().collect();
    stats.sort_by(|a, b| a.name.cmp(&b.name));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn release(id: u64, definition: u64, name: &str, created: &str, statuses: &[&str]) -> Release {
        let environments: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| json!({ "name": format!("env{}", i), "status": s }))
            .collect();
        serde_json::from_value(json!({
            "id": id,
            "releaseDefinition": { "id": definition, "name": name },
            "createdOn": created,
            "environments": environments
        }))
        .unwrap()
    }

    #[test]
    fn test_aggregate_releases() {
        let releases = vec![
            release(1, 2, "web", "2024-03-01T00:00:00Z", &["succeeded", "succeeded"]),
            release(2, 2, "web", "2024-03-05T00:00:00Z", &["succeeded", "rejected"]),
            release(3, 1, "api", "2024-03-02T00:00:00Z", &["succeeded"]),
            release(4, 1, "api", "2024-03-03T00:00:00Z", &[]),
        ];

        let stats = aggregate_releases(&releases);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "api");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].successful, 1);
        assert_eq!(stats[1].name, "web");
        assert_eq!(stats[1].successful, 1);
        assert_eq!(
            stats[1].last_release,
            Some("2024-03-05T00:00:00Z".parse().unwrap())
        );

        let combined = aggregate_releases(&releases[..1])
            .remove(0)
            .combine(aggregate_releases(&releases[1..2]).remove(0));
        assert_eq!(combined, stats[1]);
    }
}
