//! Work-item hierarchy analysis
//!
//! Turns the flat `(source, target)` relation list of a tree query into
//! groups of parent items with their children, a parent → children map, and
//! per item a compacted state timeline built from its revision history.
//!
//! Relations are allowed to be messy: either end may be null, and the source
//! may point outside the fetched item set. Such relations lose the missing
//! end (target) or are dropped entirely (source) with a warning.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;

use crate::error::Result;
use crate::types::{WorkItem, WorkItemId, WorkItemRelation, WorkItemRevision, WorkItemType};

/// Where work items and their histories come from.
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    /// Full records for `ids`; ids that don't exist are simply missing.
    async fn work_items(&self, ids: &[WorkItemId]) -> Result<Vec<WorkItem>>;

    /// Revisions of one item, oldest first.
    async fn revisions(&self, id: WorkItemId) -> Result<Vec<WorkItemRevision>>;
}

/// The last date a state was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionPoint {
    pub state: String,
    pub date: DateTime<Utc>,
}

/// Collapse consecutive revisions in the same state, keeping the date of
/// the last one.
pub fn compact_revisions(revisions: &[WorkItemRevision]) -> Vec<RevisionPoint> {
    let mut timeline: Vec<RevisionPoint> = Vec::new();

    for revision in revisions {
        let point = RevisionPoint {
            state: revision.fields.state.clone(),
            date: revision.fields.changed_date,
        };
        match timeline.last_mut() {
            Some(last) if last.state == point.state => *last = point,
            _ => timeline.push(point),
        }
    }

    timeline
}

/// Display metadata for a work-item type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeDisplay {
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysedWorkItem {
    pub id: WorkItemId,
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub work_item_type: String,
    pub state: String,
    pub project: String,
    pub color: String,
    pub icon: String,
    pub created: DateTime<Utc>,
    pub revisions: Vec<RevisionPoint>,
}

/// A parent item and the children that resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItemGroup {
    pub source: AnalysedWorkItem,
    pub targets: Vec<AnalysedWorkItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkItemAnalysis {
    /// In order of each source's first appearance
    pub groups: Vec<WorkItemGroup>,
    pub tree: BTreeMap<WorkItemId, Vec<WorkItemId>>,
    /// Display metadata of the types that appear in `groups`
    pub types: BTreeMap<String, TypeDisplay>,
}

/// Every non-null id referenced by a relation, in first-appearance order.
pub fn distinct_ids(relations: &[WorkItemRelation]) -> Vec<WorkItemId> {
    let mut seen = HashSet::new();
    relations
        .iter()
        .flat_map(|r| [r.source_id(), r.target_id()])
        .flatten()
        .filter(|id| seen.insert(*id))
        .collect()
}

fn web_url(api_url: &str) -> String {
    api_url.replace("_apis/wit/workItems", "_workitems/edit")
}

struct Analyser<'a> {
    items: HashMap<WorkItemId, WorkItem>,
    revisions: HashMap<WorkItemId, Vec<WorkItemRevision>>,
    types: HashMap<&'a str, &'a WorkItemType>,
    used_types: BTreeMap<String, TypeDisplay>,
}

impl Analyser<'_> {
    fn display(&mut self, type_name: &str) -> TypeDisplay {
        if let Some(display) = self.used_types.get(type_name) {
            return display.clone();
        }
        let display = match self.types.get(type_name) {
            Some(t) => TypeDisplay {
                color: t.color.clone().unwrap_or_default(),
                icon: t.icon.as_ref().map(|i| i.url.clone()).unwrap_or_default(),
            },
            None => {
                tracing::debug!(work_item_type = type_name, "No display metadata for work item type");
                TypeDisplay::default()
            }
        };
        self.used_types.insert(type_name.to_string(), display.clone());
        display
    }

    fn analysed(&mut self, id: WorkItemId) -> Option<AnalysedWorkItem> {
        let item = self.items.get(&id)?;
        let fields = &item.fields;
        let revisions = self
            .revisions
            .get(&id)
            .map(|r| compact_revisions(r))
            .unwrap_or_default();
        let (id, title, url, work_item_type, state, project, created) = (
            item.id,
            fields.title.clone(),
            web_url(&item.url),
            fields.work_item_type.clone(),
            fields.state.clone(),
            fields.project.clone(),
            fields.created_date,
        );
        let display = self.display(&work_item_type);

        Some(AnalysedWorkItem {
            id,
            title,
            url,
            work_item_type,
            state,
            project,
            color: display.color,
            icon: display.icon,
            created,
            revisions,
        })
    }
}

/// Group relations by source using already-fetched items and revisions.
pub fn reduce_relations(
    relations: &[WorkItemRelation],
    types: &[WorkItemType],
    items: Vec<WorkItem>,
    revisions: HashMap<WorkItemId, Vec<WorkItemRevision>>,
) -> WorkItemAnalysis {
    let mut analyser = Analyser {
        items: items.into_iter().map(|wi| (wi.id, wi)).collect(),
        revisions,
        types: types.iter().map(|t| (t.name.as_str(), t)).collect(),
        used_types: BTreeMap::new(),
    };

    let mut groups: Vec<WorkItemGroup> = Vec::new();
    let mut group_index: HashMap<WorkItemId, usize> = HashMap::new();
    let mut tree: BTreeMap<WorkItemId, Vec<WorkItemId>> = BTreeMap::new();

    for relation in relations {
        // Build a source only the first time it shows up
        let existing = relation.source_id().and_then(|id| group_index.get(&id).copied());
        let index = match existing {
            Some(index) => index,
            None => {
                let Some(source) = relation.source_id().and_then(|id| analyser.analysed(id)) else {
                    tracing::warn!(
                        source = ?relation.source_id(),
                        target = ?relation.target_id(),
                        "Ignoring work item relation without a known source"
                    );
                    continue;
                };
                group_index.insert(source.id, groups.len());
                groups.push(WorkItemGroup {
                    source,
                    targets: vec![],
                });
                groups.len() - 1
            }
        };
        let source_id = groups[index].source.id;
        let target = relation.target_id().and_then(|id| analyser.analysed(id));
        let children = tree.entry(source_id).or_default();

        if let Some(target) = target {
            children.push(target.id);
            groups[index].targets.push(target);
        }
    }

    WorkItemAnalysis {
        groups,
        tree,
        types: analyser.used_types,
    }
}

/// Fetch everything the relations reference, then group them.
///
/// Items are fetched in bulk while revisions are fetched per id, all
/// concurrently. Any fetch error fails the whole analysis.
pub async fn aggregate<S>(
    relations: &[WorkItemRelation],
    types: &[WorkItemType],
    source: &S,
) -> Result<WorkItemAnalysis>
where
    S: WorkItemSource + ?Sized,
{
    let ids = distinct_ids(relations);
    if ids.is_empty() {
        return Ok(WorkItemAnalysis::default());
    }

    let (items, revisions) = tokio::try_join!(
        source.work_items(&ids),
        try_join_all(ids.iter().map(|&id| async move {
            let revisions = source.revisions(id).await?;
            Ok::<_, crate::error::Error>((id, revisions))
        }))
    )?;

    tracing::debug!(ids = ids.len(), fetched = items.len(), "Fetched work items");

    Ok(reduce_relations(
        relations,
        types,
        items,
        revisions.into_iter().collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(day: u32) -> DateTime<Utc> {
        format!("2024-03-{:02}T00:00:00Z", day).parse().unwrap()
    }

    fn revision(id: WorkItemId, rev: u32, state: &str, day: u32) -> WorkItemRevision {
        serde_json::from_value(json!({
            "id": id,
            "rev": rev,
            "fields": { "System.State": state, "System.ChangedDate": date(day) }
        }))
        .unwrap()
    }

    fn item(id: WorkItemId, kind: &str) -> WorkItem {
        serde_json::from_value(json!({
            "id": id,
            "url": format!("https://x/acme/_apis/wit/workItems/{}", id),
            "fields": {
                "System.Title": format!("Item {}", id),
                "System.WorkItemType": kind,
                "System.State": "Active",
                "System.TeamProject": "pay",
                "System.CreatedDate": date(1)
            }
        }))
        .unwrap()
    }

    fn types() -> Vec<WorkItemType> {
        serde_json::from_value(json!([
            { "name": "Feature", "color": "773B93", "icon": { "url": "https://x/icon_feature" } },
            { "name": "Task", "color": "F2CB1D", "icon": { "url": "https://x/icon_task" } }
        ]))
        .unwrap()
    }

    #[test]
    fn test_compaction_keeps_last_date_per_state_run() {
        let revisions = vec![
            revision(1, 1, "Active", 1),
            revision(1, 2, "Active", 2),
            revision(1, 3, "Resolved", 3),
            revision(1, 4, "Resolved", 4),
        ];

        let timeline = compact_revisions(&revisions);

        assert_eq!(
            timeline,
            vec![
                RevisionPoint { state: "Active".to_string(), date: date(2) },
                RevisionPoint { state: "Resolved".to_string(), date: date(4) },
            ]
        );
    }

    #[test]
    fn test_compaction_keeps_returning_states() {
        let revisions = vec![
            revision(1, 1, "New", 1),
            revision(1, 2, "Active", 2),
            revision(1, 3, "New", 3),
        ];
        assert_eq!(compact_revisions(&revisions).len(), 3);
        assert!(compact_revisions(&[]).is_empty());
    }

    #[test]
    fn test_distinct_ids_skip_nulls() {
        let relations = vec![
            WorkItemRelation::new(None, Some(2)),
            WorkItemRelation::new(Some(1), Some(2)),
            WorkItemRelation::new(Some(1), None),
            WorkItemRelation::new(Some(3), Some(1)),
        ];
        assert_eq!(distinct_ids(&relations), vec![2, 1, 3]);
    }

    #[test]
    fn test_reduce_relations() {
        let relations = vec![
            WorkItemRelation::new(Some(10), Some(11)),
            WorkItemRelation::new(Some(99), Some(11)),
            WorkItemRelation::new(Some(20), None),
            WorkItemRelation::new(Some(10), Some(12)),
            WorkItemRelation::new(Some(10), Some(98)),
            WorkItemRelation::new(None, Some(12)),
        ];
        let items = vec![item(10, "Feature"), item(11, "Task"), item(12, "Bug"), item(20, "Feature")];
        let revisions: HashMap<WorkItemId, Vec<WorkItemRevision>> =
            [(11, vec![revision(11, 1, "New", 1), revision(11, 2, "New", 5)])].into_iter().collect();

        let analysis = reduce_relations(&relations, &types(), items, revisions);

        let sources: Vec<WorkItemId> = analysis.groups.iter().map(|g| g.source.id).collect();
        assert_eq!(sources, vec![10, 20]);

        let feature = &analysis.groups[0];
        let targets: Vec<WorkItemId> = feature.targets.iter().map(|t| t.id).collect();
        assert_eq!(targets, vec![11, 12]);
        assert_eq!(feature.source.url, "https://x/acme/_workitems/edit/10");
        assert_eq!(feature.source.color, "773B93");
        assert_eq!(feature.targets[0].revisions, vec![RevisionPoint { state: "New".to_string(), date: date(5) }]);

        // Unknown type: empty display metadata
        assert_eq!(feature.targets[1].work_item_type, "Bug");
        assert_eq!(feature.targets[1].color, "");
        assert_eq!(feature.targets[1].icon, "");

        // Null target: source present with no targets
        assert!(analysis.groups[1].targets.is_empty());

        assert_eq!(analysis.tree[&10], vec![11, 12]);
        assert!(analysis.tree[&20].is_empty());
        assert!(!analysis.tree.contains_key(&99));
        assert_eq!(analysis.types.len(), 3);
        assert_eq!(analysis.types["Task"].icon, "https://x/icon_task");
    }

    #[test]
    fn test_interleaved_relations_share_one_group_per_source() {
        let relations = vec![
            WorkItemRelation::new(Some(10), Some(11)),
            WorkItemRelation::new(Some(20), Some(12)),
            WorkItemRelation::new(Some(10), Some(12)),
            WorkItemRelation::new(Some(10), None),
            WorkItemRelation::new(Some(20), Some(11)),
        ];
        let items = vec![item(10, "Feature"), item(11, "Task"), item(12, "Bug"), item(20, "Feature")];
        let revisions: HashMap<WorkItemId, Vec<WorkItemRevision>> = [(
            10,
            vec![revision(10, 1, "New", 1), revision(10, 2, "Active", 3), revision(10, 3, "Active", 4)],
        )]
        .into_iter()
        .collect();

        let analysis = reduce_relations(&relations, &types(), items, revisions);

        assert_eq!(analysis.groups.len(), 2);
        let first = &analysis.groups[0];
        assert_eq!(first.source.id, 10);
        assert_eq!(first.targets.iter().map(|t| t.id).collect::<Vec<_>>(), vec![11, 12]);
        assert_eq!(
            first.source.revisions,
            vec![
                RevisionPoint { state: "New".to_string(), date: date(1) },
                RevisionPoint { state: "Active".to_string(), date: date(4) },
            ]
        );
        assert_eq!(analysis.groups[1].targets.iter().map(|t| t.id).collect::<Vec<_>>(), vec![12, 11]);
        assert_eq!(analysis.tree[&10], vec![11, 12]);
        assert_eq!(analysis.tree[&20], vec![12, 11]);
    }

    struct StaticSource {
        items: Vec<WorkItem>,
        revision_calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkItemSource for StaticSource {
        async fn work_items(&self, ids: &[WorkItemId]) -> Result<Vec<WorkItem>> {
            Ok(self.items.iter().filter(|wi| ids.contains(&wi.id)).cloned().collect())
        }

        async fn revisions(&self, id: WorkItemId) -> Result<Vec<WorkItemRevision>> {
            self.revision_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![revision(id, 1, "Active", 1), revision(id, 2, "Closed", 2)])
        }
    }

    #[tokio::test]
    async fn test_aggregate_fetches_each_id_once() {
        let source = StaticSource {
            items: vec![item(1, "Feature"), item(2, "Task")],
            revision_calls: AtomicUsize::new(0),
        };
        let relations = vec![
            WorkItemRelation::new(Some(1), Some(2)),
            WorkItemRelation::new(Some(1), Some(3)),
        ];

        let analysis = aggregate(&relations, &types(), &source).await.unwrap();

        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 3);
        assert_eq!(analysis.groups.len(), 1);
        assert_eq!(analysis.groups[0].targets.len(), 1);
        assert_eq!(analysis.groups[0].source.revisions.len(), 2);
    }

    #[tokio::test]
    async fn test_aggregate_without_relations() {
        let source = StaticSource {
            items: vec![],
            revision_calls: AtomicUsize::new(0),
        };
        let analysis = aggregate(&[], &types(), &source).await.unwrap();
        assert_eq!(analysis, WorkItemAnalysis::default());
        assert_eq!(source.revision_calls.load(Ordering::SeqCst), 0);
    }
}
