//! Azure DevOps resource getters
//!
//! Each getter maps to one REST endpoint and one cache key prefix of the form
//! `<collection>_<project>_<resource>`. List endpoints go through
//! [`PagedFetcher::list`], single documents through [`PagedFetcher::get_one`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use sha2::{Digest, Sha256};

use super::paged::{ListOf, PagedFetcher};
use crate::config::ProjectRef;
use crate::error::Result;
use crate::types::{
    Build, BuildDefinition, BranchStat, CodeCoverage, GitCommit, PullRequest, Release,
    Repository, TestRun, WorkItem, WorkItemId, WorkItemQueryResult, WorkItemRevision,
    WorkItemType,
};
use crate::workitems::WorkItemSource;

/// The work-items endpoint accepts at most this many ids per request.
pub const WORK_ITEM_BATCH_SIZE: usize = 200;

/// Entry point for all project-scoped resources.
pub struct AzureApi {
    fetcher: Arc<PagedFetcher>,
    base_url: String,
    since: DateTime<Utc>,
}

impl AzureApi {
    /// `base_url` must end with a slash; `since` is the start of the
    /// lookback window used by time-bounded endpoints.
    pub fn new(fetcher: Arc<PagedFetcher>, base_url: impl Into<String>, since: DateTime<Utc>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            since,
        }
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    pub fn for_project(&self, project: &ProjectRef) -> ProjectApi {
        ProjectApi {
            fetcher: Arc::clone(&self.fetcher),
            base_url: self.base_url.clone(),
            collection: project.collection.clone(),
            project: project.project.clone(),
            since: self.since,
        }
    }
}

/// Resource getters bound to one `(collection, project)`.
#[derive(Clone)]
pub struct ProjectApi {
    fetcher: Arc<PagedFetcher>,
    base_url: String,
    collection: String,
    project: String,
    since: DateTime<Utc>,
}

impl ProjectApi {
    fn url(&self, path: &str) -> String {
        format!(
            "{}{}/{}/_apis{}",
            self.base_url,
            urlencoding::encode(&self.collection),
            urlencoding::encode(&self.project),
            path
        )
    }

    /// Work-item endpoints that take ids live at collection level.
    fn collection_url(&self, path: &str) -> String {
        format!(
            "{}{}/_apis{}",
            self.base_url,
            urlencoding::encode(&self.collection),
            path
        )
    }

    fn key(&self, resource: &str) -> String {
        format!("{}_{}_{}", self.collection, self.project, resource)
    }

    fn since_param(&self) -> String {
        self.since.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub async fn repositories(&self) -> Result<Vec<Repository>> {
        self.fetcher
            .list(&self.url("/git/repositories"), &[], &self.key("repositories"))
            .await
    }

    /// Builds that finished inside the lookback window.
    pub async fn builds(&self) -> Result<Vec<Build>> {
        self.fetcher
            .list(
                &self.url("/build/builds"),
                &[("minTime", self.since_param())],
                &self.key("builds"),
            )
            .await
    }

    pub async fn build_definitions(&self) -> Result<Vec<BuildDefinition>> {
        self.fetcher
            .list(
                &self.url("/build/definitions"),
                &[("includeLatestBuilds", "true".to_string())],
                &self.key("build-definitions"),
            )
            .await
    }

    pub async fn pull_requests(&self) -> Result<Vec<PullRequest>> {
        self.fetcher
            .list(
                &self.url("/git/pullrequests"),
                &[("searchCriteria.status", "all".to_string())],
                &self.key("prs"),
            )
            .await
    }

    pub async fn branch_stats(&self, repo_id: &str) -> Result<Vec<BranchStat>> {
        self.fetcher
            .list(
                &self.url(&format!("/git/repositories/{}/stats/branches", repo_id)),
                &[],
                &self.key(&format!("{}_branches", repo_id)),
            )
            .await
    }

    pub async fn commits(&self, repo_id: &str) -> Result<Vec<GitCommit>> {
        self.fetcher
            .list(
                &self.url(&format!("/git/repositories/{}/commits", repo_id)),
                &[
                    ("searchCriteria.fromDate", self.since_param()),
                    ("searchCriteria.$top", "5000".to_string()),
                ],
                &self.key(&format!("{}_commits", repo_id)),
            )
            .await
    }

    pub async fn test_runs(&self) -> Result<Vec<TestRun>> {
        self.fetcher
            .list(
                &self.url("/test/runs"),
                &[("includeRunDetails", "true".to_string())],
                &self.key("testruns"),
            )
            .await
    }

    pub async fn test_coverage(&self, build_id: u64) -> Result<CodeCoverage> {
        self.fetcher
            .get_one(
                &self.url("/test/codecoverage"),
                &[("buildId", build_id.to_string())],
                &self.key(&format!("coverage_{}", build_id)),
            )
            .await
    }

    pub async fn releases(&self) -> Result<Vec<Release>> {
        self.fetcher
            .list(
                &self.url("/release/releases"),
                &[
                    ("minCreatedTime", self.since_param()),
                    ("$expand", "environments".to_string()),
                ],
                &self.key("releases"),
            )
            .await
    }

    pub async fn work_item_types(&self) -> Result<Vec<WorkItemType>> {
        self.fetcher
            .list(&self.url("/wit/workitemtypes"), &[], &self.key("workitemtypes"))
            .await
    }

    /// Runs a saved hierarchical query and returns its relations.
    pub async fn work_item_query(&self, query_id: &str) -> Result<WorkItemQueryResult> {
        self.fetcher
            .get_one(
                &self.url(&format!("/wit/wiql/{}", query_id)),
                &[],
                &self.key(&format!("query_{}", query_id)),
            )
            .await
    }
}

/// Short stable key for a batch of ids.
fn batch_key(ids: &[WorkItemId]) -> String {
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(&digest[..8])
}

#[async_trait]
impl WorkItemSource for ProjectApi {
    /// Fetches in batches of [`WORK_ITEM_BATCH_SIZE`], all batches at once.
    async fn work_items(&self, ids: &[WorkItemId]) -> Result<Vec<WorkItem>> {
        let url = self.collection_url("/wit/workitems");
        let batches = ids.chunks(WORK_ITEM_BATCH_SIZE).map(|chunk| {
            let ids_param = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let key = self.key(&format!("workitems_{}", batch_key(chunk)));
            let url = url.as_str();
            async move {
                let list: ListOf<WorkItem> = self
                    .fetcher
                    .get_one(url, &[("ids", ids_param), ("$expand", "fields".to_string())], &key)
                    .await?;
                Ok::<_, crate::error::Error>(list.value)
            }
        });

        let batches = try_join_all(batches).await?;
        Ok(batches.into_iter().flatten().collect())
    }

    async fn revisions(&self, id: WorkItemId) -> Result<Vec<WorkItemRevision>> {
        self.fetcher
            .list(
                &self.collection_url(&format!("/wit/workItems/{}/revisions", id)),
                &[],
                &self.key(&format!("workitem_{}_revisions", id)),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskCache;
    use crate::fetch::http::{HttpGet, HttpResponse};
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every request and answers each list call with one item.
    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    #[async_trait]
    impl HttpGet for Recorder {
        async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), query.to_vec()));

            let body = if url.ends_with("/wit/workitems") {
                let ids = &query.iter().find(|(k, _)| k == "ids").unwrap().1;
                let value: Vec<_> = ids
                    .split(',')
                    .map(|id| {
                        json!({
                            "id": id.parse::<u64>().unwrap(),
                            "fields": {
                                "System.WorkItemType": "Task",
                                "System.CreatedDate": "2024-01-01T00:00:00.000Z"
                            }
                        })
                    })
                    .collect();
                json!({ "value": value })
            } else {
                json!({ "value": [{ "id": "r1", "name": "payments" }] })
            };
            Ok(HttpResponse::new(body))
        }
    }

    fn api(http: Arc<Recorder>, dir: &TempDir) -> ProjectApi {
        let cache = Arc::new(DiskCache::new(dir.path(), chrono::Duration::hours(1)));
        let fetcher = Arc::new(PagedFetcher::new(http, cache, 500));
        let since = "2024-01-01T00:00:00Z".parse().unwrap();
        AzureApi::new(fetcher, "https://dev.azure.com/", since).for_project(&ProjectRef {
            collection: "acme".to_string(),
            project: "pay ments".to_string(),
        })
    }

    #[tokio::test]
    async fn test_repositories_url_and_cache_key() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(Recorder::default());
        let api = api(http.clone(), &dir);

        let repos = api.repositories().await.unwrap();

        assert_eq!(repos[0].name, "payments");
        let requests = http.requests.lock().unwrap();
        assert_eq!(requests[0].0, "https://dev.azure.com/acme/pay%20ments/_apis/git/repositories");
        assert!(dir.path().join("acme_pay ments_repositories_0.json").exists());
    }

    #[tokio::test]
    async fn test_builds_send_min_time() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(Recorder::default());
        let api = api(http.clone(), &dir);

        // The recorder's repository body doesn't parse as a build
        let _ = api.builds().await;

        let requests = http.requests.lock().unwrap();
        assert!(requests[0]
            .1
            .contains(&("minTime".to_string(), "2024-01-01T00:00:00.000Z".to_string())));
    }

    #[tokio::test]
    async fn test_work_items_are_batched() {
        let dir = TempDir::new().unwrap();
        let http = Arc::new(Recorder::default());
        let api = api(http.clone(), &dir);
        let ids: Vec<WorkItemId> = (1..=450).collect();

        let items = api.work_items(&ids).await.unwrap();

        assert_eq!(items.len(), 450);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[449].id, 450);
        assert_eq!(http.requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_batch_key_is_stable() {
        assert_eq!(batch_key(&[1, 2, 3]), batch_key(&[1, 2, 3]));
        assert_ne!(batch_key(&[1, 2, 3]), batch_key(&[1, 2, 4]));
        assert_eq!(batch_key(&[1]).len(), 16);
    }
}
