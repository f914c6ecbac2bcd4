//! Continuation-token pagination through the disk cache

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::http::HttpGet;
use crate::cache::DiskCache;
use crate::error::{Error, Result};

/// Response header carrying the token for the next page.
pub const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// REST API version sent with every request.
pub const API_VERSION: &str = "5.1";

/// Hard stop for servers that keep handing out continuation tokens.
pub const MAX_PAGES: usize = 10_000;

/// Body shape of every list endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListOf<T> {
    pub value: Vec<T>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// One page as stored in the cache. The continuation token is kept so a
/// cached walk follows the same chain of pages as the original one.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedPage<T> {
    pub value: Vec<T>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

/// Fetches every page of a list resource, one cache slot per page.
pub struct PagedFetcher {
    http: Arc<dyn HttpGet>,
    cache: Arc<DiskCache>,
    page_size: u32,
}

impl PagedFetcher {
    pub fn new(http: Arc<dyn HttpGet>, cache: Arc<DiskCache>, page_size: u32) -> Self {
        Self {
            http,
            cache,
            page_size,
        }
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Fetch and concatenate all pages of `url`, in server order.
    ///
    /// Page `n` is cached under `<key_prefix>_<n>`. An error on any page
    /// aborts the whole list and the pages fetched so far are dropped.
    pub async fn list<T>(&self, url: &str, query: &[(&str, String)], key_prefix: &str) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut token: Option<String> = None;

        for page_index in 0.. {
            if page_index >= MAX_PAGES {
                return Err(Error::Pagination {
                    key: key_prefix.to_string(),
                    message: format!("still paging after {} pages", MAX_PAGES),
                });
            }

            let key = format!("{}_{}", key_prefix, page_index);
            let params = self.page_query(query, token.as_deref());
            let page: CachedPage<T> = self
                .cache
                .cached(&[key.as_str()], || self.fetch_page(url, params))
                .await?;

            tracing::debug!(
                key = %key,
                items = page.value.len(),
                has_next = page.continuation_token.is_some(),
                "Fetched page"
            );

            items.extend(page.value);
            match page.continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(items)
    }

    /// Single cached GET for endpoints that don't paginate.
    pub async fn get_one<T>(&self, url: &str, query: &[(&str, String)], key: &str) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut params = vec![("api-version".to_string(), API_VERSION.to_string())];
        params.extend(query.iter().map(|(k, v)| (k.to_string(), v.clone())));

        self.cache
            .cached(&[key], || async move {
                let response = self.http.get(url, &params).await?;
                Ok(serde_json::from_value(response.body)?)
            })
            .await
    }

    fn page_query(&self, query: &[(&str, String)], token: Option<&str>) -> Vec<(String, String)> {
        let mut params = vec![
            ("api-version".to_string(), API_VERSION.to_string()),
            ("$top".to_string(), self.page_size.to_string()),
        ];
        if let Some(token) = token {
            params.push(("continuationToken".to_string(), token.to_string()));
        }
        params.extend(query.iter().map(|(k, v)| (k.to_string(), v.clone())));
        params
    }

    async fn fetch_page<T>(&self, url: &str, params: Vec<(String, String)>) -> Result<CachedPage<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.http.get(url, &params).await?;
        let continuation_token = response
            .header(CONTINUATION_HEADER)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let list: ListOf<T> = serde_json::from_value(response.body)?;

        Ok(CachedPage {
            value: list.value,
            continuation_token,
        })
    }
}
