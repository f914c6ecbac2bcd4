//! Network access: the HTTP seam, pagination and the Azure DevOps getters

pub mod azure;
pub mod http;
pub mod paged;

pub use azure::{AzureApi, ProjectApi, WORK_ITEM_BATCH_SIZE};
pub use http::{AzureHttp, HttpGet, HttpResponse};
pub use paged::{CachedPage, ListOf, PagedFetcher, API_VERSION, CONTINUATION_HEADER, MAX_PAGES};
