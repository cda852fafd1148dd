pub mod error;
pub mod http;
pub mod normalize;
pub mod query;
pub mod raw;

use async_trait::async_trait;

use error::TransportFailure;
use query::Wiql;
use raw::RawResult;

/// The narrow surface the workflows need from the work item service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a WIQL query. Returns ids only, as flat items or relation edges.
    async fn execute(&self, query: &Wiql) -> Result<RawResult, TransportFailure>;

    /// Batch-fetch full work items. Callers never pass an empty id list.
    async fn fetch_details(&self, ids: &[u64]) -> Result<RawResult, TransportFailure>;

    /// Fetch a single work item with its links, wrapped as a one-element flat list.
    async fn fetch_with_relations(&self, id: u64) -> Result<RawResult, TransportFailure>;
}
