//! Request deduplication cache: request ID -> previously computed response.

use std::collections::HashMap;

use crate::server::{BidResponse, RequestId};

/// Write-once mapping from request ID to response. Entries live for the
/// lifetime of the process.
// TODO: entries are never evicted; bound the cache (e.g. by auction close or
//       per-bidder high-water marks) if auctions get long-lived
#[derive(Debug, Default)]
pub struct DedupCache {
    responses: HashMap<RequestId, BidResponse>,
}

impl DedupCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the stored response for `request_id`.
    pub fn get(&self, request_id: &str) -> Option<&BidResponse> {
        self.responses.get(request_id)
    }

    /// Stores `response` under `request_id` unless an entry already exists.
    /// Returns the stored response, which is the earlier one if any.
    pub fn commit(
        &mut self,
        request_id: RequestId,
        response: BidResponse,
    ) -> &BidResponse {
        self.responses.entry(request_id).or_insert(response)
    }

    /// Number of stored responses.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// True if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}
