//! Retailer fetch capability

use async_trait::async_trait;

use super::Retailer;
use crate::domain::product::{Listing, ProductKey};
use crate::shared::errors::FetchError;

/// Common interface for all retailer implementations.
///
/// Implementations perform exactly one network round-trip per call and never
/// retry; retries, timeouts and throttling belong to the `FetchCoordinator`.
#[async_trait]
pub trait RetailerFetcher: Send + Sync {
    fn retailer(&self) -> Retailer;

    /// Fetch the current price and availability for one product page
    async fn fetch(&self, key: &ProductKey, url: &str) -> Result<Listing, FetchError>;
}
