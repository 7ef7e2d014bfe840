use std::collections::HashMap;
use std::sync::Arc;

use super::page_client::PageClient;
use super::target_fetcher::TargetFetcher;
use super::walmart_fetcher::WalmartFetcher;
use crate::domain::retailer::{Retailer, RetailerFetcher, RetailerRegistry};

/// Factory for creating retailer fetchers
pub struct RetailerFetcherFactory {
    client: PageClient,
}

impl RetailerFetcherFactory {
    pub fn new(client: PageClient) -> Self {
        Self { client }
    }

    /// Create a fetcher for the specified retailer
    pub fn create_fetcher(&self, retailer: Retailer) -> Arc<dyn RetailerFetcher> {
        match retailer {
            Retailer::Walmart => Arc::new(WalmartFetcher::new(self.client.clone())),
            Retailer::Target => Arc::new(TargetFetcher::new(self.client.clone())),
        }
    }

    /// One fetcher per supported retailer
    pub fn create_all(&self) -> HashMap<Retailer, Arc<dyn RetailerFetcher>> {
        RetailerRegistry::all()
            .into_iter()
            .map(|retailer| (retailer, self.create_fetcher(retailer)))
            .collect()
    }
}
