//! Retailer domain - supported sites and the fetch capability

mod retailer_fetcher;
mod retailer_registry;

pub use retailer_fetcher::RetailerFetcher;
pub use retailer_registry::{ResolvedProduct, Retailer, RetailerRegistry};
