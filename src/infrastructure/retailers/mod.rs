pub mod factory;
pub mod page_client;
pub mod target_fetcher;
pub mod walmart_fetcher;

pub use factory::RetailerFetcherFactory;
pub use page_client::PageClient;
pub use target_fetcher::TargetFetcher;
pub use walmart_fetcher::WalmartFetcher;
