//! Pricewatch - retail price monitor with drop alerts
//! Layered as shared / domain / infrastructure / application

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::{PriceTrackingService, Scheduler, SweepTrigger};
pub use domain::alert::{Alert, AlertEvaluator};
pub use domain::retailer::RetailerRegistry;
pub use infrastructure::storage::{MemoryPriceStore, PriceStore, SqlitePriceStore};
pub use shared::config::{ConfigLoader, MonitorConfig};
