//! Product domain - tracked products and their price observations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::retailer::Retailer;
use crate::shared::errors::{AppError, FetchError};
use crate::shared::types::Price;

/// Product identity: retailer plus the canonical reference taken from the URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    pub retailer: Retailer,
    pub product_ref: String,
}

impl ProductKey {
    pub fn new(retailer: Retailer, product_ref: impl Into<String>) -> Self {
        Self {
            retailer,
            product_ref: product_ref.into(),
        }
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.retailer, self.product_ref)
    }
}

impl FromStr for ProductKey {
    type Err = AppError;

    /// Parses the `retailer:ref` form produced by `Display`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (retailer, product_ref) = s
            .split_once(':')
            .ok_or_else(|| AppError::ValidationError(format!("Invalid product key: {}", s)))?;
        if product_ref.is_empty() {
            return Err(AppError::ValidationError(format!("Invalid product key: {}", s)));
        }
        Ok(Self::new(retailer.parse()?, product_ref))
    }
}

/// Tracked product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub key: ProductKey,
    pub url: String,
    pub name: String,
    pub last_price: Option<Price>,
    pub last_available: Option<bool>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(key: ProductKey, url: String, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            url,
            name,
            last_price: None,
            last_available: None,
            last_checked_at: None,
            created_at,
        }
    }

    /// Fold a successful observation into the product's last-known state.
    /// Failed observations leave the product untouched.
    pub fn apply_observation(&mut self, observation: &PriceObservation, fetched_name: Option<&str>) {
        if let FetchStatus::Success = observation.fetch_status {
            self.last_price = observation.price;
            self.last_available = Some(observation.available);
            self.last_checked_at = Some(observation.observed_at);
            if let Some(name) = fetched_name.map(str::trim).filter(|n| !n.is_empty()) {
                self.name = name.to_string();
            }
        }
    }
}

/// What a retailer page says about a product right now
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub price: Price,
    pub available: bool,
    pub name: Option<String>,
}

/// Outcome of the fetch that produced an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Failed { error: String },
}

/// Immutable, append-only price fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub product: ProductKey,
    pub price: Option<Price>,
    pub available: bool,
    pub observed_at: DateTime<Utc>,
    pub fetch_status: FetchStatus,
}

impl PriceObservation {
    pub fn success(product: ProductKey, price: Price, available: bool, observed_at: DateTime<Utc>) -> Self {
        Self {
            product,
            price: Some(price),
            available,
            observed_at,
            fetch_status: FetchStatus::Success,
        }
    }

    pub fn failed(product: ProductKey, error: &FetchError, observed_at: DateTime<Utc>) -> Self {
        Self {
            product,
            price: None,
            available: false,
            observed_at,
            fetch_status: FetchStatus::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.fetch_status, FetchStatus::Success)
    }
}

/// Observation together with anything else the fetch learned
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub record: PriceObservation,
    pub fetched_name: Option<String>,
}
