//! Retailer registry - URL-domain dispatch for supported sites

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::domain::product::ProductKey;
use crate::shared::errors::AppError;
use crate::shared::utils::title_from_slug;

/// Supported retailers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retailer {
    Walmart,
    Target,
}

impl Retailer {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Retailer::Walmart => "walmart",
            Retailer::Target => "target",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Retailer::Walmart => "Walmart",
            Retailer::Target => "Target",
        }
    }

    /// Registrable domain the retailer's product pages live under
    pub fn domain(&self) -> &'static str {
        match self {
            Retailer::Walmart => "walmart.com",
            Retailer::Target => "target.com",
        }
    }
}

impl fmt::Display for Retailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Retailer {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "walmart" => Ok(Retailer::Walmart),
            "target" => Ok(Retailer::Target),
            other => Err(AppError::UnsupportedRetailer(other.to_string())),
        }
    }
}

/// A product URL resolved against the registry
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProduct {
    pub key: ProductKey,
    pub url: String,
    pub display_name: String,
}

fn walmart_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/ip/([^/]+)/(\d+)").expect("valid regex"))
}

fn target_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/p/([^/]+)/-/A-(\d+)").expect("valid regex"))
}

/// Registry of supported retailers
pub struct RetailerRegistry;

impl RetailerRegistry {
    /// Get all supported retailers
    pub fn all() -> Vec<Retailer> {
        vec![Retailer::Walmart, Retailer::Target]
    }

    /// Pick the retailer owning `host`, matching the domain or any subdomain of it
    pub fn retailer_for_host(host: &str) -> Option<Retailer> {
        let host = host.to_ascii_lowercase();
        Self::all().into_iter().find(|r| {
            let domain = r.domain();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    /// Validate a product URL and derive its canonical product reference
    pub fn resolve(raw_url: &str) -> Result<ResolvedProduct, AppError> {
        let url = Url::parse(raw_url.trim())
            .map_err(|e| AppError::ValidationError(format!("Invalid URL: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| AppError::ValidationError("URL has no host".to_string()))?;
        let retailer = Self::retailer_for_host(host)
            .ok_or_else(|| AppError::UnsupportedRetailer(host.to_string()))?;

        let path = url.path();
        let (slug, product_ref) = match retailer {
            Retailer::Walmart => {
                if !path.contains("/ip/") {
                    return Err(AppError::ValidationError("Walmart URL must contain '/ip/'".into()));
                }
                let caps = walmart_path().captures(path).ok_or_else(|| {
                    AppError::ValidationError("Could not extract Walmart product ID".into())
                })?;
                (caps[1].to_string(), caps[2].to_string())
            }
            Retailer::Target => {
                if !path.contains("/p/") || !path.contains("/-/A-") {
                    return Err(AppError::ValidationError(
                        "Target URL must contain '/p/' and '/-/A-'".into(),
                    ));
                }
                let caps = target_path().captures(path).ok_or_else(|| {
                    AppError::ValidationError("Could not extract Target product ID".into())
                })?;
                (caps[1].to_string(), caps[2].to_string())
            }
        };

        let display_name = match title_from_slug(&slug) {
            name if name.is_empty() => format!("{} Product", retailer.display_name()),
            name => name,
        };

        Ok(ResolvedProduct {
            key: ProductKey::new(retailer, product_ref),
            url: url.to_string(),
            display_name,
        })
    }
}
