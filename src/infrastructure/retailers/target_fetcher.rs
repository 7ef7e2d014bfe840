use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::page_client::PageClient;
use crate::domain::product::{Listing, ProductKey};
use crate::domain::retailer::{Retailer, RetailerFetcher};
use crate::shared::errors::FetchError;

const SHIPPING_POSITIVE: &[&str] = &[
    "arrives",
    "get it by",
    "available",
    "free shipping",
    "deliver",
    "ships",
    "standard shipping",
    "2-day shipping",
];

const SHIPPING_NEGATIVE: &[&str] = &["not available", "unavailable", "cannot ship", "sold out"];

/// Target fetcher
/// Reads the `data-test` tagged price, title and shipping cells of a product page
pub struct TargetFetcher {
    client: PageClient,
}

impl TargetFetcher {
    pub fn new(client: PageClient) -> Self {
        Self { client }
    }
}

fn price_cell() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)data-test="product-price"[^>]*>(.*?)</"#).expect("valid regex")
    })
}

fn price_amount() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([\d,]+\.?\d*)").expect("valid regex"))
}

fn title_cell() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<h1[^>]*data-test="product-title"[^>]*>(.*?)</h1>"#).expect("valid regex")
    })
}

fn shipping_cell() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)data-test="fulfillment-cell-shipping"[^>]*>(.*?)</div>"#).expect("valid regex")
    })
}

fn tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn text_of(fragment: &str) -> String {
    tags()
        .replace_all(fragment, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shipping message counts as available if it has a positive cue and no negative one
pub fn shipping_available(message: &str) -> bool {
    let message = message.to_lowercase();
    SHIPPING_POSITIVE.iter().any(|k| message.contains(k))
        && !SHIPPING_NEGATIVE.iter().any(|k| message.contains(k))
}

/// Extract price, availability and name from a Target product page
pub fn parse_target_page(html: &str) -> Result<Listing, FetchError> {
    let price_text = price_cell()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| text_of(m.as_str()))
        .ok_or_else(|| FetchError::ParseFailure("Could not find price element".to_string()))?;

    let price = price_amount()
        .captures(&price_text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .ok_or_else(|| FetchError::ParseFailure(format!("Unreadable price '{}'", price_text)))?;

    let available = shipping_cell()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| shipping_available(&text_of(m.as_str())))
        .unwrap_or(false);

    let name = title_cell()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| text_of(m.as_str()))
        .filter(|n| !n.is_empty());

    Ok(Listing { price, available, name })
}

#[async_trait]
impl RetailerFetcher for TargetFetcher {
    fn retailer(&self) -> Retailer {
        Retailer::Target
    }

    async fn fetch(&self, key: &ProductKey, url: &str) -> Result<Listing, FetchError> {
        let html = self.client.get_page(url).await?;
        let listing = parse_target_page(&html)?;
        debug!(product = %key, price = listing.price, available = listing.available, "target listing parsed");
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <h1 class="x" data-test="product-title">LEGO <b>Star Wars</b> Set</h1>
        <span data-test="product-price">$1,049.99</span>
        <div data-test="fulfillment-cell-shipping"><span>Arrives by Fri, Oct 23</span></div>
    "#;

    #[test]
    fn test_parse_product_page() {
        let listing = parse_target_page(PAGE).unwrap();
        assert_eq!(listing.price, 1049.99);
        assert!(listing.available);
        assert_eq!(listing.name.as_deref(), Some("LEGO Star Wars Set"));
    }

    #[test]
    fn test_sold_out_shipping() {
        let html = PAGE.replace("Arrives by Fri, Oct 23", "Shipping not available");
        let listing = parse_target_page(&html).unwrap();
        assert!(!listing.available);
    }

    #[test]
    fn test_missing_price_is_parse_failure() {
        let err = parse_target_page("<h1 data-test=\"product-title\">X</h1>").unwrap_err();
        assert!(matches!(err, FetchError::ParseFailure(_)));
    }

    #[test]
    fn test_shipping_keywords() {
        assert!(shipping_available("Free shipping, get it by Tue"));
        assert!(!shipping_available("Sold out"));
        assert!(!shipping_available("Pickup only"));
    }
}
