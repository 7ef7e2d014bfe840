use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use super::page_client::PageClient;
use crate::domain::product::{Listing, ProductKey};
use crate::domain::retailer::{Retailer, RetailerFetcher};
use crate::shared::errors::FetchError;

/// Walmart fetcher
/// Reads the `__NEXT_DATA__` JSON blob Walmart embeds in every product page
pub struct WalmartFetcher {
    client: PageClient,
}

impl WalmartFetcher {
    pub fn new(client: PageClient) -> Self {
        Self { client }
    }
}

fn next_data_script() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).expect("valid regex")
    })
}

/// Extract price, availability and name from a Walmart product page
pub fn parse_walmart_page(html: &str) -> Result<Listing, FetchError> {
    let raw = next_data_script()
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| FetchError::ParseFailure("Could not find product data".to_string()))?;

    let data: Value = serde_json::from_str(raw.as_str())
        .map_err(|e| FetchError::ParseFailure(format!("Invalid __NEXT_DATA__ JSON: {}", e)))?;

    let product = data
        .pointer("/props/pageProps/initialData/data/product")
        .filter(|p| p.is_object())
        .ok_or(FetchError::NotFound)?;

    let price = product
        .pointer("/priceInfo/currentPrice/price")
        .and_then(Value::as_f64)
        .ok_or_else(|| FetchError::ParseFailure("Missing current price".to_string()))?;

    let available = product
        .get("availabilityStatus")
        .and_then(Value::as_str)
        .map(|s| s == "IN_STOCK")
        .unwrap_or(false);

    let name = product.get("name").and_then(Value::as_str).map(str::to_string);

    Ok(Listing { price, available, name })
}

#[async_trait]
impl RetailerFetcher for WalmartFetcher {
    fn retailer(&self) -> Retailer {
        Retailer::Walmart
    }

    async fn fetch(&self, key: &ProductKey, url: &str) -> Result<Listing, FetchError> {
        let html = self.client.get_page(url).await?;
        let listing = parse_walmart_page(&html)?;
        debug!(product = %key, price = listing.price, available = listing.available, "walmart listing parsed");
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(product: &str) -> String {
        format!(
            r#"<html><head></head><body>
            <script id="__NEXT_DATA__" type="application/json">
            {{"props":{{"pageProps":{{"initialData":{{"data":{{"product":{}}}}}}}}}}}
            </script></body></html>"#,
            product
        )
    }

    #[test]
    fn test_parse_in_stock_product() {
        let html = page(
            r#"{"name":"Desk Lamp","availabilityStatus":"IN_STOCK",
                "priceInfo":{"currentPrice":{"price":24.97}}}"#,
        );
        let listing = parse_walmart_page(&html).unwrap();
        assert_eq!(listing.price, 24.97);
        assert!(listing.available);
        assert_eq!(listing.name.as_deref(), Some("Desk Lamp"));
    }

    #[test]
    fn test_parse_out_of_stock_product() {
        let html = page(
            r#"{"name":"Desk Lamp","availabilityStatus":"OUT_OF_STOCK",
                "priceInfo":{"currentPrice":{"price":19}}}"#,
        );
        let listing = parse_walmart_page(&html).unwrap();
        assert_eq!(listing.price, 19.0);
        assert!(!listing.available);
    }

    #[test]
    fn test_missing_blob_is_parse_failure() {
        let err = parse_walmart_page("<html><body>captcha</body></html>").unwrap_err();
        assert!(matches!(err, FetchError::ParseFailure(_)));
    }

    #[test]
    fn test_missing_price_is_parse_failure() {
        let html = page(r#"{"name":"Desk Lamp","priceInfo":{}}"#);
        assert!(matches!(parse_walmart_page(&html), Err(FetchError::ParseFailure(_))));
    }

    #[test]
    fn test_null_product_is_not_found() {
        let html = page("null");
        assert_eq!(parse_walmart_page(&html), Err(FetchError::NotFound));
    }
}
