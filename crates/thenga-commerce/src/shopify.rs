//! Shopify Admin REST catalog backend.

use crate::errors::{CommerceError, Result};
use crate::gateway::{rank_matches, CatalogGateway};
use crate::types::{product_from_shopify, Product};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Admin REST caps `limit` at 250 per page.
const MAX_PAGE_SIZE: u32 = 250;

pub struct ShopifyCatalog {
    http: reqwest::Client,
    base_url: String,
}

impl ShopifyCatalog {
    pub fn new(store_url: &str, access_token: &str, api_version: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(access_token)
            .map_err(|_| CommerceError::Request("invalid access token".to_string()))?;
        token.set_sensitive(true);
        headers.insert("X-Shopify-Access-Token", token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| CommerceError::Request(err.to_string()))?;

        Ok(Self {
            http,
            base_url: admin_base_url(store_url, api_version),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, "shopify request");
        let response = self.http.get(&url).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(60);
            return Err(CommerceError::RateLimited { retry_after_secs });
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommerceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CatalogGateway for ShopifyCatalog {
    async fn list_products(&self, limit: u32) -> Result<Vec<Product>> {
        let capped = limit.min(MAX_PAGE_SIZE);
        let payload = self
            .get_json(
                "products.json",
                &[
                    ("limit", capped.to_string()),
                    ("status", "active".to_string()),
                ],
            )
            .await?;

        let entries = payload
            .get("products")
            .and_then(Value::as_array)
            .ok_or_else(|| CommerceError::Payload("missing products array".to_string()))?;

        // One malformed product never hides the rest of the page.
        let mut products = Vec::with_capacity(entries.len());
        for entry in entries {
            match product_from_shopify(entry) {
                Ok(product) => products.push(product),
                Err(err) => warn!(error = %err, "skipping malformed product"),
            }
        }
        Ok(products)
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        let payload = match self
            .get_json(&format!("products/{product_id}.json"), &[])
            .await
        {
            Ok(payload) => payload,
            Err(CommerceError::Api { status: 404, .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        let raw = payload
            .get("product")
            .ok_or_else(|| CommerceError::Payload("missing product object".to_string()))?;
        product_from_shopify(raw).map(Some)
    }

    /// Admin REST has no keyword search, so this pulls a full page and
    /// ranks locally.
    async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>> {
        let products = self.list_products(MAX_PAGE_SIZE).await?;
        Ok(rank_matches(products, query, limit))
    }
}

fn admin_base_url(store_url: &str, api_version: &str) -> String {
    let host = store_url
        .trim_end_matches('/')
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    format!("https://{host}/admin/api/{api_version}")
}
