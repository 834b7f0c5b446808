//! Storefront domain types, decoupled from the Shopify wire shapes.

use crate::errors::{CommerceError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default = "default_true")]
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<f64>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_quantity: Option<i64>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Stock answer for a product or one of its variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Availability {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Availability {
    pub fn in_stock(quantity: Option<i64>) -> Self {
        Self {
            available: true,
            quantity,
            reason: None,
        }
    }

    pub fn out_of_stock(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            quantity: Some(0),
            reason: Some(reason.into()),
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

/// Maps one entry of the Admin API `products.json` payload into the domain
/// product. The headline price is the first variant's price; a product with
/// no variants is rejected rather than priced at zero.
pub fn product_from_shopify(raw: &Value) -> Result<Product> {
    let id = json_id(raw.get("id"))
        .ok_or_else(|| CommerceError::Payload("product missing id".to_string()))?;
    let title = raw
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| CommerceError::Payload(format!("product {id} missing title")))?
        .to_string();

    let variants: Vec<ProductVariant> = raw
        .get("variants")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| variant_from_shopify(&id, entry))
                .collect()
        })
        .unwrap_or_default();

    let price = variants
        .first()
        .map(|variant| variant.price)
        .ok_or_else(|| CommerceError::Payload(format!("product {id} has no variants")))?;

    let tags = raw
        .get("tags")
        .and_then(Value::as_str)
        .map(|tags| {
            tags.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let images = raw
        .get("images")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|image| image.get("src").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let available = raw
        .get("status")
        .and_then(Value::as_str)
        .map(|status| status == "active")
        .unwrap_or(true)
        && variants.iter().any(|variant| variant.available);

    Ok(Product {
        id,
        title,
        description: raw
            .get("body_html")
            .and_then(Value::as_str)
            .filter(|body| !body.is_empty())
            .map(str::to_string),
        vendor: raw
            .get("vendor")
            .and_then(Value::as_str)
            .filter(|vendor| !vendor.is_empty())
            .map(str::to_string),
        product_type: raw
            .get("product_type")
            .and_then(Value::as_str)
            .filter(|kind| !kind.is_empty())
            .map(str::to_string),
        tags,
        price,
        currency: default_currency(),
        images,
        variants,
        available,
    })
}

fn variant_from_shopify(product_id: &str, raw: &Value) -> Option<ProductVariant> {
    let id = json_id(raw.get("id"))?;
    let price = raw
        .get("price")
        .and_then(|price| match price {
            Value::String(text) => text.parse::<f64>().ok(),
            Value::Number(num) => num.as_f64(),
            _ => None,
        })?;

    let inventory_quantity = raw.get("inventory_quantity").and_then(Value::as_i64);
    let available = match raw.get("inventory_policy").and_then(Value::as_str) {
        // "continue" variants stay sellable when the count hits zero.
        Some("continue") => true,
        _ => inventory_quantity.map(|count| count > 0).unwrap_or(true),
    };

    Some(ProductVariant {
        id,
        product_id: product_id.to_string(),
        title: raw
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Default")
            .to_string(),
        sku: raw
            .get("sku")
            .and_then(Value::as_str)
            .filter(|sku| !sku.is_empty())
            .map(str::to_string),
        price,
        compare_at_price: raw.get("compare_at_price").and_then(|price| match price {
            Value::String(text) => text.parse::<f64>().ok(),
            Value::Number(num) => num.as_f64(),
            _ => None,
        }),
        available,
        inventory_quantity,
        options: HashMap::new(),
    })
}

/// Shopify ids arrive as numbers on the Admin API but as strings elsewhere.
fn json_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_product() -> Value {
        json!({
            "id": 632910392,
            "title": "Cloud Hoodie",
            "body_html": "<p>Soft fleece hoodie</p>",
            "vendor": "Thenga Supply",
            "product_type": "Hoodies",
            "status": "active",
            "tags": "fleece, winter, cozy",
            "variants": [
                {
                    "id": 808950810,
                    "title": "Small",
                    "sku": "HOOD-S",
                    "price": "89.00",
                    "compare_at_price": "109.00",
                    "inventory_quantity": 4,
                    "inventory_policy": "deny"
                },
                {
                    "id": 808950811,
                    "title": "Large",
                    "price": "95.00",
                    "inventory_quantity": 0,
                    "inventory_policy": "deny"
                }
            ],
            "images": [{"src": "https://cdn.example.com/hoodie.jpg"}]
        })
    }

    #[test]
    fn maps_admin_payload_to_domain_product() {
        let product = product_from_shopify(&raw_product()).expect("parse");
        assert_eq!(product.id, "632910392");
        assert_eq!(product.title, "Cloud Hoodie");
        assert_eq!(product.price, 89.0);
        assert_eq!(product.tags, vec!["fleece", "winter", "cozy"]);
        assert_eq!(product.vendor.as_deref(), Some("Thenga Supply"));
        assert_eq!(product.variants.len(), 2);
        assert_eq!(product.variants[0].sku.as_deref(), Some("HOOD-S"));
        assert_eq!(product.variants[0].compare_at_price, Some(109.0));
        assert!(product.variants[0].available);
        assert!(!product.variants[1].available);
        assert!(product.available);
    }

    #[test]
    fn product_without_variants_is_rejected() {
        let raw = json!({"id": 1, "title": "Ghost", "variants": []});
        assert!(matches!(
            product_from_shopify(&raw),
            Err(CommerceError::Payload(_))
        ));
    }

    #[test]
    fn archived_product_is_unavailable() {
        let mut raw = raw_product();
        raw["status"] = json!("archived");
        let product = product_from_shopify(&raw).expect("parse");
        assert!(!product.available);
    }

    #[test]
    fn continue_policy_keeps_zero_stock_variant_sellable() {
        let raw = json!({
            "id": 2,
            "title": "Backorder Tee",
            "variants": [{
                "id": 20,
                "title": "Default",
                "price": "25.00",
                "inventory_quantity": 0,
                "inventory_policy": "continue"
            }]
        });
        let product = product_from_shopify(&raw).expect("parse");
        assert!(product.variants[0].available);
        assert!(product.available);
    }

    #[test]
    fn string_ids_are_accepted() {
        let raw = json!({
            "id": "abc-123",
            "title": "Sticker",
            "variants": [{"id": "v-1", "title": "Default", "price": 3.5}]
        });
        let product = product_from_shopify(&raw).expect("parse");
        assert_eq!(product.id, "abc-123");
        assert_eq!(product.variants[0].id, "v-1");
        assert_eq!(product.variants[0].price, 3.5);
    }
}
