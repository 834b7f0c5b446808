//! Catalog tools exposed to the conversation engine.
//!
//! Every gateway failure is folded into a failed [`ToolResult`] so the model
//! can narrate the problem instead of the turn aborting.

use crate::gateway::CatalogGateway;
use crate::types::{Availability, Product};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thenga_agent::{Result as AgentResult, Tool, ToolRegistry, ToolResult};
use tracing::info;

/// Registers the full catalog tool set against one shared gateway.
pub fn register_catalog_tools(
    registry: &mut ToolRegistry,
    gateway: Arc<dyn CatalogGateway>,
) -> AgentResult<()> {
    registry.register(GetProductCatalogTool::new(gateway.clone()))?;
    registry.register(GetProductDetailsTool::new(gateway.clone()))?;
    registry.register(CheckInventoryTool::new(gateway.clone()))?;
    registry.register(SearchProductsTool::new(gateway))?;
    Ok(())
}

fn parse_args<T>(args: Value) -> std::result::Result<T, ToolResult>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(args).map_err(|err| ToolResult::fail(format!("Invalid arguments: {err}")))
}

pub struct GetProductCatalogTool {
    gateway: Arc<dyn CatalogGateway>,
}

impl GetProductCatalogTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct CatalogArgs {
    #[serde(default = "default_catalog_limit")]
    limit: u32,
}

fn default_catalog_limit() -> u32 {
    50
}

#[async_trait]
impl Tool for GetProductCatalogTool {
    fn name(&self) -> &str {
        "get_product_catalog"
    }

    fn description(&self) -> &str {
        "Get all products in the catalog with full details for filtering"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of products to return",
                    "default": 50
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> AgentResult<ToolResult> {
        let args: CatalogArgs = match parse_args(args) {
            Ok(args) => args,
            Err(failure) => return Ok(failure),
        };

        match self.gateway.list_products(args.limit).await {
            Ok(products) => {
                info!(count = products.len(), "fetched product catalog");
                let total = products.len();
                Ok(ToolResult::ok_with_metadata(
                    products,
                    json!({"total_products": total, "limit": args.limit}),
                ))
            }
            Err(err) => Ok(ToolResult::fail(format!(
                "Failed to get product catalog: {err}"
            ))),
        }
    }
}

pub struct GetProductDetailsTool {
    gateway: Arc<dyn CatalogGateway>,
}

impl GetProductDetailsTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct DetailsArgs {
    product_id: String,
}

#[async_trait]
impl Tool for GetProductDetailsTool {
    fn name(&self) -> &str {
        "get_product_details"
    }

    fn description(&self) -> &str {
        "Get complete details about a specific product including variants"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": {
                    "type": "string",
                    "description": "The ID of the product"
                }
            },
            "required": ["product_id"]
        })
    }

    async fn execute(&self, args: Value) -> AgentResult<ToolResult> {
        let args: DetailsArgs = match parse_args(args) {
            Ok(args) => args,
            Err(failure) => return Ok(failure),
        };

        match self.gateway.get_product(&args.product_id).await {
            Ok(Some(product)) => {
                let variants_count = product.variants.len();
                let in_stock = product.available;
                Ok(ToolResult::ok_with_metadata(
                    json!({
                        "product": product,
                        "variants_count": variants_count,
                        "in_stock": in_stock,
                    }),
                    json!({"product_id": args.product_id}),
                ))
            }
            Ok(None) => Ok(ToolResult::fail(format!(
                "Product {} not found",
                args.product_id
            ))),
            Err(err) => Ok(ToolResult::fail(format!(
                "Failed to get product details: {err}"
            ))),
        }
    }
}

pub struct CheckInventoryTool {
    gateway: Arc<dyn CatalogGateway>,
}

impl CheckInventoryTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct InventoryArgs {
    product_id: String,
    #[serde(default)]
    variant_id: Option<String>,
    #[serde(default = "default_inventory_quantity")]
    quantity: i64,
}

fn default_inventory_quantity() -> i64 {
    1
}

fn check_availability(product: &Product, variant_id: Option<&str>, quantity: i64) -> Availability {
    let variants: Vec<_> = match variant_id {
        Some(id) => product
            .variants
            .iter()
            .filter(|variant| variant.id == id)
            .collect(),
        None => product.variants.iter().collect(),
    };

    if variants.is_empty() {
        return Availability::out_of_stock(match variant_id {
            Some(id) => format!("Variant {id} not found"),
            None => "Product has no variants".to_string(),
        });
    }

    let sellable = variants.iter().find(|variant| {
        variant.available
            && variant
                .inventory_quantity
                .map(|count| count >= quantity)
                .unwrap_or(true)
    });

    match sellable {
        Some(variant) => Availability::in_stock(variant.inventory_quantity),
        None => Availability::out_of_stock("Requested quantity not in stock"),
    }
}

#[async_trait]
impl Tool for CheckInventoryTool {
    fn name(&self) -> &str {
        "check_inventory"
    }

    fn description(&self) -> &str {
        "Check if a product or specific variant is in stock"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": {
                    "type": "string",
                    "description": "The ID of the product"
                },
                "variant_id": {
                    "type": "string",
                    "description": "The ID of the specific variant (optional)"
                },
                "quantity": {
                    "type": "integer",
                    "description": "The desired quantity",
                    "default": 1
                }
            },
            "required": ["product_id"]
        })
    }

    async fn execute(&self, args: Value) -> AgentResult<ToolResult> {
        let args: InventoryArgs = match parse_args(args) {
            Ok(args) => args,
            Err(failure) => return Ok(failure),
        };

        match self.gateway.get_product(&args.product_id).await {
            Ok(Some(product)) => {
                let availability =
                    check_availability(&product, args.variant_id.as_deref(), args.quantity);
                Ok(ToolResult::ok_with_metadata(
                    availability,
                    json!({
                        "product_id": args.product_id,
                        "variant_id": args.variant_id,
                        "quantity_requested": args.quantity,
                    }),
                ))
            }
            Ok(None) => Ok(ToolResult::ok(Availability::out_of_stock(
                "Product not found",
            ))),
            Err(err) => Ok(ToolResult::fail(format!("Failed to check inventory: {err}"))),
        }
    }
}

pub struct SearchProductsTool {
    gateway: Arc<dyn CatalogGateway>,
}

impl SearchProductsTool {
    pub fn new(gateway: Arc<dyn CatalogGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
    #[serde(default)]
    min_price: Option<f64>,
    #[serde(default)]
    max_price: Option<f64>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    product_type: Option<String>,
}

fn default_search_limit() -> usize {
    10
}

fn apply_filters(products: Vec<Product>, args: &SearchArgs) -> Vec<Product> {
    products
        .into_iter()
        .filter(|product| args.min_price.map(|min| product.price >= min).unwrap_or(true))
        .filter(|product| args.max_price.map(|max| product.price <= max).unwrap_or(true))
        .filter(|product| {
            args.vendor
                .as_deref()
                .map(|vendor| {
                    product
                        .vendor
                        .as_deref()
                        .is_some_and(|have| have.eq_ignore_ascii_case(vendor))
                })
                .unwrap_or(true)
        })
        .filter(|product| {
            args.product_type
                .as_deref()
                .map(|kind| {
                    product
                        .product_type
                        .as_deref()
                        .is_some_and(|have| have.eq_ignore_ascii_case(kind))
                })
                .unwrap_or(true)
        })
        .collect()
}

#[async_trait]
impl Tool for SearchProductsTool {
    fn name(&self) -> &str {
        "search_products"
    }

    fn description(&self) -> &str {
        "Search for products by keyword, with optional price and vendor filters"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results",
                    "default": 10
                },
                "min_price": {
                    "type": "number",
                    "description": "Minimum price filter"
                },
                "max_price": {
                    "type": "number",
                    "description": "Maximum price filter"
                },
                "vendor": {
                    "type": "string",
                    "description": "Exact vendor name filter"
                },
                "product_type": {
                    "type": "string",
                    "description": "Exact product type filter"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> AgentResult<ToolResult> {
        let args: SearchArgs = match parse_args(args) {
            Ok(args) => args,
            Err(failure) => return Ok(failure),
        };

        match self.gateway.search_products(&args.query, args.limit).await {
            Ok(products) => {
                let filtered = apply_filters(products, &args);
                info!(query = %args.query, count = filtered.len(), "product search finished");
                let total = filtered.len();
                Ok(ToolResult::ok_with_metadata(
                    filtered,
                    json!({"query": args.query, "total_results": total}),
                ))
            }
            Err(err) => Ok(ToolResult::fail(format!("Failed to search products: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CommerceError, Result};
    use crate::types::ProductVariant;
    use std::collections::HashMap;

    struct StubGateway {
        products: Vec<Product>,
        fail: bool,
    }

    impl StubGateway {
        fn with_products(products: Vec<Product>) -> Arc<Self> {
            Arc::new(Self {
                products,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                products: Vec::new(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl CatalogGateway for StubGateway {
        async fn list_products(&self, limit: u32) -> Result<Vec<Product>> {
            if self.fail {
                return Err(CommerceError::Request("connect timeout".to_string()));
            }
            Ok(self.products.iter().take(limit as usize).cloned().collect())
        }

        async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
            if self.fail {
                return Err(CommerceError::Request("connect timeout".to_string()));
            }
            Ok(self
                .products
                .iter()
                .find(|product| product.id == product_id)
                .cloned())
        }

        async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>> {
            if self.fail {
                return Err(CommerceError::Request("connect timeout".to_string()));
            }
            Ok(crate::gateway::rank_matches(
                self.products.clone(),
                query,
                limit,
            ))
        }
    }

    fn hoodie(id: &str, title: &str, price: f64, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            vendor: Some("Thenga Supply".to_string()),
            product_type: Some("Hoodies".to_string()),
            tags: vec!["fleece".to_string()],
            price,
            currency: "USD".to_string(),
            images: Vec::new(),
            variants: vec![ProductVariant {
                id: format!("{id}-v1"),
                product_id: id.to_string(),
                title: "Default".to_string(),
                sku: None,
                price,
                compare_at_price: None,
                available: stock > 0,
                inventory_quantity: Some(stock),
                options: HashMap::new(),
            }],
            available: stock > 0,
        }
    }

    #[tokio::test]
    async fn search_returns_matching_products() {
        let gateway = StubGateway::with_products(vec![
            hoodie("1", "Cloud Hoodie", 89.0, 4),
            hoodie("2", "Desert Cap", 25.0, 9),
        ]);
        let tool = SearchProductsTool::new(gateway);
        let result = tool
            .execute(json!({"query": "hoodie"}))
            .await
            .expect("execute");
        assert!(result.success);
        let data = result.data.expect("data");
        assert_eq!(data.as_array().expect("array").len(), 1);
        assert_eq!(data[0]["title"], "Cloud Hoodie");
    }

    #[tokio::test]
    async fn search_price_filters_apply_after_ranking() {
        let gateway = StubGateway::with_products(vec![
            hoodie("1", "Cloud Hoodie", 89.0, 4),
            hoodie("2", "Budget Hoodie", 30.0, 4),
        ]);
        let tool = SearchProductsTool::new(gateway);
        let result = tool
            .execute(json!({"query": "hoodie", "max_price": 50.0}))
            .await
            .expect("execute");
        let data = result.data.expect("data");
        assert_eq!(data.as_array().expect("array").len(), 1);
        assert_eq!(data[0]["id"], "2");
    }

    #[tokio::test]
    async fn details_for_unknown_product_fails() {
        let gateway = StubGateway::with_products(vec![hoodie("1", "Cloud Hoodie", 89.0, 4)]);
        let tool = GetProductDetailsTool::new(gateway);
        let result = tool
            .execute(json!({"product_id": "999"}))
            .await
            .expect("execute");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Product 999 not found"));
    }

    #[tokio::test]
    async fn inventory_check_reports_stock() {
        let gateway = StubGateway::with_products(vec![hoodie("1", "Cloud Hoodie", 89.0, 4)]);
        let tool = CheckInventoryTool::new(gateway);

        let result = tool
            .execute(json!({"product_id": "1", "quantity": 2}))
            .await
            .expect("execute");
        assert!(result.success);
        let data = result.data.expect("data");
        assert_eq!(data["available"], true);
        assert_eq!(data["quantity"], 4);

        let result = tool
            .execute(json!({"product_id": "1", "quantity": 10}))
            .await
            .expect("execute");
        let data = result.data.expect("data");
        assert_eq!(data["available"], false);
    }

    #[tokio::test]
    async fn inventory_check_for_missing_variant() {
        let gateway = StubGateway::with_products(vec![hoodie("1", "Cloud Hoodie", 89.0, 4)]);
        let tool = CheckInventoryTool::new(gateway);
        let result = tool
            .execute(json!({"product_id": "1", "variant_id": "nope"}))
            .await
            .expect("execute");
        assert!(result.success);
        let data = result.data.expect("data");
        assert_eq!(data["available"], false);
        assert_eq!(data["reason"], "Variant nope not found");
    }

    #[tokio::test]
    async fn gateway_failure_becomes_failed_result() {
        let tool = GetProductCatalogTool::new(StubGateway::failing());
        let result = tool.execute(json!({})).await.expect("execute");
        assert!(!result.success);
        assert!(result
            .error
            .expect("error")
            .contains("Failed to get product catalog"));
    }

    #[tokio::test]
    async fn catalog_respects_limit() {
        let gateway = StubGateway::with_products(vec![
            hoodie("1", "A", 10.0, 1),
            hoodie("2", "B", 10.0, 1),
            hoodie("3", "C", 10.0, 1),
        ]);
        let tool = GetProductCatalogTool::new(gateway);
        let result = tool.execute(json!({"limit": 2})).await.expect("execute");
        assert!(result.success);
        assert_eq!(result.data.expect("data").as_array().expect("array").len(), 2);
        assert_eq!(result.metadata.expect("metadata")["total_products"], 2);
    }

    #[test]
    fn registration_installs_all_four_tools() {
        let mut registry = ToolRegistry::new();
        register_catalog_tools(&mut registry, StubGateway::with_products(Vec::new()))
            .expect("register");
        assert_eq!(
            registry.tool_names(),
            vec![
                "get_product_catalog",
                "get_product_details",
                "check_inventory",
                "search_products"
            ]
        );
    }
}
