pub mod errors;
pub mod gateway;
pub mod shopify;
pub mod tools;
pub mod types;

pub use errors::{CommerceError, Result};
pub use gateway::{rank_matches, CatalogGateway};
pub use shopify::ShopifyCatalog;
pub use tools::{
    register_catalog_tools, CheckInventoryTool, GetProductCatalogTool, GetProductDetailsTool,
    SearchProductsTool,
};
pub use types::{product_from_shopify, Availability, Product, ProductVariant};
