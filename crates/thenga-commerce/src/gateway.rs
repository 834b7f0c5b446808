//! Seam between the catalog tools and the storefront backend.

use crate::errors::Result;
use crate::types::Product;
use async_trait::async_trait;

#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Lists catalog products, capped at `limit`.
    async fn list_products(&self, limit: u32) -> Result<Vec<Product>>;

    /// Looks up a single product. `Ok(None)` means the id does not exist;
    /// errors are reserved for transport and payload failures.
    async fn get_product(&self, product_id: &str) -> Result<Option<Product>>;

    /// Keyword search over the catalog.
    async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>>;
}

/// Local relevance ranking used when the backend has no native search: a
/// product matches when the query appears in its title, description, vendor
/// or any tag. Title matches rank first.
pub fn rank_matches(products: Vec<Product>, query: &str, limit: usize) -> Vec<Product> {
    let needle = query.to_lowercase();
    let mut matches: Vec<Product> = products
        .into_iter()
        .filter(|product| {
            product.title.to_lowercase().contains(&needle)
                || product
                    .description
                    .as_deref()
                    .is_some_and(|body| body.to_lowercase().contains(&needle))
                || product
                    .vendor
                    .as_deref()
                    .is_some_and(|vendor| vendor.to_lowercase().contains(&needle))
                || product
                    .product_type
                    .as_deref()
                    .is_some_and(|kind| kind.to_lowercase().contains(&needle))
                || product
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&needle))
        })
        .collect();

    matches.sort_by_key(|product| {
        let in_title = product.title.to_lowercase().contains(&needle);
        (std::cmp::Reverse(in_title), product.title.len())
    });
    matches.truncate(limit);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, title: &str, vendor: Option<&str>, tags: &[&str]) -> Product {
        Product {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            vendor: vendor.map(str::to_string),
            product_type: None,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            price: 10.0,
            currency: "USD".to_string(),
            images: Vec::new(),
            variants: Vec::new(),
            available: true,
        }
    }

    #[test]
    fn title_matches_rank_before_tag_matches() {
        let products = vec![
            product("1", "Winter Socks", None, &["hoodie-adjacent"]),
            product("2", "Cloud Hoodie", None, &[]),
        ];
        let ranked = rank_matches(products, "hoodie", 10);
        assert_eq!(ranked[0].id, "2");
        assert_eq!(ranked[1].id, "1");
    }

    #[test]
    fn matching_is_case_insensitive_across_fields() {
        let products = vec![
            product("1", "Plain Tee", Some("HoodieWorks"), &[]),
            product("2", "Mug", None, &["kitchen"]),
        ];
        let ranked = rank_matches(products, "HOODIE", 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "1");
    }

    #[test]
    fn limit_truncates_results() {
        let products = vec![
            product("1", "Hoodie A", None, &[]),
            product("2", "Hoodie B", None, &[]),
            product("3", "Hoodie C", None, &[]),
        ];
        assert_eq!(rank_matches(products, "hoodie", 2).len(), 2);
    }
}
