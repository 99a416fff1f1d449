//! Catalog Storage
//!
//! Read-side abstraction over wherever products, reviews and listings live.

mod memory;

pub use memory::InMemoryCatalog;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Listing, Marketplace, Product, Review};

/// Catalog backend (Strategy pattern)
///
/// Implement this for each store: relational database, search index, etc.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// First product whose name contains `name`, case-insensitively
    async fn find_product(&self, name: &str) -> Result<Option<Product>>;

    async fn product_by_id(&self, id: u64) -> Result<Option<Product>>;

    /// Reviews for a product, oldest first
    async fn reviews_for(&self, product_id: u64) -> Result<Vec<Review>>;

    /// Products matching `query` in name, brand or description, optionally
    /// restricted to one category
    async fn search_products(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Product>>;

    /// Listings for a product from one marketplace, cheapest first
    async fn listings_for(
        &self,
        product_id: u64,
        marketplace: Marketplace,
        limit: usize,
    ) -> Result<Vec<Listing>>;

    /// Number of reviews stored for a product
    async fn review_count(&self, product_id: u64) -> Result<usize> {
        Ok(self.reviews_for(product_id).await?.len())
    }

    /// Backend name
    fn name(&self) -> &str;
}
