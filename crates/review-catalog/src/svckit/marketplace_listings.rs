//! Marketplace Listings Tool
//!
//! Where to buy a product on Amazon and eBay.

use std::sync::Arc;

use agent_core::{JsonMap, ParameterSchema, Result as CoreResult, Tool, ToolDeclaration};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{count_arg, object, required_str};
use crate::catalog::Catalog;
use crate::model::{Listing, Marketplace};

const DEFAULT_PER_MARKETPLACE: usize = 2;
const MAX_PER_MARKETPLACE: usize = 10;

pub struct MarketplaceListingsTool {
    catalog: Arc<dyn Catalog>,
}

impl MarketplaceListingsTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    async fn listings(
        &self,
        product_id: u64,
        marketplace: Marketplace,
        count: usize,
    ) -> CoreResult<Vec<Value>> {
        let listings = self
            .catalog
            .listings_for(product_id, marketplace, count)
            .await?;
        Ok(listings.iter().map(listing_json).collect())
    }
}

fn listing_json(listing: &Listing) -> Value {
    json!({
        "url": listing.url,
        "title": listing.title,
        "price": listing.price.map(|p| format!("${p:.2}")),
        "seller": listing.seller,
        "condition": listing.condition,
    })
}

#[async_trait]
impl Tool for MarketplaceListingsTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "find_marketplace_listings",
            "Find where to buy a product on Amazon and eBay, with prices when known.",
        )
        .required_param("product_name", ParameterSchema::string("Product name"))
        .param(
            "count_per_marketplace",
            ParameterSchema::integer("Listings to return from each marketplace (default 2)"),
        )
        .with_label("Finding marketplace listings")
    }

    async fn execute(&self, args: &JsonMap) -> CoreResult<JsonMap> {
        let product_name = required_str(args, "product_name")?;
        let count = count_arg(
            args,
            "count_per_marketplace",
            DEFAULT_PER_MARKETPLACE,
            MAX_PER_MARKETPLACE,
        );
        tracing::info!(product = %product_name, count, "Searching marketplace listings");

        let no_results = || {
            object(json!({
                "status": "no_results",
                "message": "Could not find marketplace listings",
                "product_name": product_name,
            }))
        };

        let Some(product) = self.catalog.find_product(product_name).await? else {
            return Ok(no_results());
        };

        let amazon = self.listings(product.id, Marketplace::Amazon, count).await?;
        let ebay = self.listings(product.id, Marketplace::Ebay, count).await?;
        if amazon.is_empty() && ebay.is_empty() {
            return Ok(no_results());
        }

        Ok(object(json!({
            "status": "success",
            "amazon": amazon,
            "ebay": ebay,
            "product_name": product.name,
        })))
    }
}
