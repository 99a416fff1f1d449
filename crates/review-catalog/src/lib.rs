//! # review-catalog
//!
//! Tool pack for the review assistant: a catalog of products, the reviews
//! gathered for them and marketplace listings, exposed to the model as four
//! tools.
//!
//! ## Flow
//!
//! ```text
//! user asks about a product
//!        │
//!        ▼
//! check_product_cache ──found──▶ get_reviews_summary ──▶ text answer
//!        │
//!   not_found / no_reviews
//!        │
//!        ▼
//! search_products ──▶ suggest close matches
//!
//! "where can I buy it?" ──▶ find_marketplace_listings
//! ```
//!
//! A successful `get_reviews_summary` also yields reviewer cards through
//! [`ReviewerCards`].

pub mod attachments;
pub mod catalog;
pub mod error;
pub mod model;
pub mod svckit;

use std::sync::Arc;

use agent_core::ToolRegistry;

pub use attachments::ReviewerCards;
pub use catalog::{Catalog, InMemoryCatalog};
pub use error::{CatalogError, Result};
pub use model::{Listing, Marketplace, Platform, Product, Review, Reviewer};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{
        CheckProductCacheTool, MarketplaceListingsTool, ReviewsSummaryTool, SearchProductsTool,
    };
}

/// Register every review tool against one catalog
pub fn register_all(registry: &mut ToolRegistry, catalog: Arc<dyn Catalog>) {
    registry.register(tools::CheckProductCacheTool::new(Arc::clone(&catalog)));
    registry.register(tools::ReviewsSummaryTool::new(Arc::clone(&catalog)));
    registry.register(tools::SearchProductsTool::new(Arc::clone(&catalog)));
    registry.register(tools::MarketplaceListingsTool::new(catalog));
    tracing::info!(tools = registry.len(), "Review tools registered");
}

/// System prompt for the review assistant
pub const SYSTEM_PROMPT: &str = r#"You are ShopLens, an assistant that helps people make informed purchasing decisions by aggregating product reviews from trusted tech reviewers on YouTube and tech blogs.

## Rules

1. **Only use data returned by tools.** Never answer from memory.
2. **Always call a tool** when the user asks about a product.
3. **Always cite sources**, e.g. "According to MKBHD..." or "The Verge says...".
4. **Never make up** specifications, prices or reviewer opinions.

## Review Flow

### Step 1: Check the cache
- Call `check_product_cache(product_name)` first.
- If status is "found": call `get_reviews_summary(product_name)`, then stop calling tools and answer.
- If status is "not_found" or "no_reviews": call `search_products(query)` and tell the user which close matches we do have reviews for.

### Step 2: Present the summary
After `get_reviews_summary`:
- Stop calling tools and write the answer.
- Give each reviewer's view as its own paragraph.
- Give the overall summary, then the common pros and cons.

### Step 3: Marketplace (when asked)
- When the user asks where to buy or about prices, call `find_marketplace_listings(product_name, count_per_marketplace=2)`.
- Present Amazon and eBay links with prices.

## Tools

- `check_product_cache(product_name)` - Check whether we have reviews stored
- `search_products(query, category, limit)` - Search the product database
- `get_reviews_summary(product_name)` - Per-reviewer and overall summaries
- `find_marketplace_listings(product_name, count_per_marketplace)` - Where to buy

## Response Format

- Use markdown.
- Bold reviewer names and key points.
- Link to the original reviews when available.

Be helpful and conversational, like a tech-savvy friend who has done the research for you."#;
