//! In-Memory Catalog
//!
//! For demos and tests. Ships with a small set of realistic sample data.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use super::Catalog;
use crate::error::{CatalogError, Result};
use crate::model::{Listing, Marketplace, Platform, Product, Review, Reviewer};

#[derive(Default)]
struct Tables {
    products: Vec<Product>,
    reviews: Vec<Review>,
    listings: Vec<Listing>,
}

/// Catalog held entirely in memory
#[derive(Default)]
pub struct InMemoryCatalog {
    tables: RwLock<Tables>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".into()))
    }

    pub fn insert_product(&self, product: Product) -> Result<()> {
        let mut tables = self.write()?;
        tables.products.retain(|p| p.id != product.id);
        tables.products.push(product);
        Ok(())
    }

    pub fn insert_review(&self, review: Review) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.products.iter().any(|p| p.id == review.product_id) {
            return Err(CatalogError::ProductNotFound(review.product_id.to_string()));
        }
        tables.reviews.push(review);
        Ok(())
    }

    pub fn insert_listing(&self, listing: Listing) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.products.iter().any(|p| p.id == listing.product_id) {
            return Err(CatalogError::ProductNotFound(listing.product_id.to_string()));
        }
        tables.listings.push(listing);
        Ok(())
    }

    /// Catalog pre-filled with a few products, reviews and listings
    pub fn with_sample_data() -> Self {
        let tables = Tables {
            products: sample_products(),
            reviews: sample_reviews(),
            listings: sample_listings(),
        };
        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn find_product(&self, name: &str) -> Result<Option<Product>> {
        Ok(self
            .read()?
            .products
            .iter()
            .find(|p| p.name_matches(name))
            .cloned())
    }

    async fn product_by_id(&self, id: u64) -> Result<Option<Product>> {
        Ok(self.read()?.products.iter().find(|p| p.id == id).cloned())
    }

    async fn reviews_for(&self, product_id: u64) -> Result<Vec<Review>> {
        let mut reviews: Vec<Review> = self
            .read()?
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        reviews.sort_by_key(|r| r.created_at);
        Ok(reviews)
    }

    async fn search_products(
        &self,
        query: &str,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let needle = query.trim().to_lowercase();
        let tables = self.read()?;

        Ok(tables
            .products
            .iter()
            .filter(|p| {
                category.is_none_or(|c| {
                    p.category
                        .as_deref()
                        .is_some_and(|pc| pc.eq_ignore_ascii_case(c))
                })
            })
            .filter(|p| {
                needle.is_empty()
                    || p.name_matches(&needle)
                    || p.brand
                        .as_deref()
                        .is_some_and(|b| b.to_lowercase().contains(&needle))
                    || p.description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn listings_for(
        &self,
        product_id: u64,
        marketplace: Marketplace,
        limit: usize,
    ) -> Result<Vec<Listing>> {
        let mut listings: Vec<Listing> = self
            .read()?
            .listings
            .iter()
            .filter(|l| l.product_id == product_id && l.marketplace == marketplace)
            .cloned()
            .collect();
        // Unpriced listings sort last.
        listings.sort_by_key(|l| (l.price.is_none(), l.price));
        listings.truncate(limit);
        Ok(listings)
    }

    fn name(&self) -> &str {
        "InMemoryCatalog"
    }
}

fn sample_products() -> Vec<Product> {
    vec![
        Product::new(1, "Samsung Galaxy S25 Ultra")
            .brand("Samsung")
            .category("phones")
            .description("Flagship Android phone with a 200MP camera and built-in S Pen.")
            .rating(dec!(4.6))
            .overall_summary(
                "Reviewers agree the S25 Ultra has the most versatile camera system of the year \
                 and excellent battery life. The price and the incremental design changes are \
                 the most common complaints.",
            ),
        Product::new(2, "Sony WH-1000XM5")
            .brand("Sony")
            .category("headphones")
            .description("Over-ear wireless headphones with adaptive noise cancelling.")
            .rating(dec!(4.4)),
        Product::new(3, "Apple MacBook Air M3")
            .brand("Apple")
            .category("laptops")
            .description("Fanless 13-inch and 15-inch laptop with the M3 chip."),
    ]
}

#[allow(clippy::too_many_arguments)]
fn sample_review(
    id: u64,
    product_id: u64,
    reviewer: Reviewer,
    days_ago: i64,
    title: &str,
    content: &str,
    pros: &[&str],
    cons: &[&str],
    url: &str,
) -> Review {
    Review {
        id,
        product_id,
        reviewer,
        title: title.into(),
        content: content.into(),
        summary: None,
        pros: pros.iter().map(|s| (*s).to_string()).collect(),
        cons: cons.iter().map(|s| (*s).to_string()).collect(),
        platform_url: url.into(),
        created_at: Utc::now() - Duration::days(days_ago),
    }
}

fn sample_reviews() -> Vec<Review> {
    vec![
        sample_review(
            1,
            1,
            Reviewer::new("MKBHD", Platform::Youtube),
            30,
            "Galaxy S25 Ultra Review: Refined",
            "The S25 Ultra is the most complete Android phone you can buy. The cameras are \
             consistent, the anti-reflective display is fantastic outdoors, and battery life \
             easily lasts a full day. It is also very expensive and barely changed from last year.",
            &["Camera versatility", "Battery life", "Anti-reflective display"],
            &["Price", "Incremental upgrade"],
            "https://www.youtube.com/watch?v=s25ultra-mkbhd",
        ),
        sample_review(
            2,
            1,
            Reviewer::new("The Verge", Platform::Blog),
            28,
            "Samsung Galaxy S25 Ultra review: the AI phone",
            "Samsung leans hard on AI features, some of which are genuinely useful. Hardware is \
             superb and the battery is strong, but the S Pen lost Bluetooth features and the \
             price keeps creeping up.",
            &["Battery life", "Build quality"],
            &["Price", "S Pen lost Bluetooth"],
            "https://www.theverge.com/reviews/galaxy-s25-ultra",
        ),
        sample_review(
            3,
            1,
            Reviewer::new("Mrwhosetheboss", Platform::Youtube),
            21,
            "I've used the S25 Ultra for 3 weeks",
            "Zoom photography is still best in class and the display is the best on any phone. \
             Charging speed is behind the competition.",
            &["Camera versatility", "Display"],
            &["Slow charging"],
            "https://www.youtube.com/watch?v=s25ultra-mrwhosetheboss",
        ),
        sample_review(
            4,
            2,
            Reviewer::new("RTINGS.com", Platform::Blog),
            90,
            "Sony WH-1000XM5 Headphones Review",
            "Excellent noise cancelling and a comfortable, lightweight fit. The new design no \
             longer folds, which makes the case bulkier.",
            &["Noise cancelling", "Comfort"],
            &["Does not fold"],
            "https://www.rtings.com/headphones/reviews/sony/wh-1000xm5-wireless",
        ),
    ]
}

fn sample_listings() -> Vec<Listing> {
    let listing = |product_id,
                   marketplace,
                   url: &str,
                   title: &str,
                   price,
                   seller: Option<&str>,
                   condition: Option<&str>| Listing {
        product_id,
        marketplace,
        url: url.into(),
        title: title.into(),
        price,
        seller: seller.map(Into::into),
        condition: condition.map(Into::into),
    };

    vec![
        listing(
            1,
            Marketplace::Amazon,
            "https://www.amazon.com/dp/B0DP3GDTF1",
            "Samsung Galaxy S25 Ultra 256GB Unlocked",
            Some(dec!(1299.99)),
            Some("Amazon.com"),
            Some("New"),
        ),
        listing(
            1,
            Marketplace::Amazon,
            "https://www.amazon.com/dp/B0DP3H1XKQ",
            "Samsung Galaxy S25 Ultra 512GB Unlocked",
            Some(dec!(1419.99)),
            Some("Amazon.com"),
            Some("New"),
        ),
        listing(
            1,
            Marketplace::Ebay,
            "https://www.ebay.com/itm/s25-ultra-256",
            "Galaxy S25 Ultra 256GB Titanium Black",
            Some(dec!(1099.00)),
            Some("top-rated seller"),
            Some("Open box"),
        ),
        listing(
            2,
            Marketplace::Amazon,
            "https://www.amazon.com/dp/B09XS7JWHH",
            "Sony WH-1000XM5 Wireless Noise Canceling Headphones",
            Some(dec!(329.99)),
            Some("Amazon.com"),
            Some("New"),
        ),
        listing(
            2,
            Marketplace::Ebay,
            "https://www.ebay.com/itm/wh1000xm5",
            "Sony WH-1000XM5 Black",
            None,
            None,
            Some("Used"),
        ),
    ]
}
