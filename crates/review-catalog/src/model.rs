//! Domain Models
//!
//! Products, the reviews gathered for them, and where to buy them.
//! Prices and ratings use `rust_decimal`; never f64.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a review was published
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Blog,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Youtube => write!(f, "youtube"),
            Self::Blog => write!(f, "blog"),
        }
    }
}

/// A reviewer (channel or publication)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reviewer {
    pub name: String,
    pub platform: Platform,
}

impl Reviewer {
    pub fn new(name: impl Into<String>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            platform,
        }
    }
}

/// A product known to the catalog
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub model_number: Option<String>,
    pub description: Option<String>,

    /// Average rating out of 5
    pub average_rating: Option<Decimal>,

    /// Consensus across all reviews, if one has been written
    pub overall_summary: Option<String>,
}

impl Product {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            brand: None,
            category: None,
            model_number: None,
            description: None,
            average_rating: None,
            overall_summary: None,
        }
    }

    #[must_use]
    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn rating(mut self, rating: Decimal) -> Self {
        self.average_rating = Some(rating);
        self
    }

    #[must_use]
    pub fn overall_summary(mut self, summary: impl Into<String>) -> Self {
        self.overall_summary = Some(summary.into());
        self
    }

    /// Case-insensitive substring match on the name
    pub fn name_matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(&query.trim().to_lowercase())
    }
}

/// One published review of a product
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub product_id: u64,
    pub reviewer: Reviewer,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub platform_url: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Stored summary, or the content cut to `max_chars`
    pub fn summary_or_excerpt(&self, max_chars: usize) -> String {
        if let Some(summary) = &self.summary {
            return summary.clone();
        }
        if self.content.chars().count() > max_chars {
            let cut: String = self.content.chars().take(max_chars).collect();
            format!("{cut}...")
        } else {
            self.content.clone()
        }
    }
}

/// Online store a listing comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Amazon,
    Ebay,
}

/// A place to buy a product
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Listing {
    pub product_id: u64,
    pub marketplace: Marketplace,
    pub url: String,
    pub title: String,

    /// Price in USD
    pub price: Option<Decimal>,
    pub seller: Option<String>,
    pub condition: Option<String>,
}
