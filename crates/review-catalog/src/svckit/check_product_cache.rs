//! Product Cache Tool
//!
//! Looks a product up by name and returns everything already stored for it.

use std::sync::Arc;

use agent_core::{JsonMap, ParameterSchema, Result as CoreResult, Tool, ToolDeclaration};
use async_trait::async_trait;
use serde_json::json;

use super::{object, required_str};
use crate::catalog::Catalog;

pub struct CheckProductCacheTool {
    catalog: Arc<dyn Catalog>,
}

impl CheckProductCacheTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for CheckProductCacheTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "check_product_cache",
            "Check if a product already exists in the database with reviews. \
             Call this first whenever the user asks about a specific product.",
        )
        .required_param(
            "product_name",
            ParameterSchema::string("Product name, e.g. 'Samsung Galaxy S25 Ultra'"),
        )
        .with_label("Checking product cache")
    }

    async fn execute(&self, args: &JsonMap) -> CoreResult<JsonMap> {
        let product_name = required_str(args, "product_name")?;
        tracing::info!(product = %product_name, "Checking product cache");

        let Some(product) = self.catalog.find_product(product_name).await? else {
            return Ok(object(json!({
                "status": "not_found",
                "message": format!("No cached data for '{product_name}'"),
                "product_name": product_name,
            })));
        };

        let reviews = self.catalog.reviews_for(product.id).await?;
        if reviews.is_empty() {
            return Ok(object(json!({
                "status": "no_reviews",
                "message": format!("Product '{}' found but has no reviews yet", product.name),
                "product": {
                    "id": product.id,
                    "name": product.name,
                    "brand": product.brand,
                    "category": product.category,
                },
            })));
        }

        let reviews_data: Vec<_> = reviews
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "title": r.title,
                    "content": r.content,
                    "summary": r.summary,
                    "reviewer_name": r.reviewer.name,
                    "platform": r.reviewer.platform,
                    "platform_url": r.platform_url,
                    "pros": r.pros,
                    "cons": r.cons,
                    "created_at": r.created_at.to_rfc3339(),
                })
            })
            .collect();

        Ok(object(json!({
            "status": "found",
            "product": {
                "id": product.id,
                "name": product.name,
                "brand": product.brand,
                "category": product.category,
                "review_count": reviews_data.len(),
            },
            "reviews": reviews_data,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svckit::test_support::{args, catalog};

    #[tokio::test]
    async fn test_found_with_reviews() {
        let tool = CheckProductCacheTool::new(catalog());
        let out = tool
            .execute(&args(json!({"product_name": "galaxy s25 ultra"})))
            .await
            .unwrap();

        assert_eq!(out["status"], "found");
        assert_eq!(out["product"]["review_count"], 3);
        assert_eq!(out["reviews"][0]["reviewer_name"], "MKBHD");
        assert_eq!(out["reviews"][0]["platform"], "youtube");
    }

    #[tokio::test]
    async fn test_product_without_reviews() {
        let tool = CheckProductCacheTool::new(catalog());
        let out = tool
            .execute(&args(json!({"product_name": "MacBook Air"})))
            .await
            .unwrap();
        assert_eq!(out["status"], "no_reviews");
        assert_eq!(out["product"]["name"], "Apple MacBook Air M3");
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let tool = CheckProductCacheTool::new(catalog());
        let out = tool
            .execute(&args(json!({"product_name": "Pixel 9"})))
            .await
            .unwrap();
        assert_eq!(out["status"], "not_found");
        assert_eq!(out["product_name"], "Pixel 9");
    }

    #[tokio::test]
    async fn test_declaration_carries_label() {
        let declaration = CheckProductCacheTool::new(catalog()).declaration();
        assert_eq!(declaration.label.as_deref(), Some("Checking product cache"));
        assert_eq!(declaration.parameters.required, vec!["product_name"]);
    }
}
