//! Product Search Tool

use std::sync::Arc;

use agent_core::{JsonMap, ParameterSchema, Result as CoreResult, Tool, ToolDeclaration};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{count_arg, object, str_arg};
use crate::catalog::Catalog;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 20;
const DESCRIPTION_PREVIEW: usize = 200;

pub struct SearchProductsTool {
    catalog: Arc<dyn Catalog>,
}

impl SearchProductsTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_PREVIEW {
        let cut: String = text.chars().take(DESCRIPTION_PREVIEW).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[async_trait]
impl Tool for SearchProductsTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "search_products",
            "Search the product database by name, brand or keywords, optionally within a category.",
        )
        .required_param("query", ParameterSchema::string("Search terms, e.g. 'noise cancelling'"))
        .param(
            "category",
            ParameterSchema::string("Product category, e.g. 'phones', 'laptops', 'headphones'"),
        )
        .param(
            "limit",
            ParameterSchema::integer("Maximum number of results (default 5, max 20)"),
        )
        .with_label("Searching products")
    }

    async fn execute(&self, args: &JsonMap) -> CoreResult<JsonMap> {
        let query = str_arg(args, "query").unwrap_or_default();
        let category = str_arg(args, "category");
        let limit = count_arg(args, "limit", DEFAULT_LIMIT, MAX_LIMIT);
        tracing::info!(query = %query, ?category, limit, "Searching products");

        let products = self.catalog.search_products(query, category, limit).await?;

        if products.is_empty() {
            let scope = category.map_or_else(String::new, |c| format!(" in category '{c}'"));
            return Ok(object(json!({
                "products": [],
                "total": 0,
                "message": format!("No products found for '{query}'{scope}"),
                "query": query,
                "category": category,
            })));
        }

        let mut results: Vec<Value> = Vec::with_capacity(products.len());
        for p in &products {
            let review_count = self.catalog.review_count(p.id).await?;
            results.push(json!({
                "id": p.id,
                "name": p.name,
                "brand": p.brand,
                "category": p.category,
                "model_number": p.model_number,
                "review_count": review_count,
                "average_rating": p.average_rating,
                "description": p.description.as_deref().map(preview),
            }));
        }

        Ok(object(json!({
            "total": results.len(),
            "products": results,
            "query": query,
            "category": category,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svckit::test_support::{args, catalog};

    #[tokio::test]
    async fn test_search_by_brand() {
        let tool = SearchProductsTool::new(catalog());
        let out = tool.execute(&args(json!({"query": "samsung"}))).await.unwrap();

        assert_eq!(out["total"], 1);
        assert_eq!(out["products"][0]["name"], "Samsung Galaxy S25 Ultra");
        assert_eq!(out["products"][0]["review_count"], 3);
        assert_eq!(out["products"][0]["average_rating"], "4.6");
    }

    #[tokio::test]
    async fn test_category_and_limit() {
        let tool = SearchProductsTool::new(catalog());
        let out = tool
            .execute(&args(json!({"query": "", "category": "headphones", "limit": 50})))
            .await
            .unwrap();
        assert_eq!(out["total"], 1);
        assert_eq!(out["category"], "headphones");

        let out = tool
            .execute(&args(json!({"query": "", "limit": 2})))
            .await
            .unwrap();
        assert_eq!(out["total"], 2);
    }

    #[tokio::test]
    async fn test_no_results_message() {
        let tool = SearchProductsTool::new(catalog());
        let out = tool
            .execute(&args(json!({"query": "drone", "category": "cameras"})))
            .await
            .unwrap();
        assert_eq!(out["total"], 0);
        assert_eq!(
            out["message"],
            "No products found for 'drone' in category 'cameras'"
        );
    }

    #[test]
    fn test_description_preview() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(250);
        assert_eq!(preview(&long).chars().count(), DESCRIPTION_PREVIEW + 3);
    }
}
