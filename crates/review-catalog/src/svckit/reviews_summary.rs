//! Reviews Summary Tool
//!
//! Builds per-reviewer summaries and an overall view from stored reviews.
//! Summaries come from the catalog; nothing here calls a model.

use std::sync::Arc;

use agent_core::{
    AgentError, JsonMap, ParameterSchema, Result as CoreResult, Tool, ToolDeclaration,
};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{object, str_arg};
use crate::catalog::Catalog;
use crate::model::{Product, Review};

/// Longest excerpt used when a review has no stored summary
const EXCERPT_CHARS: usize = 500;

pub struct ReviewsSummaryTool {
    catalog: Arc<dyn Catalog>,
}

impl ReviewsSummaryTool {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

fn product_id_arg(args: &JsonMap) -> Option<u64> {
    args.get("product_id").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

/// Points raised by more than one reviewer, most frequent first. With a
/// single review every point counts.
fn common_points<'a, F>(reviews: &'a [Review], points: F) -> Vec<String>
where
    F: Fn(&'a Review) -> &'a [String],
{
    let min_mentions = reviews.len().min(2);
    let mut tally: Vec<(String, String, usize)> = Vec::new();

    for review in reviews {
        for point in points(review) {
            let key = point.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            match tally.iter_mut().find(|(k, _, _)| *k == key) {
                Some((_, _, count)) => *count += 1,
                None => tally.push((key, point.trim().to_string(), 1)),
            }
        }
    }

    // Stable sort keeps first-seen order among ties.
    tally.sort_by(|a, b| b.2.cmp(&a.2));
    tally
        .into_iter()
        .filter(|(_, _, count)| *count >= min_mentions)
        .map(|(_, point, _)| point)
        .collect()
}

fn overall_summary(product: &Product, reviews: &[Review]) -> String {
    if let Some(summary) = &product.overall_summary {
        return summary.clone();
    }

    let mut names: Vec<&str> = Vec::new();
    for review in reviews {
        if !names.contains(&review.reviewer.name.as_str()) {
            names.push(&review.reviewer.name);
        }
    }
    let count = reviews.len();
    let noun = if count == 1 { "review" } else { "reviews" };
    format!("{count} {noun} of {} from {}.", product.name, names.join(", "))
}

#[async_trait]
impl Tool for ReviewsSummaryTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "get_reviews_summary",
            "Get a summary of each reviewer's opinion plus an overall summary, \
             common pros and common cons for a product. Provide product_name or product_id.",
        )
        .param("product_name", ParameterSchema::string("Product name"))
        .param(
            "product_id",
            ParameterSchema::integer("Product ID returned by an earlier lookup"),
        )
        .with_label("Summarizing reviews")
    }

    fn validate(&self, args: &JsonMap) -> CoreResult<()> {
        if str_arg(args, "product_name").is_none() && product_id_arg(args).is_none() {
            return Err(AgentError::ToolValidation(
                "product_name or product_id is required".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, args: &JsonMap) -> CoreResult<JsonMap> {
        self.validate(args)?;
        let product_name = str_arg(args, "product_name");
        let product_id = product_id_arg(args);
        tracing::info!(?product_name, ?product_id, "Getting reviews summary");

        let product = match product_id {
            Some(id) => self.catalog.product_by_id(id).await?,
            None => match product_name {
                Some(name) => self.catalog.find_product(name).await?,
                None => None,
            },
        };

        let Some(product) = product else {
            let wanted = product_id.map_or_else(
                || product_name.unwrap_or_default().to_string(),
                |id| id.to_string(),
            );
            return Ok(object(json!({
                "status": "not_found",
                "message": format!("Product not found: {wanted}"),
            })));
        };

        let reviews = self.catalog.reviews_for(product.id).await?;
        if reviews.is_empty() {
            return Ok(object(json!({
                "status": "no_reviews",
                "message": format!("No reviews found for {}", product.name),
                "product": { "id": product.id, "name": product.name },
            })));
        }

        let reviewer_summaries: Vec<Value> = reviews
            .iter()
            .map(|r| {
                json!({
                    "reviewer_name": r.reviewer.name,
                    "platform": r.reviewer.platform,
                    "url": r.platform_url,
                    "summary": r.summary_or_excerpt(EXCERPT_CHARS),
                })
            })
            .collect();

        Ok(object(json!({
            "status": "success",
            "product": {
                "id": product.id,
                "name": product.name,
                "brand": product.brand,
                "category": product.category,
            },
            "reviewer_summaries": reviewer_summaries,
            "overall_summary": overall_summary(&product, &reviews),
            "common_pros": common_points(&reviews, |r| r.pros.as_slice()),
            "common_cons": common_points(&reviews, |r| r.cons.as_slice()),
            "total_reviews": reviews.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svckit::test_support::{args, catalog};

    #[tokio::test]
    async fn test_summary_by_name() {
        let tool = ReviewsSummaryTool::new(catalog());
        let out = tool
            .execute(&args(json!({"product_name": "S25 Ultra"})))
            .await
            .unwrap();

        assert_eq!(out["status"], "success");
        assert_eq!(out["total_reviews"], 3);
        assert_eq!(out["reviewer_summaries"].as_array().unwrap().len(), 3);
        assert!(out["overall_summary"].as_str().unwrap().contains("camera"));
        assert_eq!(out["common_pros"][0], "Camera versatility");
        assert_eq!(out["common_cons"], json!(["Price"]));
    }

    #[tokio::test]
    async fn test_summary_by_id_without_stored_overall() {
        let tool = ReviewsSummaryTool::new(catalog());
        let out = tool.execute(&args(json!({"product_id": 2}))).await.unwrap();

        assert_eq!(out["status"], "success");
        assert_eq!(
            out["overall_summary"],
            "1 review of Sony WH-1000XM5 from RTINGS.com."
        );
        assert_eq!(out["common_pros"], json!(["Noise cancelling", "Comfort"]));
    }

    #[tokio::test]
    async fn test_not_found_and_no_reviews() {
        let tool = ReviewsSummaryTool::new(catalog());

        let out = tool.execute(&args(json!({"product_id": 99}))).await.unwrap();
        assert_eq!(out["status"], "not_found");
        assert_eq!(out["message"], "Product not found: 99");

        let out = tool
            .execute(&args(json!({"product_name": "macbook"})))
            .await
            .unwrap();
        assert_eq!(out["status"], "no_reviews");
    }

    #[tokio::test]
    async fn test_requires_name_or_id() {
        let tool = ReviewsSummaryTool::new(catalog());
        let err = tool.validate(&args(json!({"product_name": ""}))).unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
        assert!(tool.validate(&args(json!({"product_id": "3"}))).is_ok());
    }
}
