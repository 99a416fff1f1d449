//! Reviewer Cards
//!
//! Turns successful `get_reviews_summary` results into `reviewer_cards`
//! attachments the front end renders next to the answer.

use agent_core::{Attachment, AttachmentExtractor, JsonMap, ToolInvocation};
use serde_json::{Value, json};

/// Attachment type for reviewer cards
pub const REVIEWER_CARDS: &str = "reviewer_cards";

const MAX_CARDS: usize = 5;
const CARD_SUMMARY_CHARS: usize = 300;
const CARD_POINTS: usize = 3;

/// Builds one `reviewer_cards` attachment per successful reviews summary
#[derive(Clone, Copy, Debug, Default)]
pub struct ReviewerCards;

fn top_points(result: &JsonMap, key: &str) -> Vec<Value> {
    result
        .get(key)
        .and_then(Value::as_array)
        .map(|points| points.iter().take(CARD_POINTS).cloned().collect())
        .unwrap_or_default()
}

fn card(summary: &Value, pros: &[Value], cons: &[Value]) -> Value {
    let review_type = match summary["platform"].as_str() {
        Some("youtube") => "video",
        _ => "blog",
    };
    let text: String = summary["summary"]
        .as_str()
        .unwrap_or_default()
        .chars()
        .take(CARD_SUMMARY_CHARS)
        .collect();

    json!({
        "reviewer_name": summary["reviewer_name"].as_str().unwrap_or("Unknown"),
        "review_url": summary["url"].as_str().unwrap_or_default(),
        "review_type": review_type,
        "summary": text,
        "pros": pros,
        "cons": cons,
    })
}

impl ReviewerCards {
    fn cards_for(result: &JsonMap) -> Option<Attachment> {
        if result.get("status").and_then(Value::as_str) != Some("success") {
            return None;
        }

        let pros = top_points(result, "common_pros");
        let cons = top_points(result, "common_cons");
        let cards: Vec<Value> = result
            .get("reviewer_summaries")
            .and_then(Value::as_array)?
            .iter()
            .take(MAX_CARDS)
            .map(|summary| card(summary, &pros, &cons))
            .collect();
        if cards.is_empty() {
            return None;
        }

        let product_name = result
            .get("product")
            .and_then(|p| p["name"].as_str())
            .unwrap_or_default();
        Some(Attachment::new(
            REVIEWER_CARDS,
            json!({ "product_name": product_name, "cards": cards }),
        ))
    }
}

impl AttachmentExtractor for ReviewerCards {
    fn extract(&self, invocations: &[ToolInvocation]) -> Vec<Attachment> {
        invocations
            .iter()
            .filter(|i| i.name == "get_reviews_summary" && !i.result.is_error())
            .filter_map(|i| Self::cards_for(&i.result.to_json()))
            .collect()
    }
}
