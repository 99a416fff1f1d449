//! Service Kit - Agent Tools
//!
//! Catalog-backed tools that implement `agent_core::Tool` for the review
//! assistant. Handlers return plain JSON objects; the dispatcher wraps any
//! error into the `{"error": ...}` payload the model sees.

mod check_product_cache;
mod marketplace_listings;
mod reviews_summary;
mod search_products;

pub use check_product_cache::CheckProductCacheTool;
pub use marketplace_listings::MarketplaceListingsTool;
pub use reviews_summary::ReviewsSummaryTool;
pub use search_products::SearchProductsTool;

use agent_core::JsonMap;
use serde_json::Value;

use crate::error::CatalogError;

/// Unwrap a `json!` object literal into the map tools return
pub(crate) fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = JsonMap::new();
            map.insert("value".into(), other);
            map
        }
    }
}

/// Trimmed, non-empty string argument
pub(crate) fn str_arg<'a>(args: &'a JsonMap, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn required_str<'a>(args: &'a JsonMap, key: &str) -> Result<&'a str, CatalogError> {
    str_arg(args, key).ok_or_else(|| CatalogError::InvalidArgument(format!("{key} is required")))
}

/// Positive integer argument clamped to `1..=max`. Backends sometimes send
/// whole numbers as floats or strings; both are accepted.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn count_arg(args: &JsonMap, key: &str, default: usize, max: usize) -> usize {
    let raw = args.get(key).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });

    raw.map_or(default, |n| usize::try_from(n).unwrap_or(max))
        .clamp(1, max)
}
