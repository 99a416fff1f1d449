//! Tool System
//!
//! Tools are registered once at process start and dispatched by name from the
//! orchestration loop. The registry is frozen behind an `Arc` before the first
//! request, so dispatch never contends with registration.
//!
//! Every dispatch produces a [`ToolResult`]. Unknown names, invalid
//! arguments, handler errors, panics and timeouts all collapse into the same
//! `{"error": "..."}` payload so the model can read it and recover.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// JSON object used for tool arguments and payloads
pub type JsonMap = serde_json::Map<String, Value>;

/// Tool call request from the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: JsonMap,

    /// Backend-assigned call ID, when the backend uses one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: JsonMap) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Outcome carried by a tool result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPayload {
    Success(JsonMap),
    Error(String),
}

/// Result from tool execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub payload: ToolPayload,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, data: JsonMap) -> Self {
        Self {
            name: name.into(),
            id: None,
            payload: ToolPayload::Success(data),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            payload: ToolPayload::Error(error.into()),
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.payload, ToolPayload::Error(_))
    }

    /// The object handed back to the model: the handler's map on success,
    /// `{"error": message}` otherwise.
    pub fn to_json(&self) -> JsonMap {
        match &self.payload {
            ToolPayload::Success(data) => data.clone(),
            ToolPayload::Error(message) => {
                let mut map = JsonMap::new();
                map.insert("error".into(), Value::String(message.clone()));
                map
            }
        }
    }
}

/// Schema of a single parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// JSON Schema type (string, integer, number, boolean, array, object)
    #[serde(rename = "type")]
    pub param_type: String,

    pub description: String,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    /// Element schema for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterSchema>>,
}

impl ParameterSchema {
    pub fn new(param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            description: description.into(),
            enum_values: None,
            items: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new("string", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new("integer", description)
    }

    pub fn array_of(item_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            items: Some(Box::new(Self::new(item_type, ""))),
            ..Self::new("array", description)
        }
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// The `parameters` object of a declaration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParametersSchema {
    /// Always `"object"`
    #[serde(rename = "type")]
    pub schema_type: String,

    pub properties: BTreeMap<String, ParameterSchema>,

    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ParametersSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".into(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// Tool declaration advertised to the model backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    pub description: String,

    pub parameters: ParametersSchema,

    /// Progress label shown to end users; never sent to the backend
    #[serde(skip)]
    pub label: Option<String>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParametersSchema::default(),
            label: None,
        }
    }

    /// Add an optional parameter
    pub fn param(mut self, name: impl Into<String>, schema: ParameterSchema) -> Self {
        self.parameters.properties.insert(name.into(), schema);
        self
    }

    /// Add a required parameter
    pub fn required_param(mut self, name: impl Into<String>, schema: ParameterSchema) -> Self {
        let name = name.into();
        self.parameters.required.push(name.clone());
        self.parameters.properties.insert(name, schema);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration advertised to the model
    fn declaration(&self) -> ToolDeclaration;

    /// Execute the tool with given arguments
    async fn execute(&self, args: &JsonMap) -> Result<JsonMap>;

    /// Validate arguments before execution
    fn validate(&self, args: &JsonMap) -> Result<()> {
        let declaration = self.declaration();
        let missing: Vec<&str> = declaration
            .parameters
            .required
            .iter()
            .filter(|name| args.get(name.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::ToolValidation(format!(
                "missing required parameter(s): {}",
                missing.join(", ")
            )))
        }
    }
}

/// Boxed async handler for closure-registered tools
pub type ToolHandler = Arc<dyn Fn(JsonMap) -> BoxFuture<'static, Result<JsonMap>> + Send + Sync>;

/// Adapts a plain handler function into a [`Tool`]
struct FnTool {
    declaration: ToolDeclaration,
    handler: ToolHandler,
}

#[async_trait]
impl Tool for FnTool {
    fn declaration(&self) -> ToolDeclaration {
        self.declaration.clone()
    }

    async fn execute(&self, args: &JsonMap) -> Result<JsonMap> {
        (self.handler)(args.clone()).await
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    declarations: HashMap<String, ToolDeclaration>,
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            declarations: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool. A later registration under the same name
    /// replaces the earlier one but keeps its advertised position.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let declaration = tool.declaration();
        let name = declaration.name.clone();
        tracing::debug!(tool = %name, "Registered tool");

        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name.clone());
        }
        self.declarations.insert(name, declaration);
    }

    /// Register a handler function under a declaration
    pub fn register_fn<F, Fut>(&mut self, declaration: ToolDeclaration, handler: F)
    where
        F: Fn(JsonMap) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JsonMap>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| handler(args).boxed());
        self.register_arc(Arc::new(FnTool {
            declaration,
            handler,
        }));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declarations in registration order
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.declarations.get(name).cloned())
            .collect()
    }

    /// Human-readable label for progress events; unknown tools fall back to
    /// their raw name.
    pub fn label_for(&self, name: &str) -> String {
        self.declarations
            .get(name)
            .and_then(|d| d.label.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call by name. Never fails: every failure mode is returned
    /// as an error payload.
    pub async fn execute(&self, name: &str, args: &JsonMap) -> ToolResult {
        match self.try_execute(name, args).await {
            Ok(data) => {
                tracing::info!(tool = %name, "Tool completed");
                ToolResult::success(name, data)
            }
            Err(err) => {
                tracing::warn!(tool = %name, error = %err, "Tool failed");
                ToolResult::failure(name, err.to_string())
            }
        }
    }

    /// Like [`ToolRegistry::execute`] but gives up after `limit`.
    ///
    /// The handler future is dropped on timeout; handlers that must not be
    /// interrupted mid-write should spawn that work themselves.
    pub async fn execute_with_timeout(
        &self,
        name: &str,
        args: &JsonMap,
        limit: Duration,
    ) -> ToolResult {
        if let Ok(result) = tokio::time::timeout(limit, self.execute(name, args)).await {
            result
        } else {
            tracing::warn!(tool = %name, timeout_secs = limit.as_secs(), "Tool timed out");
            ToolResult::failure(
                name,
                AgentError::ToolExecution(format!("timed out after {}s", limit.as_secs()))
                    .to_string(),
            )
        }
    }

    async fn try_execute(&self, name: &str, args: &JsonMap) -> Result<JsonMap> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        tool.validate(args)?;

        tracing::debug!(
            tool = %name,
            args = %serde_json::Value::Object(args.clone()),
            "Executing tool"
        );

        let outcome = AssertUnwindSafe(async { tool.execute(args).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(err)) if err.is_tool_error() => Err(err),
            Ok(Err(err)) => Err(AgentError::ToolExecution(err.to_string())),
            Err(panic) => Err(AgentError::ToolExecution(panic_detail(panic.as_ref()))),
        }
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup_declaration() -> ToolDeclaration {
        ToolDeclaration::new("lookup", "Look up a product")
            .required_param("name", ParameterSchema::string("Product name"))
            .with_label("Looking up product")
    }

    fn obj(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error_result() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nope", &JsonMap::new()).await;

        assert!(result.is_error());
        assert_eq!(result.name, "nope");
        assert_eq!(
            result.to_json().get("error"),
            Some(&json!("Unknown function: nope"))
        );
    }

    #[tokio::test]
    async fn test_panic_and_error_share_shape() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(ToolDeclaration::new("fails", "returns an error"), |_| async {
            Err(AgentError::Other("database offline".into()))
        });
        registry.register_fn(ToolDeclaration::new("crashes", "panics"), |_| async {
            panic!("database offline")
        });

        let failed = registry.execute("fails", &JsonMap::new()).await;
        let crashed = registry.execute("crashes", &JsonMap::new()).await;

        assert_eq!(failed.payload, crashed.payload);
        assert_eq!(
            failed.to_json().get("error"),
            Some(&json!("Function execution failed: database offline"))
        );
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(lookup_declaration(), |_| async { Ok(JsonMap::new()) });

        let result = registry.execute("lookup", &JsonMap::new()).await;
        assert!(result.is_error());

        let ok = registry
            .execute("lookup", &obj(json!({"name": "Product X"})))
            .await;
        assert!(!ok.is_error());
    }

    #[tokio::test]
    async fn test_handler_receives_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(lookup_declaration(), |args| async move {
            let name = args.get("name").cloned().unwrap_or(Value::Null);
            Ok(obj(json!({"status": "not_found", "query": name})))
        });

        let result = registry
            .execute("lookup", &obj(json!({"name": "Product X"})))
            .await;
        assert_eq!(
            result.payload,
            ToolPayload::Success(obj(json!({"status": "not_found", "query": "Product X"})))
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_payload() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(ToolDeclaration::new("slow", "sleeps"), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(JsonMap::new())
        });

        let result = registry
            .execute_with_timeout("slow", &JsonMap::new(), Duration::from_millis(20))
            .await;
        assert!(result.is_error());
    }

    #[test]
    fn test_declarations_keep_registration_order_and_labels() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(lookup_declaration(), |_| async { Ok(JsonMap::new()) });
        registry.register_fn(ToolDeclaration::new("compare", "Compare"), |_| async {
            Ok(JsonMap::new())
        });

        let names: Vec<String> = registry.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["lookup", "compare"]);
        assert_eq!(registry.label_for("lookup"), "Looking up product");
        assert_eq!(registry.label_for("compare"), "compare");
        assert_eq!(registry.label_for("unregistered"), "unregistered");
    }

    #[test]
    fn test_declaration_serializes_to_wire_schema() {
        let decl = ToolDeclaration::new("compare_products", "Compare products")
            .required_param(
                "product_ids",
                ParameterSchema::array_of("integer", "IDs to compare"),
            )
            .param(
                "category",
                ParameterSchema::string("Category").with_enum(["phones", "laptops"]),
            )
            .with_label("Comparing products");

        let wire = serde_json::to_value(&decl).unwrap();
        assert_eq!(wire["parameters"]["type"], "object");
        assert_eq!(wire["parameters"]["required"], json!(["product_ids"]));
        assert_eq!(
            wire["parameters"]["properties"]["product_ids"]["items"]["type"],
            "integer"
        );
        assert_eq!(
            wire["parameters"]["properties"]["category"]["enum"],
            json!(["phones", "laptops"])
        );
        assert!(wire.get("label").is_none());
    }
}
