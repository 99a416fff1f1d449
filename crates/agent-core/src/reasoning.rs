//! Orchestration Loop
//!
//! Drives one user message through the model: generate, dispatch the requested
//! tool, feed the result back, and repeat until the model answers in text or
//! the iteration bound is hit. Runs are strictly sequential; many runs may
//! share one [`Agent`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::breaker::CircuitBreaker;
use crate::error::{AgentError, Result};
use crate::message::{ConversationTurn, Role};
use crate::progress::{GENERATING_STEP, ProgressEvent, ProgressSink};
use crate::provider::{ProviderAdapter, ProviderConfig, ProviderResponse, SamplingParams};
use crate::run::{AttachmentExtractor, OrchestrationRun, RunOutcome};
use crate::tool::ToolRegistry;

/// Returned without calling the backend when the breaker is open
pub const DEGRADED_MESSAGE: &str = "I'm currently experiencing issues connecting to the AI service. \
Please try again in a moment.";

/// Returned when the iteration bound stops a run that produced no text
pub const LIMIT_FALLBACK_MESSAGE: &str = "I've reached my processing limit for this request. \
Please try asking a more specific question.";

/// Returned when the model ends with neither text nor a tool call
pub const EMPTY_RESPONSE_MESSAGE: &str =
    "I'm sorry, I couldn't put together a response. Please try rephrasing your question.";

/// Default bound on tool round trips per user message
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Agent configuration. The iteration bound is passed per message.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System instruction sent with every request
    pub system_prompt: String,

    pub sampling: SamplingParams,

    /// Upper bound for a single backend call
    pub generate_timeout: Duration,

    /// Upper bound for a single tool dispatch
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            sampling: SamplingParams::default(),
            generate_timeout: Duration::from_secs(90),
            tool_timeout: Duration::from_secs(60),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
Use the available functions whenever they can answer the question, \
then summarize their results for the user.";

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    breaker: Arc<CircuitBreaker>,
    config: AgentConfig,
    request_config: ProviderConfig,
    attachments: Option<Arc<dyn AttachmentExtractor>>,
}

impl Agent {
    /// Create a new agent. Tool declarations are translated once, here.
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tools: Arc<ToolRegistry>,
        breaker: Arc<CircuitBreaker>,
        config: AgentConfig,
    ) -> Self {
        let provider_tools = provider.convert_tool_declarations(&tools.declarations());
        let request_config =
            provider.build_config(&config.system_prompt, provider_tools, &config.sampling);

        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            tools = tools.len(),
            "Agent ready"
        );

        Self {
            provider,
            tools,
            breaker,
            config,
            request_config,
            attachments: None,
        }
    }

    /// Derive attachments from tool results on every completed run
    #[must_use]
    pub fn with_attachments(mut self, extractor: Arc<dyn AttachmentExtractor>) -> Self {
        self.attachments = Some(extractor);
        self
    }

    /// Process one user message with no external cancellation
    pub async fn process_message(
        &self,
        history: &[ConversationTurn],
        user_message: &str,
        max_iterations: usize,
        progress: &dyn ProgressSink,
    ) -> Result<RunOutcome> {
        self.process_message_with_cancel(
            history,
            user_message,
            max_iterations,
            progress,
            &CancellationToken::new(),
        )
        .await
    }

    /// Process one user message.
    ///
    /// Only backend failures are returned as errors; the caller is expected
    /// to show [`AgentError::user_message`] in that case. Exactly one
    /// terminal progress event is emitted either way.
    pub async fn process_message_with_cancel(
        &self,
        history: &[ConversationTurn],
        user_message: &str,
        max_iterations: usize,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let user_turn = self.provider.build_content(Role::User, user_message);
        let run = OrchestrationRun::start(history, user_turn);
        let run_id = run.id.clone();

        let span = tracing::info_span!("run", id = %run_id, provider = self.provider.name());

        async move {
            let result = self.drive(run, max_iterations, progress, cancel).await;
            Self::finish(&result, progress).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Log the outcome and emit the single terminal event
    async fn finish(result: &Result<RunOutcome>, progress: &dyn ProgressSink) {
        match result {
            Ok(outcome) => {
                tracing::info!(
                    iterations = outcome.iterations,
                    tools = ?outcome.tools_invoked,
                    degraded = outcome.degraded,
                    limit_reached = outcome.limit_reached,
                    elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Run complete"
                );
                progress
                    .emit(ProgressEvent::Complete {
                        data: json!({
                            "response": outcome.final_text,
                            "tools_invoked": outcome.tools_invoked,
                            "attachments": outcome.attachments,
                        }),
                    })
                    .await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Run failed");
                progress
                    .emit(ProgressEvent::Error {
                        message: err.user_message(),
                    })
                    .await;
            }
        }
    }

    async fn drive(
        &self,
        mut run: OrchestrationRun,
        max_iterations: usize,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        if !self.breaker.allow_request() {
            tracing::warn!(breaker = self.breaker.name(), "Circuit open, skipping backend");
            return Ok(Self::degraded(run));
        }

        let mut response = self.generate(&run, cancel).await?;

        while let Some(raw) = self.provider.extract_tool_call_raw(&response) {
            if run.iteration_count >= max_iterations {
                break;
            }

            let name = raw.call.name.clone();
            let label = self.tools.label_for(&name);
            tracing::info!(
                tool = %name,
                iteration = run.iteration_count + 1,
                "Calling function"
            );

            progress.emit(ProgressEvent::running(&name, &label)).await;
            let result = self
                .tools
                .execute_with_timeout(&name, &raw.call.arguments, self.config.tool_timeout)
                .await
                .with_id(raw.call.id.clone());
            progress.emit(ProgressEvent::done(&name, &label)).await;

            run.conversation
                .extend(self.provider.build_tool_response_turns(&raw, &result));
            run.record(name, raw.call.arguments.clone(), result);
            run.iteration_count += 1;

            if !self.breaker.allow_request() {
                tracing::warn!(breaker = self.breaker.name(), "Circuit opened mid-run");
                return Ok(Self::degraded(run));
            }
            response = self.generate(&run, cancel).await?;
        }

        let limit_reached = self.provider.has_tool_call(&response);
        if limit_reached {
            tracing::warn!(max_iterations, "Iteration limit reached");
        }

        if !run.tools_invoked.is_empty() {
            progress
                .emit(ProgressEvent::running(GENERATING_STEP, "Generating response"))
                .await;
        }

        let text = self
            .provider
            .extract_text(&response)
            .filter(|t| !t.trim().is_empty());
        let final_text = match text {
            Some(text) => text,
            None if limit_reached => LIMIT_FALLBACK_MESSAGE.to_string(),
            None => {
                tracing::warn!("Model returned neither text nor a tool call");
                EMPTY_RESPONSE_MESSAGE.to_string()
            }
        };

        run.conversation
            .push(self.provider.build_content(Role::Model, &final_text));
        let mut outcome = run.finish(final_text, false, limit_reached);
        if let Some(extractor) = &self.attachments {
            outcome.attachments = extractor.extract(&outcome.invocations);
        }
        Ok(outcome)
    }

    fn degraded(mut run: OrchestrationRun) -> RunOutcome {
        run.conversation.push(ConversationTurn::model(DEGRADED_MESSAGE));
        run.finish(DEGRADED_MESSAGE.to_string(), true, false)
    }

    /// One backend call through the breaker, the timeout and the cancel token
    async fn generate(
        &self,
        run: &OrchestrationRun,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let call = self
            .provider
            .generate(run.conversation.turns(), &self.request_config);

        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            outcome = tokio::time::timeout(self.config.generate_timeout, call) => outcome,
        };

        let result = outcome.unwrap_or_else(|_| {
            Err(AgentError::Timeout {
                operation: "generate".into(),
                after: self.config.generate_timeout,
            })
        });

        match result {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(err) => {
                self.breaker.record_failure();
                tracing::error!(error = %err, "Backend call failed");
                Err(err)
            }
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn provider(&self) -> &dyn ProviderAdapter {
        self.provider.as_ref()
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;
    use crate::progress::{NoopSink, StepStatus};
    use crate::run::{Attachment, ToolInvocation};
    use crate::testing::{RecordingSink, ScriptedProvider, Step};
    use crate::tool::{JsonMap, ParameterSchema, ToolDeclaration};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lookup_registry(counter: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDeclaration::new("lookup", "Look up a product")
                .required_param("name", ParameterSchema::string("Product name"))
                .with_label("Looking up product"),
            move |_args| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let mut map = JsonMap::new();
                    map.insert("status".into(), Value::String("not_found".into()));
                    Ok(map)
                }
            },
        );
        registry
    }

    fn agent(
        provider: Arc<ScriptedProvider>,
        registry: ToolRegistry,
        breaker: Arc<CircuitBreaker>,
    ) -> Agent {
        let config = AgentConfig {
            generate_timeout: Duration::from_millis(200),
            ..AgentConfig::default()
        };
        Agent::new(provider, Arc::new(registry), breaker, config)
    }

    fn default_breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("test", 3, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_normal_flow() {
        let provider = Arc::new(ScriptedProvider::new([
            Step::call("lookup", json!({"name": "Product X"})),
            Step::text("I couldn't find that product."),
        ]));
        let executions = Arc::new(AtomicUsize::new(0));
        let agent = agent(
            provider.clone(),
            lookup_registry(executions.clone()),
            default_breaker(),
        );
        let sink = RecordingSink::default();

        let outcome = agent
            .process_message(&[], "Tell me about Product X", 10, &sink)
            .await
            .unwrap();

        assert_eq!(outcome.final_text, "I couldn't find that product.");
        assert_eq!(outcome.tools_invoked, vec!["lookup"]);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert!(!outcome.degraded);
        assert!(!outcome.limit_reached);
    }

    #[tokio::test]
    async fn test_progress_event_order() {
        let provider = Arc::new(ScriptedProvider::new([
            Step::call("lookup", json!({"name": "Product X"})),
            Step::text("done"),
        ]));
        let agent = agent(
            provider,
            lookup_registry(Arc::new(AtomicUsize::new(0))),
            default_breaker(),
        );
        let sink = RecordingSink::default();

        agent.process_message(&[], "hi", 10, &sink).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ProgressEvent::running("lookup", "Looking up product"));
        assert_eq!(events[1], ProgressEvent::done("lookup", "Looking up product"));
        assert!(matches!(
            &events[2],
            ProgressEvent::Progress { step, status: StepStatus::Running, .. } if step == GENERATING_STEP
        ));
        assert!(matches!(&events[3], ProgressEvent::Complete { data } if data["response"] == "done"));
    }

    #[tokio::test]
    async fn test_no_generating_event_without_tools() {
        let provider = Arc::new(ScriptedProvider::new([Step::text("hello")]));
        let agent = agent(provider, ToolRegistry::new(), default_breaker());
        let sink = RecordingSink::default();

        agent.process_message(&[], "hi", 10, &sink).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[tokio::test]
    async fn test_runaway_tool_calls_hit_limit() {
        let provider = Arc::new(ScriptedProvider::always(Step::call(
            "lookup",
            json!({"name": "Product X"}),
        )));
        let executions = Arc::new(AtomicUsize::new(0));
        let agent = agent(
            provider.clone(),
            lookup_registry(executions.clone()),
            default_breaker(),
        );

        let outcome = agent
            .process_message(&[], "loop forever", 3, &NoopSink)
            .await
            .unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 3);
        assert_eq!(provider.call_count(), 4);
        assert_eq!(outcome.final_text, LIMIT_FALLBACK_MESSAGE);
        assert!(outcome.final_text.contains("processing limit"));
        assert!(outcome.limit_reached);
        assert_eq!(outcome.tools_invoked.len(), 3);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_backend() {
        let breaker = default_breaker();
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(!breaker.allow_request());

        let provider = Arc::new(ScriptedProvider::new([Step::text("unreachable")]));
        let agent = agent(provider.clone(), ToolRegistry::new(), breaker);
        let sink = RecordingSink::default();

        let outcome = agent.process_message(&[], "hi", 10, &sink).await.unwrap();

        assert_eq!(provider.call_count(), 0);
        assert_eq!(outcome.final_text, DEGRADED_MESSAGE);
        assert!(outcome.final_text.contains("experiencing issues"));
        assert!(outcome.degraded);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_breaker_opening_mid_run_stops_before_next_call() {
        let breaker = Arc::new(CircuitBreaker::new("test", 1, Duration::from_secs(60)));

        // Another run's failure lands while this run's tool is executing.
        let mut registry = ToolRegistry::new();
        let tripped = breaker.clone();
        registry.register_fn(
            ToolDeclaration::new("lookup", "Look up a product"),
            move |_args| {
                let tripped = tripped.clone();
                async move {
                    tripped.record_failure();
                    Ok(JsonMap::new())
                }
            },
        );

        let provider = Arc::new(ScriptedProvider::new([
            Step::call("lookup", json!({})),
            Step::text("unreachable"),
        ]));
        let agent = agent(provider.clone(), registry, breaker.clone());
        let sink = RecordingSink::default();

        let outcome = agent.process_message(&[], "hi", 10, &sink).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(outcome.degraded);
        assert_eq!(outcome.final_text, DEGRADED_MESSAGE);
        assert_eq!(outcome.tools_invoked, vec!["lookup"]);
        assert!(outcome.attachments.is_empty());
        assert!(matches!(
            sink.events().last(),
            Some(ProgressEvent::Complete { data }) if data["response"] == DEGRADED_MESSAGE
        ));
    }

    /// One attachment per successful call, carrying the arguments it got
    struct EchoAttachments;

    impl AttachmentExtractor for EchoAttachments {
        fn extract(&self, invocations: &[ToolInvocation]) -> Vec<Attachment> {
            invocations
                .iter()
                .filter(|i| !i.result.is_error())
                .map(|i| {
                    Attachment::new(
                        i.name.clone(),
                        json!({ "args": i.arguments, "result": i.result.to_json() }),
                    )
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_attachments_derived_from_tool_calls() {
        let provider = Arc::new(ScriptedProvider::new([
            Step::call("lookup", json!({"name": "Product X"})),
            Step::call("missing_tool", json!({})),
            Step::text("done"),
        ]));
        let agent = agent(
            provider,
            lookup_registry(Arc::new(AtomicUsize::new(0))),
            default_breaker(),
        )
        .with_attachments(Arc::new(EchoAttachments));
        let sink = RecordingSink::default();

        let outcome = agent.process_message(&[], "hi", 10, &sink).await.unwrap();

        assert_eq!(outcome.invocations.len(), 2);
        assert!(outcome.invocations[1].result.is_error());
        assert_eq!(outcome.attachments.len(), 1);
        assert_eq!(outcome.attachments[0].kind, "lookup");
        assert_eq!(outcome.attachments[0].data["args"]["name"], "Product X");
        assert_eq!(outcome.attachments[0].data["result"]["status"], "not_found");

        let events = sink.events();
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Complete { data }) if data["attachments"][0]["type"] == "lookup"
        ));
    }

    #[tokio::test]
    async fn test_backend_error_propagates_and_counts() {
        let breaker = default_breaker();
        let provider = Arc::new(ScriptedProvider::new([Step::Fail("HTTP 500".into())]));
        let agent = agent(provider, ToolRegistry::new(), breaker.clone());
        let sink = RecordingSink::default();

        let err = agent
            .process_message(&[], "hi", 10, &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(breaker.snapshot().failure_count, 1);
        assert!(matches!(
            sink.events().last(),
            Some(ProgressEvent::Error { message }) if message.starts_with("I'm sorry")
        ));
    }

    #[tokio::test]
    async fn test_repeated_failures_open_breaker() {
        let breaker = default_breaker();
        let provider = Arc::new(ScriptedProvider::always(Step::Fail("down".into())));
        let agent = agent(provider.clone(), ToolRegistry::new(), breaker.clone());

        for _ in 0..3 {
            assert!(agent.process_message(&[], "hi", 10, &NoopSink).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let outcome = agent.process_message(&[], "hi", 10, &NoopSink).await.unwrap();
        assert!(outcome.degraded);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_tool_results_pair_with_calls() {
        let provider = Arc::new(ScriptedProvider::new([
            Step::call("lookup", json!({"name": "A"})),
            Step::call("missing_tool", json!({})),
            Step::text("summary"),
        ]));
        let agent = agent(
            provider.clone(),
            lookup_registry(Arc::new(AtomicUsize::new(0))),
            default_breaker(),
        );

        let outcome = agent.process_message(&[], "hi", 10, &NoopSink).await.unwrap();
        assert_eq!(outcome.tools_invoked, vec!["lookup", "missing_tool"]);

        let requests = provider.requests();
        let last = crate::message::Conversation::from_turns(requests[2].clone());
        assert_eq!(last.unpaired_tool_call(), None);

        let unknown = requests[2]
            .iter()
            .filter_map(|t| t.tool_result.as_ref())
            .find(|r| r.name == "missing_tool")
            .unwrap();
        assert!(unknown.is_error());
    }

    #[tokio::test]
    async fn test_continuation_token_echoed_on_result_turn() {
        let provider = Arc::new(ScriptedProvider::new([
            Step::call("lookup", json!({"name": "A"})),
            Step::text("ok"),
        ]));
        let agent = agent(
            provider.clone(),
            lookup_registry(Arc::new(AtomicUsize::new(0))),
            default_breaker(),
        );

        agent.process_message(&[], "hi", 10, &NoopSink).await.unwrap();

        let second = &provider.requests()[1];
        let call_turn = second.iter().find(|t| t.is_tool_call()).unwrap();
        let result_turn = second.iter().find(|t| t.is_tool_result()).unwrap();
        assert!(call_turn.continuation_token.is_some());
        assert_eq!(call_turn.continuation_token, result_turn.continuation_token);
    }

    #[tokio::test]
    async fn test_history_is_replayed() {
        let provider = Arc::new(ScriptedProvider::new([Step::text("again")]));
        let agent = agent(provider.clone(), ToolRegistry::new(), default_breaker());
        let history = vec![
            ConversationTurn::user("first"),
            ConversationTurn::model("answer"),
        ];

        let outcome = agent
            .process_message(&history, "second", 10, &NoopSink)
            .await
            .unwrap();

        assert_eq!(provider.requests()[0].len(), 3);
        assert_eq!(outcome.history.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_response_fallback() {
        let provider = Arc::new(ScriptedProvider::new([Step::text("   ")]));
        let agent = agent(provider, ToolRegistry::new(), default_breaker());

        let outcome = agent.process_message(&[], "hi", 10, &NoopSink).await.unwrap();
        assert_eq!(outcome.final_text, EMPTY_RESPONSE_MESSAGE);
    }

    #[tokio::test]
    async fn test_generate_timeout_counts_as_failure() {
        let breaker = default_breaker();
        let provider = Arc::new(ScriptedProvider::new([Step::Hang]));
        let agent = agent(provider, ToolRegistry::new(), breaker.clone());

        let err = agent
            .process_message(&[], "hi", 10, &NoopSink)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Timeout { .. }));
        assert_eq!(breaker.snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::new([Step::text("never")]));
        let breaker = default_breaker();
        let agent = agent(provider.clone(), ToolRegistry::new(), breaker.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent
            .process_message_with_cancel(&[], "hi", 10, &NoopSink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(breaker.snapshot().failure_count, 0);
    }
}
