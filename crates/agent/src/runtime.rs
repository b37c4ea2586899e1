//! The agent loop: one customer message in, one reply out. The model picks
//! tools and roles; this module only enforces what the active role may do,
//! bounds every model call, and records what happened.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use freddie_core::config::{AgentConfig, LlmConfig};
use freddie_core::domain::conversation::{ConversationTurn, Role, TurnRole, UserContext};
use freddie_core::errors::ApplicationError;

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, LlmMessage, ToolCall};
use crate::roles::{role_profile, Authorization, RolePolicy};
use crate::shop::ToolError;
use crate::tools::{ToolOutput, ToolRegistry, ToolStatus};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Model round-trips allowed per turn, nested specialists included.
    pub max_tool_rounds: u32,
    /// Trailing history turns sent to the model; 0 sends everything.
    pub history_window: usize,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            history_window: 0,
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(llm: &LlmConfig, agent: &AgentConfig) -> Self {
        Self {
            max_tool_rounds: agent.max_tool_rounds,
            history_window: agent.history_window,
            call_timeout: Duration::from_secs(llm.timeout_secs),
            retry: RetryPolicy { max_retries: llm.max_retries, ..RetryPolicy::default() },
        }
    }
}

/// Ordered trace of a turn, printed by the CLI chat loop.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TurnEvent {
    AssistantMessage { role: Role, content: String },
    ToolInvoked { role: Role, tool: String, arguments: Value },
    ToolCompleted { role: Role, tool: String, status: ToolStatus, message: String },
    SpecialistConsulted { specialist: Role, request: String },
    Handoff { from: Role, to: Role },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    /// Entry role for the next turn of this conversation.
    pub final_role: Role,
    /// The user message and the assistant reply, ready to persist.
    pub new_turns: Vec<ConversationTurn>,
    pub events: Vec<TurnEvent>,
    pub rounds: u32,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("language model unavailable after {attempts} attempt(s): {source}")]
    LlmUnavailable {
        attempts: u32,
        #[source]
        source: LlmError,
    },
    #[error("language model call failed: {0}")]
    Llm(#[source] LlmError),
    #[error("tool `{tool}` failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },
    #[error("turn exceeded {0} model round(s) without a reply")]
    RoundLimit(u32),
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LlmUnavailable { .. })
    }
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::LlmUnavailable { .. } => ApplicationError::Integration(error.to_string()),
            AgentError::Tool { source: ToolError::Store(store), .. } => store.into(),
            AgentError::Llm(_) | AgentError::Tool { .. } | AgentError::RoundLimit(_) => {
                ApplicationError::Internal(error.to_string())
            }
        }
    }
}

struct TurnState<'a> {
    context: &'a UserContext,
    correlation_id: &'a str,
    rounds: u32,
    events: Vec<TurnEvent>,
}

type Consultation<'a> = Pin<Box<dyn Future<Output = Result<String, AgentError>> + Send + 'a>>;

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    policy: RolePolicy,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        policy: RolePolicy,
        settings: RuntimeSettings,
    ) -> Self {
        Self { llm, registry, policy, settings }
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub async fn run_turn(
        &self,
        context: &UserContext,
        entry_role: Role,
        history: &[ConversationTurn],
        message: &str,
        correlation_id: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let mut messages: Vec<LlmMessage> =
            self.windowed(history).iter().map(to_llm_message).collect();
        messages.push(LlmMessage::user(message));

        let mut state = TurnState { context, correlation_id, rounds: 0, events: Vec::new() };
        let (reply, final_role) = self.drive(&mut state, entry_role, messages, true).await?;

        info!(
            event_name = "agent.turn.completed",
            correlation_id,
            user_id = %context.user_id,
            entry_role = %entry_role,
            final_role = %final_role,
            rounds = state.rounds,
            events = state.events.len(),
            "agent turn completed"
        );

        Ok(TurnOutcome {
            new_turns: vec![ConversationTurn::user(message), ConversationTurn::assistant(reply.clone())],
            reply,
            final_role,
            events: state.events,
            rounds: state.rounds,
        })
    }

    fn windowed<'h>(&self, history: &'h [ConversationTurn]) -> &'h [ConversationTurn] {
        let window = self.settings.history_window;
        if window == 0 || history.len() <= window {
            history
        } else {
            &history[history.len() - window..]
        }
    }

    /// Runs `role` until it answers without tool calls. Top-level replies
    /// from every role that spoke are joined; nested specialists only
    /// answer their caller.
    async fn drive(
        &self,
        state: &mut TurnState<'_>,
        mut role: Role,
        mut messages: Vec<LlmMessage>,
        top_level: bool,
    ) -> Result<(String, Role), AgentError> {
        let mut spoken: Vec<String> = Vec::new();

        loop {
            if state.rounds >= self.settings.max_tool_rounds {
                return Err(AgentError::RoundLimit(self.settings.max_tool_rounds));
            }
            state.rounds += 1;

            let request = CompletionRequest {
                system: self.policy.system_prompt(role),
                messages: messages.clone(),
                tools: self.policy.tool_specs(role, &self.registry),
            };
            let completion = self.complete(request, state.correlation_id).await?;
            let Completion { text, tool_calls } = completion;

            if let Some(content) = text.as_deref().map(str::trim).filter(|content| !content.is_empty()) {
                if top_level {
                    state
                        .events
                        .push(TurnEvent::AssistantMessage { role, content: content.to_string() });
                }
                spoken.push(content.to_string());
            }
            messages.push(LlmMessage::Assistant { content: text, tool_calls: tool_calls.clone() });

            if tool_calls.is_empty() {
                return Ok((spoken.join("\n"), role));
            }

            let mut next_role = role;
            for call in tool_calls {
                let (output, transfer) = self.dispatch(state, role, next_role, &call).await?;
                if let Some(target) = transfer {
                    next_role = target;
                }
                messages.push(LlmMessage::ToolResult {
                    call_id: call.id,
                    content: output.to_content(),
                    is_error: output.is_error(),
                });
            }
            role = next_role;
        }
    }

    async fn dispatch(
        &self,
        state: &mut TurnState<'_>,
        role: Role,
        pending_role: Role,
        call: &ToolCall,
    ) -> Result<(ToolOutput, Option<Role>), AgentError> {
        match self.policy.authorize(role, &call.name) {
            Authorization::Shop(tool) => {
                state.events.push(TurnEvent::ToolInvoked {
                    role,
                    tool: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
                let output = match self.registry.get(tool) {
                    Some(handler) => handler
                        .execute(state.context, call.arguments.clone())
                        .await
                        .map_err(|source| AgentError::Tool { tool: call.name.clone(), source })?,
                    None => ToolOutput::denied(
                        "tool_unavailable",
                        format!("{tool} is not available right now."),
                    ),
                };
                info!(
                    event_name = "agent.tool.completed",
                    correlation_id = state.correlation_id,
                    role = %role,
                    tool = %tool,
                    status = output.status.as_str(),
                    "tool call completed"
                );
                state.events.push(completed(role, &call.name, &output));
                Ok((output, None))
            }
            Authorization::Consult(specialist) => {
                let request = call
                    .arguments
                    .get("request")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| call.arguments.to_string());
                state.events.push(TurnEvent::SpecialistConsulted {
                    specialist,
                    request: request.clone(),
                });
                info!(
                    event_name = "agent.specialist.consulted",
                    correlation_id = state.correlation_id,
                    specialist = %specialist,
                    "specialist consulted"
                );
                let answer = self.consult(state, specialist, request).await?;
                let output = ToolOutput::ok(answer, Value::Null);
                state.events.push(completed(role, &call.name, &output));
                Ok((output, None))
            }
            Authorization::Transfer(target) => {
                state.events.push(TurnEvent::Handoff { from: pending_role, to: target });
                info!(
                    event_name = "agent.handoff",
                    correlation_id = state.correlation_id,
                    from = %pending_role,
                    to = %target,
                    "conversation handed off"
                );
                let output = ToolOutput::ok(
                    format!("Transferred to {}.", role_profile(target).display_name),
                    Value::Null,
                );
                Ok((output, Some(target)))
            }
            Authorization::Deny { reason_code, message } => {
                warn!(
                    event_name = "agent.tool.denied",
                    correlation_id = state.correlation_id,
                    role = %role,
                    tool = %call.name,
                    reason_code,
                    "tool call denied"
                );
                let output = ToolOutput::denied(reason_code, message);
                state.events.push(completed(role, &call.name, &output));
                Ok((output, None))
            }
        }
    }

    fn consult<'a, 'b>(
        &'a self,
        state: &'a mut TurnState<'b>,
        specialist: Role,
        request: String,
    ) -> Consultation<'a> {
        Box::pin(async move {
            let (answer, _) =
                self.drive(state, specialist, vec![LlmMessage::user(request)], false).await?;
            Ok(answer)
        })
    }

    /// One model call, bounded by the call timeout and retried with
    /// exponential backoff while the failure is transient.
    async fn complete(
        &self,
        request: CompletionRequest,
        correlation_id: &str,
    ) -> Result<Completion, AgentError> {
        let timeout = self.settings.call_timeout;
        let mut attempt: u32 = 0;

        loop {
            let result = match tokio::time::timeout(timeout, self.llm.complete(request.clone())).await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(timeout.as_secs())),
            };

            match result {
                Ok(completion) => return Ok(completion),
                Err(error) if error.is_retryable() && attempt < self.settings.retry.max_retries => {
                    let delay = match error {
                        LlmError::RateLimited(seconds) => Duration::from_secs(seconds)
                            .min(Duration::from_millis(self.settings.retry.max_delay_ms)),
                        _ => self.settings.retry.backoff(attempt),
                    };
                    warn!(
                        event_name = "agent.llm.retrying",
                        correlation_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying language model call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        event_name = "agent.llm.unavailable",
                        correlation_id,
                        attempts = attempt + 1,
                        error = %error,
                        "language model unavailable"
                    );
                    return Err(AgentError::LlmUnavailable { attempts: attempt + 1, source: error });
                }
                Err(error) => return Err(AgentError::Llm(error)),
            }
        }
    }
}

fn to_llm_message(turn: &ConversationTurn) -> LlmMessage {
    match turn.role {
        TurnRole::User => LlmMessage::user(turn.content.clone()),
        TurnRole::Assistant => LlmMessage::assistant(turn.content.clone()),
    }
}

fn completed(role: Role, tool: &str, output: &ToolOutput) -> TurnEvent {
    TurnEvent::ToolCompleted {
        role,
        tool: tool.to_string(),
        status: output.status,
        message: output.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use freddie_core::config::RoutingMode;
    use freddie_core::domain::conversation::{ConversationTurn, Role, UserContext};
    use freddie_core::errors::ApplicationError;
    use freddie_store::CartRepository;

    use super::{AgentError, AgentRuntime, RetryPolicy, RuntimeSettings, TurnEvent};
    use crate::llm::{Completion, LlmError, LlmMessage, ScriptedLlmClient};
    use crate::roles::RolePolicy;
    use crate::shop::tests::{fixture, Fixture};
    use crate::tools::{ToolRegistry, ToolStatus};

    fn runtime(
        fixture: &Fixture,
        llm: Arc<ScriptedLlmClient>,
        mode: RoutingMode,
        settings: RuntimeSettings,
    ) -> AgentRuntime {
        AgentRuntime::new(
            llm,
            ToolRegistry::shop(fixture.shop.clone()),
            RolePolicy::new(mode),
            settings,
        )
    }

    fn zaid() -> UserContext {
        UserContext::new("zaid", Some("zaid@example.com".to_string()))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 250, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn composition_consults_specialist_and_keeps_general_role() {
        let fixture = fixture().await;
        let llm = Arc::new(ScriptedLlmClient::new([
            Completion::tool_call(
                "c1",
                "cart_specialist",
                json!({"request": "add one pair of small running shoes"}),
            ),
            Completion::tool_call(
                "c2",
                "add_to_cart",
                json!({"product": "running", "size": "small", "quantity": 1}),
            ),
            Completion::text("Added one pair of Running Shoes in small."),
            Completion::text("Done! Your running shoes are in the cart."),
        ]));
        let runtime =
            runtime(&fixture, llm.clone(), RoutingMode::Composition, RuntimeSettings::default());

        let outcome = runtime
            .run_turn(&zaid(), Role::General, &[], "add small running shoes", "req-1")
            .await
            .expect("turn");

        assert_eq!(outcome.reply, "Done! Your running shoes are in the cart.");
        assert_eq!(outcome.final_role, Role::General);
        assert_eq!(outcome.rounds, 4);
        assert_eq!(
            outcome.new_turns,
            vec![
                ConversationTurn::user("add small running shoes"),
                ConversationTurn::assistant("Done! Your running shoes are in the cart."),
            ]
        );
        assert!(matches!(
            outcome.events[0],
            TurnEvent::SpecialistConsulted { specialist: Role::CartSpecialist, .. }
        ));
        assert!(matches!(
            outcome.events[1],
            TurnEvent::ToolInvoked { role: Role::CartSpecialist, ref tool, .. } if tool == "add_to_cart"
        ));
        assert_eq!(fixture.carts.load("zaid").await.expect("cart").item_count(), 1);

        let requests = llm.requests();
        assert_eq!(requests[1].messages, vec![LlmMessage::user("add one pair of small running shoes")]);
        let nested_tools: Vec<&str> = requests[1].tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(nested_tools, vec!["add_to_cart", "modify_cart_item", "view_cart", "get_cart_total"]);
    }

    #[tokio::test]
    async fn handoff_surfaces_the_new_role() {
        let fixture = fixture().await;
        let llm = Arc::new(ScriptedLlmClient::new([
            Completion::tool_call("h1", "transfer_to_order_specialist", json!({})),
            Completion::tool_call("o1", "lookup_order", json!({"order_id": "ord1001"})),
            Completion::text("Order ORD1001 has shipped."),
        ]));
        let runtime = runtime(&fixture, llm.clone(), RoutingMode::Handoff, RuntimeSettings::default());

        let outcome = runtime
            .run_turn(&zaid(), Role::General, &[], "where is ORD1001?", "req-2")
            .await
            .expect("turn");

        assert_eq!(outcome.final_role, Role::OrderSpecialist);
        assert_eq!(outcome.reply, "Order ORD1001 has shipped.");
        assert_eq!(
            outcome.events[0],
            TurnEvent::Handoff { from: Role::General, to: Role::OrderSpecialist }
        );
        assert!(llm.requests()[1].system.contains("lookup_order"));
    }

    #[tokio::test]
    async fn tools_outside_the_role_are_denied_without_running() {
        let fixture = fixture().await;
        let llm = Arc::new(ScriptedLlmClient::new([
            Completion::tool_call("x1", "add_to_cart", json!({"product": "running", "size": "small"})),
            Completion::text("Let me get the cart specialist for that."),
        ]));
        let runtime =
            runtime(&fixture, llm.clone(), RoutingMode::Composition, RuntimeSettings::default());

        let outcome = runtime
            .run_turn(&zaid(), Role::General, &[], "add running shoes", "req-3")
            .await
            .expect("turn");

        assert!(fixture.carts.load("zaid").await.expect("cart").is_empty());
        assert!(outcome.events.iter().any(|event| matches!(
            event,
            TurnEvent::ToolCompleted { status: ToolStatus::Denied, .. }
        )));
        let last = llm.requests()[1].messages.last().cloned();
        assert!(matches!(last, Some(LlmMessage::ToolResult { is_error: true, .. })));
    }

    #[tokio::test]
    async fn round_budget_is_shared_with_specialists() {
        let fixture = fixture().await;
        let llm = Arc::new(ScriptedLlmClient::new([
            Completion::tool_call("c1", "product_specialist", json!({"request": "list shoes"})),
            Completion::tool_call("p1", "get_product_info", json!({})),
            Completion::tool_call("p2", "get_product_info", json!({})),
        ]));
        let settings = RuntimeSettings { max_tool_rounds: 3, ..RuntimeSettings::default() };
        let runtime = runtime(&fixture, llm, RoutingMode::Composition, settings);

        let error = runtime
            .run_turn(&zaid(), Role::General, &[], "what do you sell?", "req-4")
            .await
            .expect_err("round limit");

        assert!(matches!(error, AgentError::RoundLimit(3)));
        assert!(matches!(ApplicationError::from(error), ApplicationError::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out_and_reports_unavailable() {
        let fixture = fixture().await;
        let llm = Arc::new(
            ScriptedLlmClient::new([Completion::text("too late")])
                .with_delay(Duration::from_secs(5)),
        );
        let settings = RuntimeSettings {
            call_timeout: Duration::from_secs(1),
            retry: RetryPolicy { max_retries: 1, ..RetryPolicy::default() },
            ..RuntimeSettings::default()
        };
        let runtime = runtime(&fixture, llm.clone(), RoutingMode::Composition, settings);

        let error = runtime
            .run_turn(&zaid(), Role::General, &[], "hello", "req-5")
            .await
            .expect_err("timeout");

        assert!(error.is_retryable());
        assert!(matches!(error, AgentError::LlmUnavailable { attempts: 2, .. }));
        assert_eq!(llm.requests().len(), 2);
        assert!(matches!(ApplicationError::from(error), ApplicationError::Integration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let fixture = fixture().await;
        let llm = Arc::new(ScriptedLlmClient::from_results([
            Err(LlmError::Unavailable { status: 503, message: "overloaded".to_string() }),
            Ok(Completion::text("Hi, I'm Freddie!")),
        ]));
        let runtime =
            runtime(&fixture, llm.clone(), RoutingMode::Composition, RuntimeSettings::default());

        let outcome =
            runtime.run_turn(&zaid(), Role::General, &[], "hi", "req-6").await.expect("turn");

        assert_eq!(outcome.reply, "Hi, I'm Freddie!");
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn non_transient_failure_is_not_retried() {
        let fixture = fixture().await;
        let llm = Arc::new(ScriptedLlmClient::from_results([Err(LlmError::Unauthorized(
            "bad key".to_string(),
        ))]));
        let runtime =
            runtime(&fixture, llm.clone(), RoutingMode::Composition, RuntimeSettings::default());

        let error =
            runtime.run_turn(&zaid(), Role::General, &[], "hi", "req-7").await.expect_err("fails");

        assert!(matches!(error, AgentError::Llm(LlmError::Unauthorized(_))));
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn history_window_limits_what_the_model_sees() {
        let fixture = fixture().await;
        let llm = Arc::new(ScriptedLlmClient::new([Completion::text("Sure.")]));
        let settings = RuntimeSettings { history_window: 2, ..RuntimeSettings::default() };
        let runtime = runtime(&fixture, llm.clone(), RoutingMode::Composition, settings);
        let history = vec![
            ConversationTurn::user("one"),
            ConversationTurn::assistant("two"),
            ConversationTurn::user("three"),
            ConversationTurn::assistant("four"),
        ];

        runtime.run_turn(&zaid(), Role::General, &history, "five", "req-8").await.expect("turn");

        assert_eq!(
            llm.requests()[0].messages,
            vec![LlmMessage::user("three"), LlmMessage::assistant("four"), LlmMessage::user("five")]
        );
    }
}
