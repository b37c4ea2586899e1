//! Request gateway: turns one external request into one agent turn and
//! persists the conversation. Turns for the same conversation key run one
//! at a time; unrelated keys proceed concurrently.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use freddie_core::catalog::Catalog;
use freddie_core::config::AppConfig;
use freddie_core::domain::conversation::{ConversationKey, Role, UserContext};
use freddie_core::errors::{ApplicationError, InterfaceError};
use freddie_store::{
    InMemoryCartRepository, InMemoryOrderRepository, InMemorySessionRepository, KeyedLocks,
    RepositoryError, SampleOrders, SessionRepository,
};

use crate::llm::{build_client, LlmClient, LlmError};
use crate::notify::{build_notifier, NotifyError};
use crate::receipt::ReceiptRenderer;
use crate::roles::RolePolicy;
use crate::runtime::{AgentError, AgentRuntime, RuntimeSettings, TurnEvent};
use crate::shop::ShopTools;
use crate::tools::ToolRegistry;
use crate::voice::{build_speech, AudioBuffer, SpeechError, SpeechPipeline};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    pub contact: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub role: Role,
    pub conversation_key: ConversationKey,
    pub events: Vec<TurnEvent>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VoiceReply {
    pub transcript: String,
    pub reply: ChatReply,
    pub audio: AudioBuffer,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("voice support is disabled")]
    VoiceDisabled,
    #[error(transparent)]
    Speech(#[from] SpeechError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("conversation store failure: {0}")]
    Session(#[from] RepositoryError),
}

impl From<GatewayError> for ApplicationError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::InvalidRequest(message) => ApplicationError::InvalidInput(message),
            GatewayError::VoiceDisabled => ApplicationError::Integration(error.to_string()),
            GatewayError::Speech(speech) if speech.is_client_error() => {
                ApplicationError::InvalidInput(speech.to_string())
            }
            GatewayError::Speech(speech) => ApplicationError::Integration(speech.to_string()),
            GatewayError::Agent(agent) => agent.into(),
            GatewayError::Session(store) => store.into(),
        }
    }
}

impl GatewayError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        ApplicationError::from(self).into_interface(correlation_id)
    }
}

pub struct ChatGateway {
    runtime: Arc<AgentRuntime>,
    shop: Arc<ShopTools>,
    sessions: Arc<dyn SessionRepository>,
    speech: Option<SpeechPipeline>,
    conversation_locks: KeyedLocks<ConversationKey>,
}

impl ChatGateway {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        shop: Arc<ShopTools>,
        sessions: Arc<dyn SessionRepository>,
        speech: Option<SpeechPipeline>,
    ) -> Self {
        Self { runtime, shop, sessions, speech, conversation_locks: KeyedLocks::new() }
    }

    pub fn shop(&self) -> &ShopTools {
        &self.shop
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub fn sessions(&self) -> &dyn SessionRepository {
        self.sessions.as_ref()
    }

    pub fn voice_enabled(&self) -> bool {
        self.speech.is_some()
    }

    pub async fn handle_text(
        &self,
        request: ChatRequest,
        correlation_id: &str,
    ) -> Result<ChatReply, GatewayError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(GatewayError::InvalidRequest("message must not be empty".to_string()));
        }
        if request.user_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("user_id must not be empty".to_string()));
        }

        let context = UserContext::new(request.user_id, request.contact);
        let key = context.conversation_key();
        let _guard = self.conversation_locks.lock(&key).await;

        let session = self.sessions.get_or_create(&key).await?;
        let entry_role = self.runtime.policy().entry_role(session.active_role);
        let outcome = match self
            .runtime
            .run_turn(&context, entry_role, &session.turns, message, correlation_id)
            .await
        {
            Ok(outcome) => outcome,
            Err(agent_error) => {
                error!(
                    event_name = "gateway.turn.failed",
                    correlation_id,
                    conversation_key = %key,
                    retryable = agent_error.is_retryable(),
                    error = %agent_error,
                    "chat turn failed"
                );
                return Err(agent_error.into());
            }
        };

        let saved = self
            .sessions
            .append(&key, session.version, outcome.new_turns, outcome.final_role)
            .await?;
        info!(
            event_name = "gateway.turn.persisted",
            correlation_id,
            conversation_key = %key,
            role = %outcome.final_role,
            history_len = saved.turns.len(),
            version = saved.version,
            "chat turn persisted"
        );

        Ok(ChatReply {
            response: outcome.reply,
            role: outcome.final_role,
            conversation_key: key,
            events: outcome.events,
        })
    }

    /// Transcribes `audio`, runs the same turn as text, and speaks the reply.
    pub async fn handle_voice(
        &self,
        user_id: String,
        contact: Option<String>,
        audio: AudioBuffer,
        correlation_id: &str,
    ) -> Result<VoiceReply, GatewayError> {
        let speech = self.speech.as_ref().ok_or(GatewayError::VoiceDisabled)?;

        let transcript = speech.transcriber.transcribe(&audio).await?;
        info!(
            event_name = "gateway.voice.transcribed",
            correlation_id,
            input_bytes = audio.bytes.len(),
            sample_rate = audio.sample_rate,
            "voice input transcribed"
        );

        let reply = self
            .handle_text(ChatRequest { message: transcript.clone(), user_id, contact }, correlation_id)
            .await?;
        let audio = speech.synthesizer.synthesize(&reply.response).await?;

        Ok(VoiceReply { transcript, reply, audio })
    }
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("language model client: {0}")]
    Llm(#[from] LlmError),
    #[error("notifier: {0}")]
    Notifier(#[from] NotifyError),
    #[error("speech client: {0}")]
    Speech(#[from] SpeechError),
    #[error("receipt template: {0}")]
    Receipt(#[from] tera::Error),
    #[error("seeding sample orders: {0}")]
    Store(#[from] RepositoryError),
}

/// Wires stores, tools, the configured model client and collaborators into
/// a gateway.
pub async fn build_gateway(config: &AppConfig) -> Result<ChatGateway, AssemblyError> {
    let llm = build_client(&config.llm)?;
    build_gateway_with(config, llm).await
}

/// Same as [`build_gateway`] with a caller-supplied model client.
pub async fn build_gateway_with(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<ChatGateway, AssemblyError> {
    let orders = Arc::new(InMemoryOrderRepository::default());
    if config.store.seed_sample_orders {
        let seeded = SampleOrders::load(orders.as_ref()).await?;
        info!(
            event_name = "system.bootstrap.orders_seeded",
            correlation_id = "bootstrap",
            orders_seeded = seeded.orders_seeded.len(),
            "sample orders seeded"
        );
    }

    let shop = Arc::new(ShopTools::new(
        Arc::new(Catalog::shoe_store(&config.store.currency)),
        orders,
        Arc::new(InMemoryCartRepository::default()),
        build_notifier(&config.notification)?,
        ReceiptRenderer::new(config.store.name.clone(), config.store.currency.clone())?,
        config.store.currency.clone(),
    ));
    let runtime = Arc::new(AgentRuntime::new(
        llm,
        ToolRegistry::shop(shop.clone()),
        RolePolicy::new(config.agent.routing_mode),
        RuntimeSettings::from_config(&config.llm, &config.agent),
    ));
    let speech = build_speech(&config.voice)?;

    Ok(ChatGateway::new(runtime, shop, Arc::new(InMemorySessionRepository::default()), speech))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use freddie_core::config::{AppConfig, RoutingMode};
    use freddie_core::domain::conversation::{ConversationKey, ConversationTurn, Role};
    use freddie_core::errors::InterfaceError;
    use freddie_store::SessionRepository;

    use super::{build_gateway_with, ChatGateway, ChatRequest, GatewayError};
    use crate::llm::{Completion, LlmError, LlmMessage, ScriptedLlmClient};
    use crate::voice::{AudioBuffer, SpeechError, SpeechPipeline, Synthesizer, Transcriber};

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            user_id: "zaid".to_string(),
            contact: Some("zaid@example.com".to_string()),
        }
    }

    async fn gateway(config: AppConfig, llm: Arc<ScriptedLlmClient>) -> ChatGateway {
        build_gateway_with(&config, llm).await.expect("gateway")
    }

    struct FakeSpeech;

    #[async_trait]
    impl Transcriber for FakeSpeech {
        async fn transcribe(&self, audio: &AudioBuffer) -> Result<String, SpeechError> {
            if audio.bytes == b"silence" {
                return Err(SpeechError::EmptyTranscript);
            }
            Ok(String::from_utf8_lossy(&audio.bytes).to_string())
        }
    }

    #[async_trait]
    impl Synthesizer for FakeSpeech {
        async fn synthesize(&self, text: &str) -> Result<AudioBuffer, SpeechError> {
            Ok(AudioBuffer { bytes: text.as_bytes().to_vec(), sample_rate: 24_000, channels: 1 })
        }
    }

    #[tokio::test]
    async fn history_is_persisted_and_replayed() {
        let llm = Arc::new(ScriptedLlmClient::new([
            Completion::text("Hi! I'm Freddie."),
            Completion::text("We sell running and walking shoes."),
        ]));
        let gateway = gateway(AppConfig::default(), llm.clone()).await;

        let first = gateway.handle_text(request("hello"), "req-1").await.expect("first");
        let second =
            gateway.handle_text(request("what do you sell?"), "req-2").await.expect("second");

        assert_eq!(first.response, "Hi! I'm Freddie.");
        assert_eq!(second.role, Role::General);
        assert_eq!(second.conversation_key, ConversationKey::new("zaid", Some("zaid@example.com")));

        let session = gateway
            .sessions()
            .get_or_create(&second.conversation_key)
            .await
            .expect("session");
        assert_eq!(session.version, 2);
        assert_eq!(
            session.turns,
            vec![
                ConversationTurn::user("hello"),
                ConversationTurn::assistant("Hi! I'm Freddie."),
                ConversationTurn::user("what do you sell?"),
                ConversationTurn::assistant("We sell running and walking shoes."),
            ]
        );
        assert_eq!(llm.requests()[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn users_with_lookalike_keys_keep_separate_histories() {
        let llm = Arc::new(ScriptedLlmClient::new([
            Completion::text("Hello alice:bob."),
            Completion::text("Hello alice."),
        ]));
        let gateway = gateway(AppConfig::default(), llm.clone()).await;
        let first = ChatRequest {
            message: "hi".to_string(),
            user_id: "alice:bob".to_string(),
            contact: None,
        };
        let second = ChatRequest {
            message: "hi".to_string(),
            user_id: "alice".to_string(),
            contact: Some("bob:".to_string()),
        };

        let first = gateway.handle_text(first, "req-1").await.expect("first");
        let second = gateway.handle_text(second, "req-2").await.expect("second");

        assert_ne!(first.conversation_key, second.conversation_key);
        assert_eq!(llm.requests()[1].messages, vec![LlmMessage::user("hi")]);
        let session = gateway
            .sessions()
            .get_or_create(&second.conversation_key)
            .await
            .expect("session");
        assert_eq!(session.version, 1);
        assert_eq!(session.turns.len(), 2);
        assert_eq!(gateway.sessions().count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn different_contacts_keep_separate_histories() {
        let llm = Arc::new(ScriptedLlmClient::new([Completion::text("one"), Completion::text("two")]));
        let gateway = gateway(AppConfig::default(), llm.clone()).await;

        gateway.handle_text(request("hello"), "req-1").await.expect("first");
        let mut other = request("hello again");
        other.contact = None;
        gateway.handle_text(other, "req-2").await.expect("second");

        assert_eq!(llm.requests()[1].messages, vec![LlmMessage::user("hello again")]);
        assert_eq!(gateway.sessions().count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn blank_input_is_a_bad_request() {
        let llm = Arc::new(ScriptedLlmClient::default());
        let gateway = gateway(AppConfig::default(), llm.clone()).await;

        let error = gateway.handle_text(request("   "), "req-3").await.expect_err("blank");
        assert!(matches!(error, GatewayError::InvalidRequest(_)));
        assert!(matches!(error.into_interface("req-3"), InterfaceError::BadRequest { .. }));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn failed_turns_leave_history_untouched() {
        let llm = Arc::new(ScriptedLlmClient::from_results([Err(LlmError::Api {
            error_type: "invalid_request_error".to_string(),
            message: "bad tool schema".to_string(),
        })]));
        let gateway = gateway(AppConfig::default(), llm).await;

        let error = gateway.handle_text(request("hello"), "req-4").await.expect_err("fails");
        let interface = error.into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(interface.message().contains("bad tool schema"));
        let key = ConversationKey::new("zaid", Some("zaid@example.com"));
        let session = gateway.sessions().get_or_create(&key).await.expect("session");
        assert!(session.turns.is_empty());
    }

    #[tokio::test]
    async fn handoff_role_carries_into_the_next_turn() {
        let mut config = AppConfig::default();
        config.agent.routing_mode = RoutingMode::Handoff;
        let llm = Arc::new(ScriptedLlmClient::new([
            Completion::tool_call("h1", "transfer_to_cart_specialist", json!({})),
            Completion::text("What size would you like?"),
            Completion::tool_call("c1", "add_to_cart", json!({"product": "walking", "size": "medium"})),
            Completion::text("Added walking shoes in medium."),
        ]));
        let gateway = gateway(config, llm.clone()).await;

        let first = gateway.handle_text(request("I want walking shoes"), "req-5").await.expect("first");
        let second = gateway.handle_text(request("medium please"), "req-6").await.expect("second");

        assert_eq!(first.role, Role::CartSpecialist);
        assert_eq!(second.role, Role::CartSpecialist);
        assert!(llm.requests()[2].system.contains("add_to_cart"));
        let total = gateway.shop().get_cart_total("zaid").await.expect("total");
        assert_eq!(total.item_count, 1);
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_conversation_are_serialized() {
        let llm = Arc::new(
            ScriptedLlmClient::new([Completion::text("first"), Completion::text("second")])
                .with_delay(Duration::from_millis(20)),
        );
        let gateway = gateway(AppConfig::default(), llm).await;

        let (left, right) = tokio::join!(
            gateway.handle_text(request("one"), "req-7"),
            gateway.handle_text(request("two"), "req-8"),
        );
        left.expect("left");
        right.expect("right");

        let key = ConversationKey::new("zaid", Some("zaid@example.com"));
        let session = gateway.sessions().get_or_create(&key).await.expect("session");
        assert_eq!(session.version, 2);
        assert_eq!(session.turns.len(), 4);
    }

    #[tokio::test]
    async fn voice_disabled_is_service_unavailable() {
        let gateway = gateway(AppConfig::default(), Arc::new(ScriptedLlmClient::default())).await;
        let audio = AudioBuffer::new(b"hello".to_vec(), 16_000, 1).expect("audio");

        let error = gateway
            .handle_voice("zaid".to_string(), None, audio, "req-9")
            .await
            .expect_err("disabled");

        assert!(matches!(error, GatewayError::VoiceDisabled));
        assert!(error.into_interface("req-9").is_retryable());
    }

    #[tokio::test]
    async fn voice_turn_wraps_the_text_turn() {
        let llm = Arc::new(ScriptedLlmClient::new([Completion::text("Order ORD1001 has shipped.")]));
        let base = gateway(AppConfig::default(), llm).await;
        let speech = SpeechPipeline { transcriber: Arc::new(FakeSpeech), synthesizer: Arc::new(FakeSpeech) };
        let gateway = ChatGateway { speech: Some(speech), ..base };

        let audio = AudioBuffer::new(b"where is ORD1001?".to_vec(), 16_000, 1).expect("audio");
        let voice = gateway
            .handle_voice("zaid".to_string(), None, audio, "req-10")
            .await
            .expect("voice");

        assert_eq!(voice.transcript, "where is ORD1001?");
        assert_eq!(voice.reply.response, "Order ORD1001 has shipped.");
        assert_eq!(voice.audio.bytes, b"Order ORD1001 has shipped.".to_vec());

        let silent = AudioBuffer::new(b"silence".to_vec(), 16_000, 1).expect("audio");
        let error = gateway
            .handle_voice("zaid".to_string(), None, silent, "req-11")
            .await
            .expect_err("empty transcript");
        assert!(matches!(error.into_interface("req-11"), InterfaceError::BadRequest { .. }));
    }
}
