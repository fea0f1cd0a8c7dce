//! The Event Runner (spec §4.3): drives one interactive session turn —
//! append the user's message, run the model (with tools, no plan, no
//! validation side channel), append the assistant's reply — and publishes
//! the turn's milestones onto the event bus.
//!
//! Grounded on `neuron-op-react`'s turn shape, reused here via
//! [`crate::react::run_react_loop`] rather than duplicated, and on
//! `neuron-orch-kit`'s fluent wiring style for the constructor.
//!
//! Unlike the Task Runner, this runner never suspends and is never
//! preempted (spec §4.3: interactive turns complete or fail outright); it
//! passes [`PreemptHandle::never`] into the shared loop and treats a
//! [`ReactOutcome::Suspended`] as a hard failure, since no validation tool
//! is ever offered to an interactive turn. It still goes through the actor
//! pool for capacity (spec §4.6 "Interactive acquisition"): a turn holds an
//! [`fulcrum_core::ActorLease`] for its whole duration, so a background
//! task on the same provider is preempted rather than the two racing for
//! the same actor.
//!
//! `Provider::complete` is a single non-streaming call (spec §6 "Consumed":
//! `generate(...) → stream-or-message`; no streaming provider lives in this
//! workspace), so every turn realizes spec §4.3's case (b): one
//! `stream.start`, a single `stream.delta` carrying the whole reply, then
//! `stream.end` — never raw per-chunk deltas.
//!
//! [`Self::handle_turn`] is the direct entry point for a caller that has not
//! already put the user's message on the bus itself (a synchronous request/
//! reply transport, say). [`Self::spawn_listener`] is the dataflow the spec
//! actually describes: "the Event Runner consumes [a published
//! `user.message`], acquires an interactive capacity slot, runs an LLM
//! turn" — a background task subscribed to the bus that reacts to
//! `user.message` events published by someone else (a chat gateway) and
//! drives the same turn without re-publishing the message it just consumed.

use crate::instructions::PersonaLayer;
use crate::react::{from_core_messages, run_react_loop, ReactLoopInputs, ReactOutcome};
use fulcrum_agent::compress::estimate_tokens;
use fulcrum_agent::provider::ProviderDyn;
use fulcrum_agent::{Compressor, ProviderMessage, RecoveryMiddleware, Role as WireRole, ToolRegistry};
use fulcrum_core::event::StreamPhase;
use fulcrum_core::{
    ActorPool, Event, EventBus, EventPayload, Message, PreemptHandle, Role, RunnerError, Session,
    SessionId, SessionStore, Source, Timestamp,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Drives interactive session turns (spec §4.3): at most one turn runs
/// concurrently per session, enforced by `running`.
pub struct EventRunner {
    persona: PersonaLayer,
    session_store: Arc<dyn SessionStore>,
    bus: Arc<dyn EventBus>,
    pool: Arc<dyn ActorPool>,
    tools: Arc<ToolRegistry>,
    providers: HashMap<String, Arc<dyn ProviderDyn>>,
    hooks: Arc<fulcrum_hooks::HookRegistry>,
    compressor: Compressor,
    tool_max_retries: u32,
    max_turns: u32,
    max_tokens: u32,
    running: Mutex<HashSet<SessionId>>,
}

impl EventRunner {
    /// Construct a runner with no providers registered yet; use
    /// [`Self::with_provider`] to populate them.
    pub fn new(
        persona: PersonaLayer,
        session_store: Arc<dyn SessionStore>,
        bus: Arc<dyn EventBus>,
        pool: Arc<dyn ActorPool>,
        tools: Arc<ToolRegistry>,
        hooks: Arc<fulcrum_hooks::HookRegistry>,
        compressor: Compressor,
    ) -> Self {
        Self {
            persona,
            session_store,
            bus,
            pool,
            tools,
            providers: HashMap::new(),
            hooks,
            compressor,
            tool_max_retries: 3,
            max_turns: 25,
            max_tokens: 4096,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Register a provider under `name`.
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn ProviderDyn>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Override the per-turn tool retry budget (spec default 3).
    pub fn with_tool_max_retries(mut self, max_retries: u32) -> Self {
        self.tool_max_retries = max_retries;
        self
    }

    /// Handle one interactive turn on `session_id`: publish the user's
    /// message onto the bus, append it, run the model, append its reply,
    /// and return the reply text.
    ///
    /// Use this when the caller has not already published `user_message`
    /// itself; a bus-driven deployment should instead publish the event and
    /// let [`Self::spawn_listener`] pick it up, so the message is only ever
    /// on the bus once.
    ///
    /// Returns an error without mutating the session further if a turn is
    /// already running for this session (spec §4.3: "at most one
    /// concurrent turn per session").
    pub async fn handle_turn(
        &self,
        session_id: SessionId,
        provider: &str,
        user_message: String,
    ) -> Result<String, RunnerError> {
        self.bus.publish(
            Event::new(Source::User, EventPayload::UserMessage { content: user_message.clone() })
                .with_session(session_id.clone()),
        );
        self.execute_turn(session_id, provider, user_message).await
    }

    /// Subscribe to the bus and drive a turn for every `user.message` event
    /// carrying a `session_id`, using `provider` for all of them. Spawns one
    /// detached task per incoming message so a slow turn never blocks the
    /// next session's; [`Self::execute_turn`]'s own `running` guard still
    /// serializes turns within the same session. Returns the listener's own
    /// join handle so callers can shut it down by aborting it.
    pub fn spawn_listener(self: Arc<Self>, provider: String) -> tokio::task::JoinHandle<()> {
        let mut subscriber = self.bus.subscribe();
        tokio::spawn(async move {
            while let Some(event) = subscriber.recv_matching(&["user.message"]).await {
                let Some(session_id) = event.session_id.clone() else {
                    continue;
                };
                let EventPayload::UserMessage { content } = event.payload else {
                    continue;
                };
                let this = self.clone();
                let provider = provider.clone();
                tokio::spawn(async move {
                    if let Err(err) = this.execute_turn(session_id.clone(), &provider, content).await {
                        warn!(%session_id, error = %err, "event runner: turn failed");
                    }
                });
            }
        })
    }

    /// Run a turn whose `user_message` is already on the bus (or about to
    /// be, by [`Self::handle_turn`]); acquires/releases an interactive
    /// actor lease around the model call (spec §4.6) and enforces the
    /// at-most-one-turn-per-session invariant.
    async fn execute_turn(
        &self,
        session_id: SessionId,
        provider: &str,
        user_message: String,
    ) -> Result<String, RunnerError> {
        {
            let mut running = self.running.lock().await;
            if !running.insert(session_id.clone()) {
                return Err(RunnerError::Other(
                    format!("a turn is already running for session {session_id}").into(),
                ));
            }
        }

        let result = self.run_turn(&session_id, provider, user_message).await;

        self.running.lock().await.remove(&session_id);
        result
    }

    async fn run_turn(
        &self,
        session_id: &SessionId,
        provider_name: &str,
        user_message: String,
    ) -> Result<String, RunnerError> {
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| RunnerError::Other(format!("unknown provider: {provider_name}").into()))?;

        let mut session = match self.session_store.get(session_id).await? {
            Some(session) => session,
            None => {
                let session = Session::new(session_id.clone());
                self.session_store.create(session.clone()).await?;
                session
            }
        };

        let user_msg = Message::new(Role::User, user_message);
        self.session_store.append_message(session_id, user_msg.clone()).await?;
        session.message_count += 1;
        session.updated_at = Timestamp::now();

        let mut system = String::new();
        if !self.persona.persona.is_empty() {
            system.push_str(&self.persona.persona);
            system.push_str("\n\n");
        }
        if !self.persona.operating_instructions.is_empty() {
            system.push_str(&self.persona.operating_instructions);
        }

        // Load only the tail left unsummarized by the last compaction (spec
        // §3 Session invariant), not the full raw log — `summary_up_to`
        // raw messages are already folded into `session.summary`.
        let history = self.session_store.messages(session_id).await?;
        let tail: Vec<Message> = history.into_iter().skip(session.summary_up_to as usize).collect();
        let mut messages = Vec::with_capacity(tail.len() + 1);
        if let Some(summary) = &session.summary {
            messages.push(ProviderMessage::text(
                WireRole::System,
                format!("[Summary of earlier conversation]\n{summary}"),
            ));
        }
        messages.extend(from_core_messages(tail.clone()));

        let recovery = RecoveryMiddleware::new(self.tool_max_retries);
        let preempt = PreemptHandle::never();

        let lease = self
            .pool
            .acquire_interactive(provider_name)
            .await
            .map_err(|err| RunnerError::Other(Box::new(err)))?;

        self.bus.publish(
            Event::new(
                Source::Agent,
                EventPayload::AssistantStream { phase: StreamPhase::Start, index: 0, delta: None },
            )
            .with_session(session_id.clone()),
        );

        let outcome = run_react_loop(ReactLoopInputs {
            system,
            messages,
            tools: &self.tools,
            allowed_tool_names: &[],
            allow_validation: false,
            provider: provider.as_ref(),
            recovery: &recovery,
            hooks: &self.hooks,
            preempt: &preempt,
            compressor: &self.compressor,
            max_turns: self.max_turns,
            model: None,
            max_tokens: self.max_tokens,
            bus: self.bus.as_ref(),
            session_id: Some(session_id.clone()),
            task_id: None,
        })
        .await;

        self.pool.release(lease).await;

        match outcome {
            ReactOutcome::Completed { text, tokens_in, tokens_out, .. } => {
                let assistant_msg = Message::new(Role::Assistant, text.clone());
                self.session_store.append_message(session_id, assistant_msg.clone()).await?;
                session.message_count += 1;
                session.tokens_in += tokens_in;
                session.tokens_out += tokens_out;
                session.updated_at = Timestamp::now();

                self.maybe_compact(&mut session, tail, assistant_msg, provider.as_ref()).await;
                self.session_store.update(&session).await?;

                self.bus.publish(
                    Event::new(
                        Source::Agent,
                        EventPayload::AssistantStream {
                            phase: StreamPhase::Delta,
                            index: 1,
                            delta: Some(text.clone()),
                        },
                    )
                    .with_session(session_id.clone()),
                );
                self.bus.publish(
                    Event::new(
                        Source::Agent,
                        EventPayload::AssistantStream { phase: StreamPhase::End, index: 1, delta: None },
                    )
                    .with_session(session_id.clone()),
                );
                self.bus.publish(
                    Event::new(
                        Source::Agent,
                        EventPayload::AssistantMessage { content: text.clone(), error: None },
                    )
                    .with_session(session_id.clone()),
                );

                Ok(text)
            }
            ReactOutcome::Failed(message) => {
                self.session_store.update(&session).await?;
                self.close_stream_after_error(session_id);
                self.bus.publish(
                    Event::new(
                        Source::Agent,
                        EventPayload::AssistantMessage { content: String::new(), error: Some(message.clone()) },
                    )
                    .with_session(session_id.clone()),
                );
                Err(RunnerError::Other(message.into()))
            }
            ReactOutcome::Preempted { .. } => Err(RunnerError::Other(
                "interactive turn was unexpectedly preempted".to_string().into(),
            )),
            ReactOutcome::Suspended { .. } => Err(RunnerError::Other(
                "interactive turn unexpectedly requested validation".to_string().into(),
            )),
            ReactOutcome::ModelUnavailable(message) => {
                self.session_store.update(&session).await?;
                self.close_stream_after_error(session_id);
                self.bus.publish(
                    Event::new(
                        Source::Agent,
                        EventPayload::AssistantMessage { content: String::new(), error: Some(message.clone()) },
                    )
                    .with_session(session_id.clone()),
                );
                Err(RunnerError::ModelUnavailable(message))
            }
        }
    }

    /// Persist a rolling compaction of the session's history across turns
    /// (spec §3 Session invariant, §9 Design Note), as opposed to the
    /// in-loop compaction [`run_react_loop`] performs when a single turn
    /// alone threatens to overrun the context window: `tail` (the messages
    /// sent into this turn, minus the synthetic summary message) plus the
    /// assistant's new reply are the candidates; on a trigger, the oldest
    /// two-thirds are folded into `session.summary` and `summary_up_to`
    /// advances past them, exactly mirroring [`Compressor::compact`]'s own
    /// split so the two stay in lockstep turn over turn.
    async fn maybe_compact(
        &self,
        session: &mut Session,
        mut tail: Vec<Message>,
        assistant_msg: Message,
        provider: &dyn ProviderDyn,
    ) {
        tail.push(assistant_msg);
        let estimated = estimate_tokens(&tail);
        if tail.len() < 2 || !self.compressor.should_compact(estimated, provider.context_window()) {
            return;
        }

        let split_at = tail.len() - tail.len() / 3;
        let dyn_provider = crate::react::DynProviderRef(provider);
        let (_, new_summary) = self.compressor.compact(tail, session.summary.as_deref(), &dyn_provider).await;
        session.summary = new_summary;
        session.summary_up_to += split_at as u64;
    }

    /// `stream.start` was already published before the model call; a
    /// failed turn still has to close that stream so consumers waiting on
    /// `stream.end` are never left hanging (spec §3 "Event" invariant: "no
    /// delta arrives before `start` or after `end`" implies the stream is
    /// always bounded).
    fn close_stream_after_error(&self, session_id: &SessionId) {
        self.bus.publish(
            Event::new(Source::Agent, EventPayload::AssistantStream { phase: StreamPhase::End, index: 0, delta: None })
                .with_session(session_id.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulcrum_agent::{ContentPart, Provider, ProviderError, ProviderRequest, StopReason, TokenUsage};
    use fulcrum_core::{EventSubscriber, StoreError};
    use std::future::Future;
    use std::sync::Mutex as StdMutex;

    struct InMemoryBus {
        subscribers: StdMutex<Vec<tokio::sync::mpsc::Sender<Event>>>,
    }

    impl InMemoryBus {
        fn new() -> Self {
            Self { subscribers: StdMutex::new(Vec::new()) }
        }
    }

    impl EventBus for InMemoryBus {
        fn publish(&self, event: Event) {
            self.subscribers.lock().unwrap().retain(|tx| tx.try_send(event.clone()).is_ok());
        }
        fn subscribe(&self) -> EventSubscriber {
            let (tx, rx) = tokio::sync::mpsc::channel(16);
            self.subscribers.lock().unwrap().push(tx);
            EventSubscriber::new(rx)
        }
        fn tail(&self, _n: usize) -> Vec<Event> {
            Vec::new()
        }
        fn close(&self) {}
    }

    struct InMemorySessionStore {
        sessions: StdMutex<HashMap<String, Session>>,
        messages: StdMutex<HashMap<String, Vec<Message>>>,
    }

    impl InMemorySessionStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sessions: StdMutex::new(HashMap::new()),
                messages: StdMutex::new(HashMap::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl SessionStore for InMemorySessionStore {
        async fn create(&self, session: Session) -> Result<(), StoreError> {
            self.sessions.lock().unwrap().insert(session.id.as_str().to_string(), session);
            Ok(())
        }
        async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
            Ok(self.sessions.lock().unwrap().get(id.as_str()).cloned())
        }
        async fn update(&self, session: &Session) -> Result<(), StoreError> {
            self.sessions.lock().unwrap().insert(session.id.as_str().to_string(), session.clone());
            Ok(())
        }
        async fn append_message(&self, id: &SessionId, message: Message) -> Result<(), StoreError> {
            self.messages.lock().unwrap().entry(id.as_str().to_string()).or_default().push(message);
            Ok(())
        }
        async fn messages(&self, id: &SessionId) -> Result<Vec<Message>, StoreError> {
            Ok(self.messages.lock().unwrap().get(id.as_str()).cloned().unwrap_or_default())
        }
        async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
            Ok(self.sessions.lock().unwrap().keys().map(|k| SessionId::new(k.clone())).collect())
        }
    }

    struct AlwaysGrantPool;
    #[async_trait::async_trait]
    impl ActorPool for AlwaysGrantPool {
        async fn submit(&self, _task: fulcrum_core::Task) -> Result<(), fulcrum_core::PoolError> {
            Ok(())
        }
        async fn cancel(&self, _task_id: &fulcrum_core::TaskId, _reason: &str) -> Result<(), fulcrum_core::PoolError> {
            Ok(())
        }
        async fn resume(&self, _task_id: &fulcrum_core::TaskId) -> Result<(), fulcrum_core::PoolError> {
            Ok(())
        }
        async fn acquire_interactive(&self, provider: &str) -> Result<fulcrum_core::ActorLease, fulcrum_core::PoolError> {
            Ok(fulcrum_core::ActorLease {
                actor_id: fulcrum_core::ActorId::new(format!("{provider}-0")),
                provider: provider.to_string(),
            })
        }
        async fn release(&self, _lease: fulcrum_core::ActorLease) {}
    }

    struct OneShotProvider {
        text: String,
    }

    impl Provider for OneShotProvider {
        fn complete(
            &self,
            _request: ProviderRequest,
        ) -> impl Future<Output = Result<fulcrum_agent::wire::ProviderResponse, ProviderError>> + Send
        {
            let text = self.text.clone();
            async move {
                Ok(fulcrum_agent::wire::ProviderResponse {
                    content: vec![ContentPart::Text { text }],
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage { input_tokens: 3, output_tokens: 4 },
                    model: "mock".into(),
                    cost: None,
                })
            }
        }

        fn context_window(&self) -> usize {
            100_000
        }
    }

    fn runner(text: &str) -> (EventRunner, Arc<InMemorySessionStore>) {
        let store = InMemorySessionStore::new();
        let runner = EventRunner::new(
            PersonaLayer::default(),
            store.clone(),
            Arc::new(InMemoryBus::new()),
            Arc::new(AlwaysGrantPool),
            Arc::new(ToolRegistry::new()),
            Arc::new(fulcrum_hooks::HookRegistry::new()),
            Compressor::new(0.8),
        )
        .with_provider("mock", Arc::new(OneShotProvider { text: text.to_string() }));
        (runner, store)
    }

    #[tokio::test]
    async fn handle_turn_creates_session_and_appends_both_messages() {
        let (runner, store) = runner("hi there");
        let session_id = SessionId::new("s1");

        let reply = runner.handle_turn(session_id.clone(), "mock", "hello".to_string()).await.unwrap();
        assert_eq!(reply, "hi there");

        let messages = store.messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);

        let session = store.get(&session_id).await.unwrap().unwrap();
        assert_eq!(session.tokens_in, 3);
        assert_eq!(session.tokens_out, 4);
    }

    #[tokio::test]
    async fn unknown_provider_fails_without_mutating_the_session() {
        let (runner, store) = runner("unused");
        let session_id = SessionId::new("s2");

        let result = runner.handle_turn(session_id.clone(), "nonexistent", "hello".to_string()).await;
        assert!(result.is_err());
        // The session was never created since the provider lookup fails
        // before any store write.
        assert!(store.get(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn spawn_listener_drives_a_turn_off_a_published_user_message() {
        let store = InMemorySessionStore::new();
        let bus = Arc::new(InMemoryBus::new());
        let runner = Arc::new(
            EventRunner::new(
                PersonaLayer::default(),
                store.clone(),
                bus.clone() as Arc<dyn EventBus>,
                Arc::new(AlwaysGrantPool),
                Arc::new(ToolRegistry::new()),
                Arc::new(fulcrum_hooks::HookRegistry::new()),
                Compressor::new(0.8),
            )
            .with_provider("mock", Arc::new(OneShotProvider { text: "heard you".into() })),
        );

        let _listener = runner.clone().spawn_listener("mock".to_string());
        let session_id = SessionId::new("s3");
        bus.publish(
            Event::new(Source::User, EventPayload::UserMessage { content: "hello".into() })
                .with_session(session_id.clone()),
        );

        for _ in 0..50 {
            if store.get(&session_id).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let messages = store.messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "heard you");
    }
}
