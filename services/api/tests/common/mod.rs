//! Shared fixtures for the integration tests: a scripted generation service,
//! a phrase store that breaks on demand, and an `AppState` over the in-memory store.

#![allow(dead_code)]

use api_lib::{adapters::InMemoryStore, config::Config, web::state::AppState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talki_core::{
    domain::{Message, Phrase},
    ports::{GenerationService, PhraseStore, PortError, PortResult},
};
use uuid::Uuid;

pub const ALICE: &str = "alice";
pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB: &str = "bob";

/// A generation service that answers from a script.
#[derive(Default)]
pub struct ScriptedGenerator {
    phrases: Mutex<VecDeque<PortResult<Vec<String>>>>,
    replies: Mutex<VecDeque<PortResult<String>>>,
    delay: Mutex<Option<Duration>>,
    /// Every `(history, content)` pair passed to `send_message`.
    pub calls: Mutex<Vec<(Vec<Message>, String)>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_phrases(&self, phrases: &[&str]) {
        self.phrases
            .lock()
            .unwrap()
            .push_back(Ok(phrases.iter().map(|p| p.to_string()).collect()));
    }

    pub fn push_phrase_error(&self, error: PortError) {
        self.phrases.lock().unwrap().push_back(Err(error));
    }

    pub fn push_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_reply_error(&self, error: PortError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Every call waits this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<(Vec<Message>, String)> {
        self.calls.lock().unwrap().clone()
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate_phrases(&self, _source_text: &str) -> PortResult<Vec<String>> {
        self.wait().await;
        self.phrases
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Generation("no scripted phrases".to_string())))
    }

    async fn send_message(&self, history: &[Message], content: &str) -> PortResult<String> {
        self.calls
            .lock()
            .unwrap()
            .push((history.to_vec(), content.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.wait().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Generation("no scripted reply".to_string())))
    }
}

/// Wraps the in-memory store and rejects every phrase insert after the first `allowed`.
pub struct FailingPhraseStore {
    pub inner: InMemoryStore,
    allowed: usize,
    inserted: AtomicUsize,
}

impl FailingPhraseStore {
    pub fn new(inner: InMemoryStore, allowed: usize) -> Self {
        Self {
            inner,
            allowed,
            inserted: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PhraseStore for FailingPhraseStore {
    async fn create_phrase(&self, phrase: Phrase) -> PortResult<()> {
        if self.inserted.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(PortError::Unexpected("disk full".to_string()));
        }
        self.inner.create_phrase(phrase).await
    }

    async fn get_phrases_for_material(&self, material_id: Uuid) -> PortResult<Vec<Phrase>> {
        self.inner.get_phrases_for_material(material_id).await
    }

    async fn delete_phrases_for_material(&self, material_id: Uuid) -> PortResult<u64> {
        self.inner.delete_phrases_for_material(material_id).await
    }
}

/// Configuration with the given execution budgets and defaults for the rest.
pub fn test_config(phrase_budget_secs: u64, chat_timeout_secs: u64) -> Arc<Config> {
    let phrase_budget = phrase_budget_secs.to_string();
    let chat_timeout = chat_timeout_secs.to_string();
    let config = Config::from_lookup(|key| match key {
        "PHRASE_BUDGET_SECS" => Some(phrase_budget.clone()),
        "CHAT_TIMEOUT_SECS" => Some(chat_timeout.clone()),
        _ => None,
    })
    .unwrap();
    Arc::new(config)
}

/// An `AppState` over a fresh in-memory store, with `ALICE_TOKEN` registered.
pub async fn test_state(
    generator: Arc<ScriptedGenerator>,
    config: Arc<Config>,
) -> (Arc<AppState>, InMemoryStore) {
    let store = InMemoryStore::new();
    store.register_token(ALICE_TOKEN, ALICE).await;
    let state = AppState::new(Arc::new(store.clone()), generator, config);
    (Arc::new(state), store)
}
