//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use talki_core::{
    ports::{ChatStore, GenerationService, IdentityProvider, MaterialStore, MessageStore, PhraseStore},
    ChatOrchestrator, PhraseJobs, PhrasePipeline,
};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub materials: Arc<dyn MaterialStore>,
    pub phrases: Arc<dyn PhraseStore>,
    pub chats: Arc<dyn ChatStore>,
    pub messages: Arc<dyn MessageStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<Config>,
    pub phrase_jobs: PhraseJobs,
    pub chat_orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    /// Wires the orchestrators to a store that backs every port and to the
    /// generation service.
    pub fn new<S>(store: Arc<S>, generator: Arc<dyn GenerationService>, config: Arc<Config>) -> Self
    where
        S: MaterialStore + PhraseStore + ChatStore + MessageStore + IdentityProvider + 'static,
    {
        let materials: Arc<dyn MaterialStore> = store.clone();
        let phrases: Arc<dyn PhraseStore> = store.clone();
        let chats: Arc<dyn ChatStore> = store.clone();
        let messages: Arc<dyn MessageStore> = store.clone();
        let identity: Arc<dyn IdentityProvider> = store;

        let pipeline = Arc::new(PhrasePipeline::new(
            materials.clone(),
            phrases.clone(),
            generator.clone(),
            config.phrase_budget,
        ));
        let chat_orchestrator = Arc::new(ChatOrchestrator::new(
            chats.clone(),
            messages.clone(),
            generator,
            config.chat_timeout,
        ));

        Self {
            materials,
            phrases,
            chats,
            messages,
            identity,
            config,
            phrase_jobs: PhraseJobs::new(pipeline),
            chat_orchestrator,
        }
    }
}
