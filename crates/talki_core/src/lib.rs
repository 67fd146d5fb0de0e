pub mod chat_turn;
pub mod domain;
pub mod locks;
pub mod phrase_pipeline;
pub mod ports;

pub use chat_turn::ChatOrchestrator;
pub use domain::{
    Chat, Importance, Material, MaterialStatus, MaterialUpdate, Message, NewMaterial, Phrase,
    SenderType,
};
pub use locks::KeyedLocks;
pub use phrase_pipeline::{PhraseJobs, PhrasePipeline, PipelineFailure};
pub use ports::{
    ChatStore, GenerationService, IdentityProvider, MaterialStore, MessageStore, PhraseStore,
    PortError, PortResult,
};
