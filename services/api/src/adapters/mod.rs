pub mod db;
pub mod generation_llm;
pub mod memory;

pub use db::DbAdapter;
pub use generation_llm::OpenAiGenerationAdapter;
pub use memory::InMemoryStore;
