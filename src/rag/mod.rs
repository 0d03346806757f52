//! Conversational retrieval-augmented generation on top of the session store.

pub mod engine;
pub mod error;
pub mod prompt;
pub mod traits;

pub use engine::{ChatOptions, ChatResponse, ConversationalRag};
pub use error::RagError;
pub use traits::{FragmentStream, Generator, RetrievedChunk, Retriever};
