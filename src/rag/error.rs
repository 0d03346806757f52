use thiserror::Error;

use crate::sessions::SessionError;

/// Failures of a conversational turn.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("retrieval failed: {0:#}")]
    Retrieval(#[source] anyhow::Error),

    #[error("generation failed: {0:#}")]
    Generation(#[source] anyhow::Error),
}

impl RagError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Session(inner) => inner.kind(),
            Self::Retrieval(_) | Self::Generation(_) => "collaborator",
        }
    }

    /// Suggested next step for the user when the model backend is the problem.
    pub fn hint(&self) -> Option<&'static str> {
        let Self::Generation(source) = self else {
            return None;
        };
        let text = format!("{source:#}").to_ascii_lowercase();
        if text.contains("connection") && (text.contains("refused") || text.contains("failed")) {
            Some("Cannot reach the model server. Make sure it is running (for Ollama: `ollama serve`).")
        } else if text.contains("no such model") || text.contains("not found") {
            Some("The model is not installed. Pull it first (for Ollama: `ollama pull <model>`).")
        } else {
            None
        }
    }
}
