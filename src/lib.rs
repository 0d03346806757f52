#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps
)]

use clap::Subcommand;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod rag;
pub mod sessions;
pub mod sources;
pub(crate) mod util;

pub use config::Config;
pub use rag::{ChatOptions, ChatResponse, ConversationalRag, RagError};
pub use sessions::{open_session_store, SessionError, SessionStore};

/// Session management subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionCommands {
    /// List stored sessions, most recently updated first
    List,
    /// Show the most recent messages of a session
    Show {
        /// Session ID
        id: String,
        /// Number of messages to display (defaults to chat.history_display_limit)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete a session and save the store
    Delete {
        /// Session ID
        id: String,
    },
}
