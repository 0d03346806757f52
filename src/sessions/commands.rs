use anyhow::{Context, Result};
use std::fmt::Write as _;

use super::{open_session_store, SessionStore};
use crate::config::Config;
use crate::util::truncate_with_ellipsis;
use crate::SessionCommands;

const PREVIEW_CHARS: usize = 77;

pub async fn handle_session_command(command: SessionCommands, config: &Config) -> Result<()> {
    let path = config.sessions_path();
    let store = open_session_store(&path)
        .await
        .with_context(|| format!("Failed to open sessions file {}", path.display()))?;

    match command {
        SessionCommands::List => print!("{}", render_list(&store)),
        SessionCommands::Show { id, limit } => {
            let limit = limit.unwrap_or(config.chat.history_display_limit);
            print!("{}", render_history(&store, &id, limit)?);
        }
        SessionCommands::Delete { id } => {
            delete_and_save(&store, &id, &path).await?;
            println!("✓ Deleted session: {id}");
        }
    }
    Ok(())
}

pub(crate) fn render_list(store: &SessionStore) -> String {
    let rows = store.summaries();
    if rows.is_empty() {
        return "No sessions found.\n".to_string();
    }

    let mut out = format!("Sessions ({} total):\n\n", rows.len());
    let _ = writeln!(
        out,
        "  {:<32} {:>8}  {:<20} {:<20}",
        "ID", "MESSAGES", "CREATED", "UPDATED"
    );
    for row in &rows {
        let _ = writeln!(
            out,
            "  {:<32} {:>8}  {:<20} {:<20}",
            row.session_id,
            row.message_count,
            row.created_at.format("%Y-%m-%d %H:%M:%S"),
            row.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    out
}

pub(crate) fn render_history(store: &SessionStore, id: &str, limit: usize) -> Result<String> {
    let Some(session) = store.get_session(id) else {
        anyhow::bail!("No session found with id: {id}");
    };
    let messages = store.recent_history(id, limit);

    let mut out = format!(
        "Session {} ({} messages, showing last {}):\n\n",
        session.session_id,
        session.messages.len(),
        messages.len()
    );
    for message in &messages {
        let line = message.content.lines().next().unwrap_or("");
        let _ = writeln!(
            out,
            "[{}] {:<9} {}",
            message.timestamp.format("%H:%M:%S"),
            message.role.as_str(),
            truncate_with_ellipsis(line, PREVIEW_CHARS)
        );
    }
    Ok(out)
}

pub(crate) async fn delete_and_save(
    store: &SessionStore,
    id: &str,
    path: &std::path::Path,
) -> Result<()> {
    if !store.delete_session(id) {
        anyhow::bail!("No session found with id: {id}");
    }
    store
        .save(path)
        .await
        .with_context(|| format!("Failed to save sessions file {}", path.display()))
}
