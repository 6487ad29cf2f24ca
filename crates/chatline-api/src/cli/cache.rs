//! Cache maintenance commands.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub async fn list(state: &AppState, json: bool) -> Result<()> {
    let conversations = state.conversations().active_conversations().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!("  {}", style("No cached conversations.").dim());
        return Ok(());
    }
    for id in &conversations {
        println!("  {id}");
    }
    Ok(())
}

pub async fn clear(state: &AppState, json: bool) -> Result<()> {
    let removed = state.conversations().clear_cache().await;

    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        println!("  {} Removed {} cache entries", style("✓").green(), removed);
    }
    Ok(())
}
