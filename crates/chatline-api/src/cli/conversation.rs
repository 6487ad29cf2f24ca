//! Conversation inspection commands.

use anyhow::Result;
use console::style;

use chatline_types::ids::ConversationId;
use chatline_types::message::MessageRole;

use crate::state::AppState;

/// Print the newest `limit` messages, oldest first.
pub async fn history(state: &AppState, conversation_id: &str, limit: usize, json: bool) -> Result<()> {
    let id = ConversationId::parse(conversation_id)?;
    let messages = state.conversations().read_recent_messages(&id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("  {}", style("No messages.").dim());
        return Ok(());
    }

    println!();
    for message in &messages {
        let sender = match message.role {
            MessageRole::Assistant => style(message.sender_id.to_string()).magenta(),
            _ => style(message.sender_id.to_string()).cyan(),
        };
        println!(
            "  {} {} {}",
            style(format!("#{}", message.sequence)).dim(),
            sender.bold(),
            message.content
        );
    }
    println!();
    Ok(())
}

/// Drop cached entries for one conversation.
pub async fn invalidate(state: &AppState, conversation_id: &str, json: bool) -> Result<()> {
    let id = ConversationId::parse(conversation_id)?;
    let removed = state.conversations().invalidate(&id).await;

    if json {
        let out = serde_json::json!({ "conversation_id": id, "invalidated": removed });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if removed {
        println!("  {} Cache entries for '{}' removed", style("✓").green(), id);
    } else {
        println!("  {} Nothing cached for '{}'", style("·").dim(), id);
    }
    Ok(())
}
