//! System status command.

use anyhow::Result;
use console::style;

use chatline_types::cache::CacheHealth;

use crate::state::AppState;

/// Display cache and store health.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let service = state.conversations();
    let cache = service.cache_status().await;
    let stats = service.cache_stats();
    let store_ok = service.store_reachable().await;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "store": { "reachable": store_ok },
            "cache": cache,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Chatline v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Cache ──").dim());
    println!("  Backend:  {}", style(&cache.backend).bold());
    let health = match cache.health {
        CacheHealth::Up => style("up").green(),
        CacheHealth::Down => style("down").red(),
    };
    println!("  Health:   {health}");
    println!("  Cached:   {} conversations", cache.active_conversations);
    if let Some(err) = &cache.last_error {
        println!("  Error:    {}", style(err).yellow());
    }
    println!();

    println!("  {}", style("── Store ──").dim());
    let store = if store_ok {
        style("reachable").green()
    } else {
        style("unreachable").red()
    };
    println!("  SQLite:   {store}");
    println!("  Data:     {}", state.data_dir.display());
    println!();

    Ok(())
}
