//! Chatline CLI and server entry point.
//!
//! Binary name: `chatline`
//!
//! Parses CLI arguments, initializes the store, cache and dispatcher, then
//! dispatches to the appropriate command handler or starts the server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use chatline_observe::tracing_setup::{init_tracing, shutdown_tracing};
use cli::{CacheAction, Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "chatline", &mut std::io::stdout());
        return Ok(());
    }

    if let Err(err) = init_tracing(cli.log_directive(), cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {err}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve { port, host } => serve(state, &host, port).await?,

        Commands::Status => cli::status::status(&state, cli.json).await?,

        Commands::History {
            conversation_id,
            limit,
        } => cli::conversation::history(&state, &conversation_id, limit, cli.json).await?,

        Commands::Invalidate { conversation_id } => {
            cli::conversation::invalidate(&state, &conversation_id, cli.json).await?
        }

        Commands::Cache { action } => match action {
            CacheAction::List => cli::cache::list(&state, cli.json).await?,
            CacheAction::Clear => cli::cache::clear(&state, cli.json).await?,
        },

        Commands::Completions { .. } => unreachable!("handled in main"),
    }

    Ok(())
}

async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Chatline listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {}",
        console::style(format!("WebSocket: ws://{addr}/ws/{{user_id}}/conversations/{{conversation_id}}")).dim()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let dispatcher = state.dispatcher.clone();
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open sockets would otherwise hold graceful shutdown forever.
            let closed = dispatcher.shutdown();
            tracing::info!(closed, "closed live connections");
        })
        .await?;

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
