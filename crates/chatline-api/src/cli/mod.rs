//! CLI command definitions for the `chatline` binary.

pub mod cache;
pub mod conversation;
pub mod status;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Real-time conversation server with a read-through message cache.
#[derive(Parser)]
#[command(name = "chatline", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,chatline=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST and WebSocket server.
    Serve {
        /// Port to listen on.
        #[arg(long, short, default_value_t = 8080, env = "CHATLINE_PORT")]
        port: u16,

        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1", env = "CHATLINE_HOST")]
        host: String,
    },

    /// Show cache and store health.
    Status,

    /// Print the most recent messages of a conversation.
    History {
        /// Conversation id.
        conversation_id: String,

        /// Number of messages to show.
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Drop a conversation's cached messages and metadata.
    Invalidate {
        /// Conversation id.
        conversation_id: String,
    },

    /// Cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// List conversations with cached messages.
    #[command(alias = "ls")]
    List,

    /// Remove every cached conversation entry.
    Clear,
}
