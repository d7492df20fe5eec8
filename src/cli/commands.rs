use crate::core::ChatKind;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatlist")]
#[command(author, version, about = "Inspect and edit bounded chat histories", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Which conversation to operate on
#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    pub chat_id: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = 17117)]
    pub port: u16,

    /// `public` or `private`
    #[arg(short, long, default_value = "public")]
    pub kind: ChatKind,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a conversation's stored messages
    Get {
        #[command(flatten)]
        chat: ChatArgs,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Append a message and save the conversation through the trim pipeline
    Append {
        #[command(flatten)]
        chat: ChatArgs,

        /// JSON value, or plain text stored as a string
        message: String,
    },

    /// Remove a conversation and its index entry
    Delete {
        #[command(flatten)]
        chat: ChatArgs,
    },

    /// Show approximate store usage and indexed conversations
    Usage,

    /// Free space by evicting the oldest conversations
    Evict {
        /// Bytes to free
        bytes: usize,
    },

    /// Print the effective limits
    Config,
}
