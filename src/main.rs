use anyhow::Result;
use chatlist::cli::{ChatArgs, Cli, Commands};
use chatlist::{init_with, shutdown, utils, ChatListConfigPatch, Settings};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::new()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let warn_ratio = settings.limits.global_soft_ratio;

    init_with(settings).await?;

    let result = match cli.command {
        Commands::Get { chat, pretty } => handle_get(chat, pretty).await,
        Commands::Append { chat, message } => handle_append(chat, message).await,
        Commands::Delete { chat } => handle_delete(chat).await,
        Commands::Usage => handle_usage(warn_ratio).await,
        Commands::Evict { bytes } => handle_evict(bytes).await,
        Commands::Config => handle_config().await,
    };

    // Drain deferred writes before exiting
    shutdown().await?;

    result
}

async fn handle_get(chat: ChatArgs, pretty: bool) -> Result<()> {
    match chatlist::get_chat_list(&chat.host, chat.port, chat.kind, &chat.chat_id).await? {
        Some(log) => {
            let rendered = if pretty {
                serde_json::to_string_pretty(&log)?
            } else {
                serde_json::to_string(&log)?
            };
            println!("{}", rendered);
        }
        None => utils::print_info(&format!("No stored messages for '{}'", chat.chat_id)),
    }
    Ok(())
}

async fn handle_append(chat: ChatArgs, message: String) -> Result<()> {
    let message = serde_json::from_str::<Value>(&message).unwrap_or(Value::String(message));

    let outcome = chatlist::Chat::new(chat.host, chat.port, chat.kind, chat.chat_id)
        .append(message)
        .await?;

    utils::print_save_result(&outcome.meta);
    if !outcome.meta.success {
        anyhow::bail!("save failed for {}", outcome.meta.key);
    }
    Ok(())
}

async fn handle_delete(chat: ChatArgs) -> Result<()> {
    chatlist::delete_chat_list(&chat.host, chat.port, chat.kind, &chat.chat_id).await?;
    utils::print_success(&format!("Deleted '{}'", chat.chat_id));
    Ok(())
}

async fn handle_usage(warn_ratio: f64) -> Result<()> {
    let report = chatlist::usage_report().await?;
    let entries = chatlist::list_chats().await?;
    utils::print_usage(&report, &entries, warn_ratio);
    Ok(())
}

async fn handle_evict(bytes: usize) -> Result<()> {
    let stats = chatlist::evict_oldest(bytes).await?;
    if stats.evicted_keys.is_empty() {
        utils::print_info("Nothing evicted");
        return Ok(());
    }

    utils::print_success(&format!(
        "Freed {} from {} conversation(s)",
        utils::format_bytes(stats.freed_bytes),
        stats.evicted_keys.len()
    ));
    for key in &stats.evicted_keys {
        println!("  {}", key);
    }
    if !stats.satisfied() {
        utils::print_warning("Could not free the full amount requested");
    }
    Ok(())
}

async fn handle_config() -> Result<()> {
    let config = chatlist::set_chat_list_config(ChatListConfigPatch::default()).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
