//! Simple usage: append to a conversation and inspect store usage

use chatlist::{init, shutdown, usage_report, Chat};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    init().await?;

    let chat = Chat::public("127.0.0.1", 17117, "general");

    for text in ["hello", "how are you?", "fine, thanks"] {
        let outcome = chat.append(json!({ "user": "demo", "text": text })).await?;
        println!(
            "saved {} message(s), {} bytes{}",
            outcome.data.len(),
            outcome.meta.final_bytes,
            if outcome.changed { " (trimmed)" } else { "" }
        );
    }

    let report = usage_report().await?;
    println!(
        "\n{} conversation(s), ~{} of {} bytes used ({:.1}%)",
        report.conversations,
        report.rough_usage_bytes,
        report.quota_bytes,
        report.usage_ratio * 100.0
    );

    shutdown().await?;
    Ok(())
}
