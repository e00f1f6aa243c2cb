//! Terminal chat
//!
//! Connects to the broker, subscribes to one channel, prints what happens
//! on it and publishes every line typed on stdin as `{"input": "<line>"}`.
//! Runs until Ctrl-C or end of input.

use chatlink::client::{Client, EventHandler, SubEventHandler};
use chatlink::config::{load_config, load_config_from};
use chatlink::utils::logging;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "chatlink", about = "Chat over a pub/sub broker")]
struct Args {
    /// Broker WebSocket URL (overrides configuration)
    #[arg(long)]
    url: Option<String>,
    /// Channel to chat on (overrides configuration)
    #[arg(long)]
    channel: Option<String>,
    /// Configuration file, without extension (default: config/default)
    #[arg(long)]
    config: Option<String>,
}

/// Chat app specific message shape.
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    input: String,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Chat failed: {}", e);
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = match &args.config {
        Some(file) => load_config_from(file)?,
        None => load_config()?,
    };
    logging::init(&settings.log.level);

    if let Some(url) = args.url {
        settings.client.url = url;
    }
    let channel = args.channel.unwrap_or(settings.chat.channel);

    let events = EventHandler::new()
        .on_connect(|e| println!("Connected to chat with ID {}", e.client_id))
        .on_error(|e| println!("Error: {}", e.message))
        .on_disconnect(|e| println!("Disconnected from chat: {}", e.reason));

    let sub_events = SubEventHandler::new()
        .on_subscribe_success(|e| println!("Subscribed on channel {}", e.channel))
        .on_subscribe_error(|e| {
            println!("Subscribed on channel {} failed, error: {}", e.channel, e.error)
        })
        .on_publication(|e| {
            let Ok(msg) = serde_json::from_slice::<ChatMessage>(&e.data) else {
                return;
            };
            println!("Someone says: {}", msg.input.trim_end());
        })
        .on_join(|e| {
            println!(
                "Someone joined: user id {}, client id {}",
                e.info.user, e.info.client
            )
        })
        .on_leave(|e| {
            println!(
                "Someone left: user id {}, client id {}",
                e.info.user, e.info.client
            )
        })
        .on_unsubscribe(|e| println!("Unsubscribed from channel {}", e.channel));

    println!("Connect to {}", settings.client.url);
    println!("Print something and press ENTER to send");

    let client = Client::new(settings.client, events);
    let sub = client.subscribe(&channel, sub_events)?;
    client.connect()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(text) = line? else {
                    break;
                };
                let data = serde_json::to_vec(&ChatMessage {
                    input: format!("{text}\n"),
                })?;
                if let Err(e) = sub.publish(data) {
                    warn!("Message not sent: {}", e);
                    println!("Not sent: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await;
    Ok(())
}
