mod config;
mod discord;
mod engine;
mod handler;
mod log;
mod models;
mod ogs;
mod polling;
mod realtime;
mod store;

use anyhow::Result;
use clap::Parser;
use serenity::prelude::*;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use config::Config;
use engine::ReconcileEngine;
use handler::BotHandler;
use ogs::OgsClient;
use store::TrackedStore;

#[derive(Parser)]
#[command(about = "Watches tracked OGS players and announces their games on Discord")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)
        .expect("Failed to read config. Please create it with your bot token and settings.");

    print_config_info(&config);

    let config = Arc::new(config);

    let mut store = TrackedStore::load(config.state_path());
    for id in &config.ogs.tracked_players {
        store.add_player(*id);
    }

    let client = Arc::new(
        OgsClient::new(config.ogs.rest_url.clone(), config.ogs.token.clone())
            .expect("Failed to build the OGS HTTP client"),
    );

    let engine = ReconcileEngine::new(store);
    let (engine_tx, engine_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handler = BotHandler {
        config: Arc::clone(&config),
        client,
        engine_tx,
        engine: Mutex::new(Some((engine, engine_rx))),
        shutdown: shutdown_rx,
    };

    let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut discord_client = Client::builder(&config.discord.token, intents)
        .event_handler(handler)
        .await
        .expect("Failed to create Discord client");

    let shard_manager = discord_client.shard_manager.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
        log::info("Shutting down...");
        let _ = shutdown_tx.send(true);
        shard_manager.shutdown_all().await;
    });

    println!("[+] Starting Discord bot...\n");

    if let Err(why) = discord_client.start().await {
        eprintln!("[-] Client error: {:?}", why);
    }

    Ok(())
}

fn print_config_info(config: &Config) {
    println!("📋 Configuration loaded:");
    println!("   OGS REST URL: {}", config.ogs.rest_url);
    println!("   Channel ID: {}", config.discord.channel_id);
    println!("   Poll interval: {}s", config.ogs.poll_interval);
    println!(
        "   Realtime channel: {}",
        if config.ogs.realtime { "enabled" } else { "disabled" }
    );
    match config.state_path() {
        Some(path) => println!("   State file: {}", path.display()),
        None => println!("   State file: none (memory only)"),
    }

    println!("   Tracked players: {}", config.ogs.tracked_players.len());
    for id in &config.ogs.tracked_players {
        println!("      - {}", id);
    }
    println!();
}
