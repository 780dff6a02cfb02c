use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::Config;
use crate::discord::DiscordMessenger;
use crate::engine::{EngineMsg, ReconcileEngine};
use crate::log;
use crate::ogs::OgsClient;
use crate::polling::PollingService;
use crate::realtime::RealtimeConnector;

pub struct BotHandler {
  pub config: Arc<Config>,
  pub client: Arc<OgsClient>,
  pub engine_tx: mpsc::Sender<EngineMsg>,
  // Taken by the first `ready`; the gateway re-fires `ready` on resume and
  // the watcher tasks must not be spawned twice.
  pub engine: Mutex<Option<(ReconcileEngine, mpsc::Receiver<EngineMsg>)>>,
  pub shutdown: watch::Receiver<bool>,
}

#[async_trait]
impl EventHandler for BotHandler {
  async fn ready(&self, ctx: Context, ready: Ready) {
    log::success(format!("{} is connected and ready!", ready.user.name));

    let Some((engine, engine_rx)) = self.engine.lock().unwrap().take() else {
      return;
    };

    let ctx = Arc::new(ctx);
    let messenger = DiscordMessenger::new(self.config.discord.channel_id);
    let _ = messenger.send_text(&ctx, "Game watcher is online.").await;

    tokio::spawn(engine.run(
      engine_rx,
      Arc::clone(&ctx),
      messenger,
      self.config.ogs.site_url.clone(),
      self.shutdown.clone(),
    ));

    let polling = PollingService::new(
      Arc::clone(&self.config),
      Arc::clone(&self.client),
      self.engine_tx.clone(),
    );
    tokio::spawn(polling.run(self.shutdown.clone()));

    if self.config.ogs.realtime {
      let connector = RealtimeConnector::new(
        Arc::clone(&self.config),
        Arc::clone(&self.client),
        self.engine_tx.clone(),
      );
      tokio::spawn(connector.run(self.shutdown.clone()));
    }
  }

  async fn message(&self, ctx: Context, msg: Message) {
    if msg.author.bot {
      return;
    }

    let content = msg.content.trim();

    if content == "!start" {
      reply(&ctx, &msg, "Bot is running.").await;
    } else if let Some(arg) = content.strip_prefix("!adduser") {
      self.handle_adduser(&ctx, &msg, arg.trim()).await;
    } else if content == "!listusers" {
      self.handle_listusers(&ctx, &msg).await;
    }
  }
}

impl BotHandler {
  async fn handle_adduser(&self, ctx: &Context, msg: &Message, arg: &str) {
    if !self.config.discord.allow_adduser {
      reply(ctx, msg, "The adduser command is disabled.").await;
      return;
    }

    let Ok(id) = arg.parse::<u64>() else {
      reply(ctx, msg, "Usage: !adduser <player id>").await;
      return;
    };

    let (tx, rx) = oneshot::channel();
    if self
      .engine_tx
      .send(EngineMsg::AddPlayer { id, resp: tx })
      .await
      .is_err()
    {
      reply(ctx, msg, "The watcher is not running yet.").await;
      return;
    }

    match rx.await {
      Ok(true) => reply(ctx, msg, format!("Now tracking player {}.", id)).await,
      Ok(false) => reply(ctx, msg, format!("Player {} is already tracked.", id)).await,
      Err(_) => reply(ctx, msg, "The watcher is not running yet.").await,
    }
  }

  async fn handle_listusers(&self, ctx: &Context, msg: &Message) {
    let (tx, rx) = oneshot::channel();
    if self
      .engine_tx
      .send(EngineMsg::ListPlayers { resp: tx })
      .await
      .is_err()
    {
      reply(ctx, msg, "The watcher is not running yet.").await;
      return;
    }

    let text = match rx.await {
      Ok(players) if players.is_empty() => "No tracked players.".to_string(),
      Ok(players) => format!(
        "Tracked players: {}",
        players
          .iter()
          .map(|id| id.to_string())
          .collect::<Vec<_>>()
          .join(", ")
      ),
      Err(_) => "The watcher is not running yet.".to_string(),
    };
    reply(ctx, msg, text).await;
  }
}

async fn reply(ctx: &Context, msg: &Message, text: impl Into<String>) {
  if let Err(e) = msg.channel_id.say(&ctx.http, text.into()).await {
    log::error(format!("Failed to reply: {}", e));
  }
}
