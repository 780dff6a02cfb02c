use anyhow::Result;
use serenity::builder::{CreateEmbed, CreateMessage};
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use tokio::time::{Duration, timeout};

use crate::log;

/// Sends to the one configured recipient channel. Best-effort: the caller
/// decides what to do with a failure, nothing is queued here.
pub struct DiscordMessenger {
  channel_id: u64,
}

impl DiscordMessenger {
  pub fn new(channel_id: u64) -> Self {
    Self { channel_id }
  }

  pub async fn send_embed(&self, ctx: &Context, embed: CreateEmbed) -> Result<()> {
    self
      .send_message(ctx, CreateMessage::new().embed(embed))
      .await
  }

  pub async fn send_text(&self, ctx: &Context, text: impl Into<String>) -> Result<()> {
    self
      .send_message(ctx, CreateMessage::new().content(text.into()))
      .await
  }

  async fn send_message(&self, ctx: &Context, message: CreateMessage) -> Result<()> {
    let send_future = ChannelId::new(self.channel_id).send_message(&ctx.http, message);

    match timeout(Duration::from_secs(10), send_future).await {
      Ok(Ok(_)) => {
        log::success(format!("Sent message to channel {}", self.channel_id));
        Ok(())
      }
      Ok(Err(e)) => {
        log::error(format!(
          "Failed to send message to channel {}: {}",
          self.channel_id, e
        ));
        Err(e.into())
      }
      Err(_) => {
        log::error(format!(
          "Timeout (10s) while sending message to channel {}",
          self.channel_id
        ));
        Err(anyhow::anyhow!("Message send timeout after 10 seconds"))
      }
    }
  }
}
