use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::Config;
use crate::engine::EngineMsg;
use crate::log;
use crate::models::RealtimeMessage;
use crate::ogs::OgsClient;

/// Long-lived connection to the realtime channel. Reconnects on its own;
/// the engine only ever sees normalized events.
pub struct RealtimeConnector {
  config: Arc<Config>,
  client: Arc<OgsClient>,
  engine_tx: mpsc::Sender<EngineMsg>,
}

impl RealtimeConnector {
  pub fn new(config: Arc<Config>, client: Arc<OgsClient>, engine_tx: mpsc::Sender<EngineMsg>) -> Self {
    Self {
      config,
      client,
      engine_tx,
    }
  }

  pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
    let url = self.config.ogs.realtime_url.clone();
    let mut attempt: u32 = 0;

    loop {
      match connect_async(url.as_str()).await {
        Ok((mut socket, _response)) => {
          attempt = 0;
          log::success(format!("Realtime connected to {}", url));

          // Events may have been missed while disconnected; reseed the
          // active set before processing live frames.
          self.resync().await;

          loop {
            tokio::select! {
              _ = shutdown.changed() => {
                let _ = socket.close(None).await;
                log::info("Realtime connection closed.");
                return;
              }
              next = socket.next() => match next {
                Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                  log::warn(format!("Realtime read error: {}", e));
                  break;
                }
              }
            }
          }

          log::warn("Realtime disconnected, reconnecting...");
        }
        Err(e) => log::warn(format!("Realtime connect failed: {}", e)),
      }

      attempt = attempt.saturating_add(1);
      let delay = reconnect_delay(attempt);
      log::info(format!("Reconnecting in {}s...", delay.as_secs()));

      tokio::select! {
        _ = shutdown.changed() => return,
        _ = sleep(delay) => {}
      }
    }
  }

  async fn handle_text(&self, text: &str) {
    let Some(event) = RealtimeMessage::parse(text).normalize() else {
      return;
    };

    if self.engine_tx.send(EngineMsg::Event(event)).await.is_err() {
      log::warn("Engine channel closed, dropping realtime event.");
    }
  }

  async fn resync(&self) {
    let players = self.list_players().await;
    let mut active = Vec::new();

    for (idx, player_id) in players.iter().enumerate() {
      if idx > 0 {
        sleep(Duration::from_millis(self.config.ogs.request_delay_ms)).await;
      }

      match self.client.fetch_active_games(*player_id).await {
        Ok(games) => active.extend(games),
        // Missing players here only delays their games to the next poll;
        // nothing gets marked ended from a failed fetch.
        Err(e) => log::warn(format!(
          "Resync fetch failed for player {}: {}",
          player_id, e
        )),
      }
    }

    if self.engine_tx.send(EngineMsg::Seed(active)).await.is_err() {
      log::warn("Engine channel closed, dropping resync seed.");
    }
  }

  async fn list_players(&self) -> Vec<u64> {
    let (tx, rx) = oneshot::channel();
    if self
      .engine_tx
      .send(EngineMsg::ListPlayers { resp: tx })
      .await
      .is_err()
    {
      return Vec::new();
    }
    rx.await.unwrap_or_default()
  }
}

// delay: 2**attempt seconds, capped at 60s
fn reconnect_delay(attempt: u32) -> Duration {
  Duration::from_secs((1u64 << attempt.min(6)).min(60))
}
