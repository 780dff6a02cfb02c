use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, sleep};

use crate::config::Config;
use crate::engine::EngineMsg;
use crate::log;
use crate::models::{GameEvent, GameRecord};
use crate::ogs::OgsClient;

pub struct PollingService {
  config: Arc<Config>,
  client: Arc<OgsClient>,
  engine_tx: mpsc::Sender<EngineMsg>,
}

impl PollingService {
  pub fn new(config: Arc<Config>, client: Arc<OgsClient>, engine_tx: mpsc::Sender<EngineMsg>) -> Self {
    Self {
      config,
      client,
      engine_tx,
    }
  }

  pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
    log::info(format!(
      "Polling every {}s ({} mode)",
      self.config.ogs.poll_interval,
      if self.config.ogs.realtime { "cross-check" } else { "poll-diff" }
    ));

    loop {
      self.poll_cycle().await;

      tokio::select! {
        _ = shutdown.changed() => break,
        _ = sleep(Duration::from_secs(self.config.ogs.poll_interval)) => {}
      }
    }

    log::info("Polling stopped.");
  }

  async fn poll_cycle(&self) {
    let players = self.list_players().await;
    if players.is_empty() {
      log::warn("No tracked players, skipping poll cycle.");
      return;
    }

    log::info(format!("Polling {} tracked player(s)...", players.len()));

    for (idx, player_id) in players.iter().enumerate() {
      if idx > 0 {
        sleep(Duration::from_millis(self.config.ogs.request_delay_ms)).await;
      }

      if self.config.ogs.realtime {
        self.check_active(*player_id).await;
      }
      self.check_finished(*player_id).await;
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

  async fn check_active(&self, player_id: u64) {
    match self.client.fetch_active_games(player_id).await {
      Ok(games) => {
        for game in &games {
          self.send(EngineMsg::Event(GameEvent::started_from(game))).await;
        }
      }
      Err(e) => self.log_fetch_failure(player_id, "active games", &e),
    }
  }

  async fn check_finished(&self, player_id: u64) {
    let games = match self.client.fetch_games(player_id).await {
      Ok(games) => games,
      Err(e) => {
        self.log_fetch_failure(player_id, "games", &e);
        return;
      }
    };

    let now = Local::now();
    for game in games.into_iter().filter(|g| ended_same_local_day(g, &now)) {
      if self.config.ogs.realtime {
        self.send(EngineMsg::Event(GameEvent::ended_from(&game))).await;
      } else {
        self.send(EngineMsg::Finished(game)).await;
      }
    }
  }

  async fn send(&self, msg: EngineMsg) {
    if self.engine_tx.send(msg).await.is_err() {
      log::warn("Engine channel closed, dropping poll observation.");
    }
  }

  // A failed fetch yields nothing for this player this cycle; the next
  // scheduled cycle retries naturally.
  fn log_fetch_failure(&self, player_id: u64, what: &str, e: &anyhow::Error) {
    let status = e
      .downcast_ref::<reqwest::Error>()
      .and_then(|err| err.status());

    match status {
      Some(status) if status.is_server_error() => log::warn(format!(
        "OGS returned {} for player {}, skipping...",
        status.as_u16(),
        player_id
      )),
      Some(status) => log::error(format!(
        "OGS error fetching {} for player {}: {}",
        what, player_id, status
      )),
      None => log::error(format!(
        "Failed to fetch {} for player {}: {}",
        what, player_id, e
      )),
    }
  }
}

// Local-clock day boundary. A remote timestamp near midnight under timezone
// skew can land in the wrong day; accepted limitation of the diff mode.
fn ended_same_local_day(game: &GameRecord, now: &DateTime<Local>) -> bool {
  match game.ended {
    Some(ended) => ended.with_timezone(&now.timezone()).date_naive() == now.date_naive(),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{GamePlayers, PlayerRef};
  use chrono::{TimeZone, Utc};

  fn game_ended_at(ended: Option<DateTime<Utc>>) -> GameRecord {
    GameRecord {
      id: 1,
      players: GamePlayers {
        white: PlayerRef {
          id: 100,
          username: None,
        },
        black: PlayerRef {
          id: 200,
          username: None,
        },
      },
      ended,
      outcome: None,
    }
  }

  #[test]
  fn game_ended_at_the_reference_instant_is_same_day() {
    let instant = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
    let now = instant.with_timezone(&Local);
    assert!(ended_same_local_day(&game_ended_at(Some(instant)), &now));
  }

  #[test]
  fn game_ended_days_ago_is_filtered() {
    let now = Utc
      .with_ymd_and_hms(2024, 3, 5, 12, 0, 0)
      .unwrap()
      .with_timezone(&Local);
    let ended = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
    assert!(!ended_same_local_day(&game_ended_at(Some(ended)), &now));
  }

  #[test]
  fn game_still_running_is_filtered() {
    let now = Local::now();
    assert!(!ended_same_local_day(&game_ended_at(None), &now));
  }
}
