use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::prelude::Context;
use tokio::sync::{mpsc, oneshot, watch};

use crate::discord::DiscordMessenger;
use crate::log;
use crate::models::{GameEvent, GameEventKind, GameRecord, PlayerRef};
use crate::ogs;
use crate::store::TrackedStore;

/// A decided, not-yet-delivered notification. Delivery is best-effort and
/// at-most-once; the decision itself is exactly-once.
#[derive(Debug, Clone)]
pub enum NotificationIntent {
    GameStarted {
        game_id: u64,
        white: PlayerRef,
        black: PlayerRef,
    },
    GameEnded {
        game_id: u64,
        white: PlayerRef,
        black: PlayerRef,
        ended_at: Option<DateTime<Utc>>,
        outcome: Option<String>,
    },
    /// Poll-diff observation: a finished game seen for the first time, with
    /// no prior started signal.
    GameFound {
        game_id: u64,
        white: PlayerRef,
        black: PlayerRef,
        ended_at: Option<DateTime<Utc>>,
        outcome: Option<String>,
    },
}

impl NotificationIntent {
    pub fn game_id(&self) -> u64 {
        match self {
            NotificationIntent::GameStarted { game_id, .. }
            | NotificationIntent::GameEnded { game_id, .. }
            | NotificationIntent::GameFound { game_id, .. } => *game_id,
        }
    }
}

/// Everything the engine consumes travels through one channel so state
/// transitions never interleave.
#[derive(Debug)]
pub enum EngineMsg {
    /// Normalized observation from either source.
    Event(GameEvent),
    /// Poll-diff observation of a finished game (no-push variant).
    Finished(GameRecord),
    /// Resynchronization seed: currently-active games from a full poll.
    Seed(Vec<GameRecord>),
    AddPlayer {
        id: u64,
        resp: oneshot::Sender<bool>,
    },
    ListPlayers {
        resp: oneshot::Sender<Vec<u64>>,
    },
}

pub struct ReconcileEngine {
    store: TrackedStore,
    /// Games already announced by the poll-diff path. Append-only for the
    /// process lifetime.
    announced: HashSet<u64>,
}

impl ReconcileEngine {
    pub fn new(store: TrackedStore) -> Self {
        Self {
            store,
            announced: HashSet::new(),
        }
    }

    fn is_tracked_pair(&self, white: &PlayerRef, black: &PlayerRef) -> bool {
        self.store.is_player_tracked(white.id) && self.store.is_player_tracked(black.id)
    }

    /// Apply one normalized event. Returns the notification intent when the
    /// event causes a real state transition, `None` for everything filtered
    /// or already known.
    pub fn apply(&mut self, event: &GameEvent) -> Option<NotificationIntent> {
        if !self.is_tracked_pair(&event.white, &event.black) {
            return None;
        }

        match event.kind {
            GameEventKind::Started => {
                if self.store.is_game_active(event.game_id) {
                    return None;
                }
                self.store.mark_game_active(event.game_id);
                Some(NotificationIntent::GameStarted {
                    game_id: event.game_id,
                    white: event.white.clone(),
                    black: event.black.clone(),
                })
            }
            GameEventKind::Ended => {
                if !self.store.is_game_active(event.game_id) {
                    return None;
                }
                self.store.mark_game_ended(event.game_id);
                Some(NotificationIntent::GameEnded {
                    game_id: event.game_id,
                    white: event.white.clone(),
                    black: event.black.clone(),
                    ended_at: event.ended_at,
                    outcome: event.outcome.clone(),
                })
            }
        }
    }

    /// Seed the known-active set from a full poll. Emits nothing: initial
    /// state is not news. Additive only, so a partial poll never causes a
    /// game to be considered ended.
    pub fn seed(&mut self, games: &[GameRecord]) -> usize {
        let mut added = 0;
        for game in games {
            if !self.is_tracked_pair(&game.players.white, &game.players.black) {
                continue;
            }
            if !self.store.is_game_active(game.id) {
                self.store.mark_game_active(game.id);
                added += 1;
            }
        }
        added
    }

    /// Poll-diff path: announce a finished game at most once per process
    /// lifetime, guarded by the append-only announced set.
    pub fn observe_finished(&mut self, game: &GameRecord) -> Option<NotificationIntent> {
        if !self.is_tracked_pair(&game.players.white, &game.players.black) {
            return None;
        }
        if !self.announced.insert(game.id) {
            return None;
        }
        Some(NotificationIntent::GameFound {
            game_id: game.id,
            white: game.players.white.clone(),
            black: game.players.black.clone(),
            ended_at: game.ended,
            outcome: game.outcome.clone(),
        })
    }

    pub fn add_player(&mut self, id: u64) -> bool {
        self.store.add_player(id)
    }

    pub fn list_players(&self) -> Vec<u64> {
        self.store.list_players()
    }

    pub fn list_active_games(&self) -> Vec<u64> {
        self.store.list_active_games()
    }

    /// Single consumer loop: the only place store mutations happen.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<EngineMsg>,
        ctx: Arc<Context>,
        messenger: DiscordMessenger,
        site_url: String,
        mut shutdown: watch::Receiver<bool>,
    ) {
        log::info("Reconciliation engine started.");

        loop {
            let msg = tokio::select! {
                _ = shutdown.changed() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            match msg {
                EngineMsg::Event(event) => {
                    if let Some(intent) = self.apply(&event) {
                        self.deliver(&ctx, &messenger, &site_url, intent).await;
                    }
                }
                EngineMsg::Finished(game) => {
                    if let Some(intent) = self.observe_finished(&game) {
                        self.deliver(&ctx, &messenger, &site_url, intent).await;
                    }
                }
                EngineMsg::Seed(games) => {
                    let added = self.seed(&games);
                    log::info(format!(
                        "Resync: {} game(s) reported active, {} newly seeded, {} known active",
                        games.len(),
                        added,
                        self.list_active_games().len()
                    ));
                }
                EngineMsg::AddPlayer { id, resp } => {
                    let _ = resp.send(self.add_player(id));
                }
                EngineMsg::ListPlayers { resp } => {
                    let _ = resp.send(self.list_players());
                }
            }
        }

        log::info("Reconciliation engine stopped.");
    }

    async fn deliver(
        &self,
        ctx: &Context,
        messenger: &DiscordMessenger,
        site_url: &str,
        intent: NotificationIntent,
    ) {
        let game_id = intent.game_id();
        let embed = ogs::create_embed(&intent, site_url);

        // At-most-once: a failed send is dropped, never queued.
        if let Err(e) = messenger.send_embed(ctx, embed).await {
            log::error(format!("Dropped notification for game {}: {}", game_id, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GamePlayers;

    fn engine_with_players(players: &[u64]) -> ReconcileEngine {
        let mut store = TrackedStore::load(None);
        for id in players {
            store.add_player(*id);
        }
        ReconcileEngine::new(store)
    }

    fn player(id: u64) -> PlayerRef {
        PlayerRef { id, username: None }
    }

    fn started(game_id: u64, white: u64, black: u64) -> GameEvent {
        GameEvent {
            game_id,
            kind: GameEventKind::Started,
            white: player(white),
            black: player(black),
            ended_at: None,
            outcome: None,
        }
    }

    fn ended(game_id: u64, white: u64, black: u64) -> GameEvent {
        GameEvent {
            game_id,
            kind: GameEventKind::Ended,
            white: player(white),
            black: player(black),
            ended_at: None,
            outcome: Some("W+2.5".to_string()),
        }
    }

    fn record(game_id: u64, white: u64, black: u64) -> GameRecord {
        GameRecord {
            id: game_id,
            players: GamePlayers {
                white: player(white),
                black: player(black),
            },
            ended: None,
            outcome: None,
        }
    }

    #[test]
    fn started_is_idempotent() {
        let mut engine = engine_with_players(&[100, 200]);

        let mut intents = 0;
        for _ in 0..4 {
            if engine.apply(&started(55, 100, 200)).is_some() {
                intents += 1;
            }
        }

        assert_eq!(intents, 1);
        assert_eq!(engine.list_active_games(), vec![55]);
    }

    #[test]
    fn ended_is_idempotent() {
        let mut engine = engine_with_players(&[100, 200]);
        engine.apply(&started(55, 100, 200));

        let mut intents = 0;
        for _ in 0..3 {
            if engine.apply(&ended(55, 100, 200)).is_some() {
                intents += 1;
            }
        }

        assert_eq!(intents, 1);
        assert!(engine.list_active_games().is_empty());
    }

    #[test]
    fn ended_without_observed_start_is_discarded() {
        let mut engine = engine_with_players(&[100, 200]);
        assert!(engine.apply(&ended(55, 100, 200)).is_none());
        assert!(engine.list_active_games().is_empty());
    }

    #[test]
    fn event_order_does_not_matter() {
        let mut forward = engine_with_players(&[100, 200, 300]);
        let mut reverse = engine_with_players(&[100, 200, 300]);

        let a = started(1, 100, 200);
        let b = started(2, 200, 300);

        let forward_intents = [forward.apply(&a), forward.apply(&b)]
            .iter()
            .filter(|i| i.is_some())
            .count();
        let reverse_intents = [reverse.apply(&b), reverse.apply(&a)]
            .iter()
            .filter(|i| i.is_some())
            .count();

        assert_eq!(forward_intents, 2);
        assert_eq!(reverse_intents, 2);
        assert_eq!(forward.list_active_games(), reverse.list_active_games());
    }

    #[test]
    fn untracked_participant_is_filtered() {
        let mut engine = engine_with_players(&[100]);

        assert!(engine.apply(&started(55, 100, 999)).is_none());
        assert!(engine.apply(&started(56, 999, 100)).is_none());
        assert!(engine.list_active_games().is_empty());
    }

    #[test]
    fn seeding_emits_nothing_and_later_end_emits_once() {
        let mut engine = engine_with_players(&[100, 200, 300]);

        let added = engine.seed(&[record(1, 100, 200), record(2, 200, 300), record(3, 100, 300)]);
        assert_eq!(added, 3);
        assert_eq!(engine.list_active_games(), vec![1, 2, 3]);

        let intent = engine.apply(&ended(2, 200, 300)).expect("one ended intent");
        assert!(matches!(intent, NotificationIntent::GameEnded { game_id: 2, .. }));
        assert_eq!(engine.list_active_games(), vec![1, 3]);
    }

    #[test]
    fn seed_filters_untracked_pairs() {
        let mut engine = engine_with_players(&[100, 200]);
        let added = engine.seed(&[record(1, 100, 200), record(2, 100, 999)]);
        assert_eq!(added, 1);
        assert_eq!(engine.list_active_games(), vec![1]);
    }

    #[test]
    fn repeated_seed_is_idempotent() {
        let mut engine = engine_with_players(&[100, 200]);
        assert_eq!(engine.seed(&[record(1, 100, 200)]), 1);
        assert_eq!(engine.seed(&[record(1, 100, 200)]), 0);
    }

    // A poll seeds game 55 as already active, then a push event reports it
    // ended.
    #[test]
    fn seeded_game_ends_via_push_event() {
        let mut engine = engine_with_players(&[100, 200]);

        engine.seed(&[record(55, 100, 200)]);
        assert_eq!(engine.list_active_games(), vec![55]);

        let text = r#"{"type":"game_ended","game":{"id":55,"players":{"white":{"id":100,"username":"a"},"black":{"id":200,"username":"b"}}}}"#;
        let event = crate::models::RealtimeMessage::parse(text)
            .normalize()
            .expect("normalized event");

        let intent = engine.apply(&event).expect("ended intent");
        assert_eq!(intent.game_id(), 55);
        assert!(matches!(intent, NotificationIntent::GameEnded { .. }));
        assert!(engine.list_active_games().is_empty());

        // redundant delivery of the same push event
        assert!(engine.apply(&event).is_none());
    }

    #[test]
    fn finished_games_announce_once() {
        let mut engine = engine_with_players(&[100, 200]);
        let game = record(77, 100, 200);

        assert!(engine.observe_finished(&game).is_some());
        assert!(engine.observe_finished(&game).is_none());
    }

    #[test]
    fn finished_game_with_untracked_opponent_is_filtered() {
        let mut engine = engine_with_players(&[100]);
        assert!(engine.observe_finished(&record(77, 100, 999)).is_none());
    }
}
