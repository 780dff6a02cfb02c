use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerRef {
    pub id: u64,
    #[serde(default)]
    pub username: Option<String>,
}

impl PlayerRef {
    pub fn label(&self) -> String {
        match &self.username {
            Some(name) => format!("{} ({})", name, self.id),
            None => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GamePlayers {
    pub white: PlayerRef,
    pub black: PlayerRef,
}

/// One game as reported by the REST API. `ended` and `outcome` stay empty
/// while the game is in progress.
#[derive(Debug, Clone, Deserialize)]
pub struct GameRecord {
    pub id: u64,
    pub players: GamePlayers,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GamesResponse {
    #[serde(default)]
    pub results: Vec<GameRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEventKind {
    Started,
    Ended,
}

/// Canonical event shape both sources normalize into before it reaches the
/// reconciliation engine.
#[derive(Debug, Clone)]
pub struct GameEvent {
    pub game_id: u64,
    pub kind: GameEventKind,
    pub white: PlayerRef,
    pub black: PlayerRef,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
}

impl GameEvent {
    pub fn started_from(record: &GameRecord) -> Self {
        Self {
            game_id: record.id,
            kind: GameEventKind::Started,
            white: record.players.white.clone(),
            black: record.players.black.clone(),
            ended_at: None,
            outcome: None,
        }
    }

    pub fn ended_from(record: &GameRecord) -> Self {
        Self {
            game_id: record.id,
            kind: GameEventKind::Ended,
            white: record.players.white.clone(),
            black: record.players.black.clone(),
            ended_at: record.ended,
            outcome: record.outcome.clone(),
        }
    }
}

/// Messages on the realtime channel carry no schema guarantee. Anything that
/// is not one of the known game lifecycle shapes lands in `Unrecognized`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    GameStarted { game: RealtimeGame },
    GameEnded { game: RealtimeGame },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeGame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub players: Option<GamePlayers>,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl RealtimeMessage {
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or(RealtimeMessage::Unrecognized)
    }

    /// Normalize into a canonical event. Partial payloads (missing game id
    /// or player identifiers) yield `None` and are dropped by the caller.
    pub fn normalize(self) -> Option<GameEvent> {
        let (kind, game) = match self {
            RealtimeMessage::GameStarted { game } => (GameEventKind::Started, game),
            RealtimeMessage::GameEnded { game } => (GameEventKind::Ended, game),
            RealtimeMessage::Unrecognized => return None,
        };

        let game_id = game.id?;
        let players = game.players?;

        Some(GameEvent {
            game_id,
            kind,
            white: players.white,
            black: players.black,
            ended_at: game.ended,
            outcome: game.outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_game_ended_payload() {
        let text = r#"{"type":"game_ended","game":{"id":55,"players":{"white":{"id":100,"username":"a"},"black":{"id":200,"username":"b"}}}}"#;

        let event = RealtimeMessage::parse(text).normalize().expect("event");
        assert_eq!(event.game_id, 55);
        assert_eq!(event.kind, GameEventKind::Ended);
        assert_eq!(event.white.id, 100);
        assert_eq!(event.black.id, 200);
        assert_eq!(event.black.username.as_deref(), Some("b"));
    }

    #[test]
    fn garbage_is_unrecognized() {
        assert!(RealtimeMessage::parse("not json at all").normalize().is_none());
        assert!(RealtimeMessage::parse("{\"foo\": 1}").normalize().is_none());
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let text = r#"{"type":"chat","game":{"id":7}}"#;
        assert!(RealtimeMessage::parse(text).normalize().is_none());
    }

    #[test]
    fn partial_game_payload_yields_no_event() {
        // no players
        let text = r#"{"type":"game_started","game":{"id":9}}"#;
        assert!(RealtimeMessage::parse(text).normalize().is_none());

        // no id
        let text = r#"{"type":"game_started","game":{"players":{"white":{"id":1},"black":{"id":2}}}}"#;
        assert!(RealtimeMessage::parse(text).normalize().is_none());
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let text = r#"{"type":"game_started","extra":true,"game":{"id":3,"phase":"play","players":{"white":{"id":1,"rank":9},"black":{"id":2}}}}"#;

        let event = RealtimeMessage::parse(text).normalize().expect("event");
        assert_eq!(event.kind, GameEventKind::Started);
        assert_eq!(event.game_id, 3);
    }
}
