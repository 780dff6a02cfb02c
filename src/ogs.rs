use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serenity::builder::{CreateEmbed, CreateEmbedFooter};
use serenity::model::colour::Colour;
use tokio::time::Duration;

use crate::engine::NotificationIntent;
use crate::models::{GameRecord, GamesResponse, PlayerRef};

pub struct OgsClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl OgsClient {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    /// All games of a player, finished ones included.
    pub async fn fetch_games(&self, player_id: u64) -> Result<Vec<GameRecord>> {
        let url = format!("{}/players/{}/games", self.base_url, player_id);
        self.fetch_results(&url).await
    }

    /// Only the games currently in progress.
    pub async fn fetch_active_games(&self, player_id: u64) -> Result<Vec<GameRecord>> {
        let url = format!("{}/players/{}/games/active/", self.base_url, player_id);
        self.fetch_results(&url).await
    }

    async fn fetch_results(&self, url: &str) -> Result<Vec<GameRecord>> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response: GamesResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.results)
    }
}

pub fn game_url(site_url: &str, game_id: u64) -> String {
    format!("{}/game/{}", site_url, game_id)
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn create_embed(intent: &NotificationIntent, site_url: &str) -> CreateEmbed {
    let embed = CreateEmbed::new().color(get_intent_color(intent));

    match intent {
        NotificationIntent::GameStarted {
            game_id,
            white,
            black,
        } => players_fields(embed, white, black)
            .title("Game started")
            .description(format!("[Watch on OGS]({})", game_url(site_url, *game_id))),
        NotificationIntent::GameEnded {
            game_id,
            white,
            black,
            ended_at,
            outcome,
        } => with_ended_footer(
            players_fields(embed, white, black)
                .title("Game ended")
                .description(format!("[View on OGS]({})", game_url(site_url, *game_id)))
                .field("Result", outcome_label(outcome), false),
            ended_at,
        ),
        NotificationIntent::GameFound {
            game_id,
            white,
            black,
            ended_at,
            outcome,
        } => with_ended_footer(
            players_fields(embed, white, black)
                .title("New game found today")
                .description(format!("[View on OGS]({})", game_url(site_url, *game_id)))
                .field("Result", outcome_label(outcome), false),
            ended_at,
        ),
    }
}

fn players_fields(embed: CreateEmbed, white: &PlayerRef, black: &PlayerRef) -> CreateEmbed {
    embed
        .field("White", white.label(), true)
        .field("Black", black.label(), true)
}

fn with_ended_footer(embed: CreateEmbed, ended_at: &Option<DateTime<Utc>>) -> CreateEmbed {
    match ended_at {
        Some(time) => embed.footer(CreateEmbedFooter::new(format_time(time))),
        None => embed,
    }
}

fn outcome_label(outcome: &Option<String>) -> String {
    outcome.clone().unwrap_or_else(|| "unknown".to_string())
}

fn get_intent_color(intent: &NotificationIntent) -> Colour {
    match intent {
        NotificationIntent::GameStarted { .. } => Colour::from_rgb(34, 197, 94), // Green
        NotificationIntent::GameEnded { .. } => Colour::from_rgb(239, 68, 68),   // Red
        NotificationIntent::GameFound { .. } => Colour::from_rgb(59, 130, 246),  // Blue
    }
}
