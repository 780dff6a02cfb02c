use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::log;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    tracked_players: Vec<u64>,
    #[serde(default)]
    known_games: Vec<u64>,
}

/// Tracked players plus the set of games currently believed active.
///
/// Every mutation flushes the full state to the backing file when one is
/// configured. A failed flush is logged and the in-memory state remains
/// authoritative for the running process.
#[derive(Debug)]
pub struct TrackedStore {
    path: Option<PathBuf>,
    players: Vec<u64>,
    games: HashSet<u64>,
}

impl TrackedStore {
    pub fn load(path: Option<PathBuf>) -> Self {
        let mut store = Self {
            path,
            players: Vec::new(),
            games: HashSet::new(),
        };

        let Some(path) = store.path.clone() else {
            return store;
        };
        if !path.exists() {
            return store;
        }

        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<PersistedState>(&raw) {
                Ok(state) => {
                    for id in state.tracked_players {
                        if !store.players.contains(&id) {
                            store.players.push(id);
                        }
                    }
                    store.games = state.known_games.into_iter().collect();
                    log::success(format!(
                        "Loaded state: {} tracked player(s), {} known game(s)",
                        store.players.len(),
                        store.games.len()
                    ));
                }
                Err(e) => log::warn(format!(
                    "State file {} is corrupt, starting empty: {}",
                    path.display(),
                    e
                )),
            },
            Err(e) => log::warn(format!(
                "Failed to read state file {}, starting empty: {}",
                path.display(),
                e
            )),
        }

        store
    }

    pub fn add_player(&mut self, id: u64) -> bool {
        if self.players.contains(&id) {
            return false;
        }
        self.players.push(id);
        self.save();
        true
    }

    pub fn remove_player(&mut self, id: u64) -> bool {
        let before = self.players.len();
        self.players.retain(|p| *p != id);
        if self.players.len() == before {
            return false;
        }
        self.save();
        true
    }

    pub fn is_player_tracked(&self, id: u64) -> bool {
        self.players.contains(&id)
    }

    /// Insertion order, stable for listing.
    pub fn list_players(&self) -> Vec<u64> {
        self.players.clone()
    }

    pub fn mark_game_active(&mut self, game_id: u64) {
        if self.games.insert(game_id) {
            self.save();
        }
    }

    pub fn mark_game_ended(&mut self, game_id: u64) {
        if self.games.remove(&game_id) {
            self.save();
        }
    }

    pub fn is_game_active(&self, game_id: u64) -> bool {
        self.games.contains(&game_id)
    }

    pub fn list_active_games(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.games.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let state = PersistedState {
            tracked_players: self.players.clone(),
            known_games: self.list_active_games(),
        };

        let result = serde_json::to_string_pretty(&state)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(Into::into));

        if let Err(e) = result {
            log::error(format!("State flush to {} failed: {}", path.display(), e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ogs-watch-store-{}-{}.json", std::process::id(), name))
    }

    #[test]
    fn survives_restart_on_same_backing_file() {
        let path = temp_path("restart");

        let mut store = TrackedStore::load(Some(path.clone()));
        store.add_player(100);
        store.add_player(200);
        store.mark_game_active(55);
        store.mark_game_active(77);
        store.mark_game_ended(77);

        let reloaded = TrackedStore::load(Some(path.clone()));
        assert_eq!(reloaded.list_players(), vec![100, 200]);
        assert_eq!(reloaded.list_active_games(), vec![55]);
        assert!(reloaded.is_game_active(55));
        assert!(!reloaded.is_game_active(77));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn corrupt_state_file_falls_back_to_empty() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();

        let store = TrackedStore::load(Some(path.clone()));
        assert!(store.list_players().is_empty());
        assert!(store.list_active_games().is_empty());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn memory_only_store_mutates_without_a_file() {
        let mut store = TrackedStore::load(None);
        assert!(store.add_player(1));
        assert!(!store.add_player(1));
        store.mark_game_active(9);
        assert!(store.is_game_active(9));
        assert!(store.remove_player(1));
        assert!(!store.remove_player(1));
    }

    #[test]
    fn player_listing_keeps_insertion_order() {
        let mut store = TrackedStore::load(None);
        store.add_player(300);
        store.add_player(100);
        store.add_player(200);
        assert_eq!(store.list_players(), vec![300, 100, 200]);
    }
}
