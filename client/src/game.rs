//! Client-side game state: prediction, ghost correction, and snapshot merge.
//!
//! The locally-controlled player is simulated here every frame with the
//! same integration routine the server runs, so input feels immediate. The
//! server's view of that player lands in the ghost instead of the player
//! itself, which makes prediction error visible without rubber-banding the
//! player around. Everything else is a mirror rebuilt from snapshots.

use log::debug;
use shared::{
    decode_state, timestamp, Character, ControlMode, EntityError, Gem, ProtocolError, Registry,
    SpriteData, Vec2, TICK_RATE,
};
use std::collections::HashMap;

/// Assumed snapshot cadence for remote interpolation, in seconds.
const SNAPSHOT_INTERVAL: f64 = 1.0 / TICK_RATE as f64;

/// Two-point interpolation window over a remote character's reported
/// positions.
#[derive(Debug, Clone, Copy)]
struct RemoteTrack {
    prev: Vec2,
    curr: Vec2,
    updated_at: f64,
}

pub struct ClientGame {
    /// The locally-predicted player.
    pub player: Character,
    /// The server's echo of the player.
    pub ghost: Character,
    /// Mirror of everything else the server tracks.
    pub registry: Registry,
    pub winner: Option<String>,
    tracks: HashMap<String, RemoteTrack>,
}

impl ClientGame {
    /// Builds the player and its ghost from the server-assigned record in
    /// the handshake reply.
    pub fn new(player_state: &SpriteData) -> Result<Self, EntityError> {
        let player = Character::from_data(player_state, ControlMode::LocalControlled)?;
        let ghost = Character::from_data(player_state, ControlMode::RemoteEcho)?;
        Ok(Self {
            player,
            ghost,
            registry: Registry::new(),
            winner: None,
            tracks: HashMap::new(),
        })
    }

    /// Locally predicts the player's movement for this frame. Same routine
    /// as the server, so the prediction only drifts by network timing.
    pub fn predict(&mut self, thrust: Vec2, dt: f32) {
        self.player.integrate(thrust, dt);
    }

    /// The per-tick intent report: thrust and predicted velocity, no score.
    pub fn report(&self) -> SpriteData {
        self.player.report_intent()
    }

    /// Merges one snapshot string into local state. An empty string is the
    /// server's warm-up signal and merges nothing.
    pub fn merge_state(&mut self, state: &str) -> Result<(), ProtocolError> {
        if state.is_empty() {
            return Ok(());
        }
        let now = timestamp();
        let group = decode_state(state)?;
        for data in &group.data {
            self.merge_record(data, now)?;
        }
        Ok(())
    }

    /// Routes a single record: own id to the ghost (plus score to the
    /// player), known ids in place, unknown ids through entity discovery.
    fn merge_record(&mut self, data: &SpriteData, now: f64) -> Result<(), EntityError> {
        let id = data.sprite_id();
        if id == self.player.sprite_id {
            self.ghost.apply(data)?;
            // the player's position belongs to prediction; only the
            // authoritative score comes through
            self.player.apply(data)?;
            return Ok(());
        }

        match data {
            SpriteData::Character { .. } => {
                if let Some(character) = self.registry.characters.get_mut(id) {
                    let from = character.pos;
                    character.apply(data)?;
                    self.tracks.insert(
                        id.to_string(),
                        RemoteTrack {
                            prev: from,
                            curr: character.pos,
                            updated_at: now,
                        },
                    );
                } else {
                    let character = Character::from_data(data, ControlMode::RemoteOther)?;
                    debug!("Discovered character {} ({})", character.username, id);
                    self.tracks.insert(
                        id.to_string(),
                        RemoteTrack {
                            prev: character.pos,
                            curr: character.pos,
                            updated_at: now,
                        },
                    );
                    self.registry.insert_character(character);
                }
            }
            SpriteData::Gem { .. } => {
                if let Some(gem) = self.registry.gems.get_mut(id) {
                    gem.apply(data, now)?;
                } else {
                    debug!("Discovered gem {}", id);
                    self.registry.insert_gem(Gem::from_data(data, now)?);
                }
            }
        }
        Ok(())
    }

    /// Where to draw a remote character right now: a lerp between its last
    /// two reported positions, trailing the newest report by up to one
    /// snapshot interval.
    pub fn interpolated_pos(&self, sprite_id: &str, now: f64) -> Option<Vec2> {
        let track = self.tracks.get(sprite_id)?;
        let alpha = ((now - track.updated_at) / SNAPSHOT_INTERVAL).clamp(0.0, 1.0) as f32;
        Some(Vec2::new(
            track.prev.x + (track.curr.x - track.prev.x) * alpha,
            track.prev.y + (track.curr.y - track.prev.y) * alpha,
        ))
    }

    /// Drops gems whose death flash has finished. There is no removal pass
    /// keyed on absence from a snapshot; characters are never removed.
    pub fn prune(&mut self, now: f64) {
        self.registry.gems.retain(|_, gem| !gem.expired(now));
    }

    /// Resolves a winner id to a known character and records it.
    pub fn resolve_winner(&mut self, winner_id: &str) -> Result<&Character, ProtocolError> {
        if winner_id != self.player.sprite_id && !self.registry.characters.contains_key(winner_id)
        {
            return Err(ProtocolError::BadWinner(winner_id.to_string()));
        }
        self.winner = Some(winner_id.to_string());
        if winner_id == self.player.sprite_id {
            Ok(&self.player)
        } else {
            Ok(&self.registry.characters[winner_id])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::GemPhase;

    fn player_record(id: &str, pos: Vec2, score: u32) -> SpriteData {
        let mut character = Character::new(
            id.to_string(),
            format!("user-{id}"),
            pos,
            ControlMode::RemoteOther,
        );
        character.score = score;
        character.report()
    }

    fn snapshot_of(records: Vec<SpriteData>) -> String {
        serde_json::to_string(&shared::SpriteDataGroup { data: records }).unwrap()
    }

    fn new_game() -> ClientGame {
        ClientGame::new(&player_record("me", Vec2::new(100.0, 100.0), 0)).unwrap()
    }

    #[test]
    fn test_empty_state_is_noop() {
        let mut game = new_game();
        game.merge_state("").unwrap();
        assert!(game.registry.is_empty());
    }

    #[test]
    fn test_own_record_routes_to_ghost() {
        let mut game = new_game();
        // the player has predicted ahead of the server
        game.player.pos = Vec2::new(150.0, 150.0);

        let state = snapshot_of(vec![player_record("me", Vec2::new(120.0, 120.0), 2)]);
        game.merge_state(&state).unwrap();

        // the ghost took the reported position, the player kept its own
        assert_eq!(game.ghost.pos, Vec2::new(120.0, 120.0));
        assert_eq!(game.player.pos, Vec2::new(150.0, 150.0));
        // but the score is authority-only and comes through
        assert_eq!(game.player.score, 2);
        assert!(game.registry.characters.is_empty());
    }

    #[test]
    fn test_unknown_entities_discovered() {
        let mut game = new_game();
        let gem = Gem::new("g1".to_string(), Vec2::new(50.0, 60.0));
        let state = snapshot_of(vec![
            player_record("other", Vec2::new(300.0, 300.0), 1),
            gem.report(),
        ]);
        game.merge_state(&state).unwrap();

        assert_eq!(game.registry.characters.len(), 1);
        assert_eq!(game.registry.gems.len(), 1);
        assert_eq!(
            game.registry.characters["other"].control,
            ControlMode::RemoteOther
        );
    }

    #[test]
    fn test_known_entities_update_in_place() {
        let mut game = new_game();
        let state = snapshot_of(vec![player_record("other", Vec2::new(300.0, 300.0), 0)]);
        game.merge_state(&state).unwrap();

        let state = snapshot_of(vec![player_record("other", Vec2::new(310.0, 290.0), 1)]);
        game.merge_state(&state).unwrap();

        assert_eq!(game.registry.characters.len(), 1);
        let other = &game.registry.characters["other"];
        assert_eq!(other.pos, Vec2::new(310.0, 290.0));
        assert_eq!(other.score, 1);
    }

    #[test]
    fn test_remote_interpolation_spans_reports() {
        let mut game = new_game();
        let state = snapshot_of(vec![player_record("other", Vec2::new(100.0, 100.0), 0)]);
        game.merge_state(&state).unwrap();
        let state = snapshot_of(vec![player_record("other", Vec2::new(200.0, 100.0), 0)]);
        game.merge_state(&state).unwrap();

        // far in the future the lerp has fully reached the newest report
        let settled = game
            .interpolated_pos("other", timestamp() + 10.0)
            .unwrap();
        assert_eq!(settled, Vec2::new(200.0, 100.0));
    }

    #[test]
    fn test_dead_gem_pruned_after_flash() {
        let mut game = new_game();
        let mut gem = Gem::new("g1".to_string(), Vec2::new(50.0, 60.0));
        game.merge_state(&snapshot_of(vec![gem.report()])).unwrap();

        gem.phase = GemPhase::Dead { since: 0.0 };
        game.merge_state(&snapshot_of(vec![gem.report()])).unwrap();
        assert!(game.registry.gems["g1"].is_dead());

        // the flash clock started at receipt, so it is not pruned yet
        let received = timestamp();
        game.prune(received);
        assert!(game.registry.gems.contains_key("g1"));

        game.prune(received + shared::GEM_LINGER + 0.001);
        assert!(game.registry.gems.is_empty());
    }

    #[test]
    fn test_winner_resolution() {
        let mut game = new_game();
        let state = snapshot_of(vec![player_record("other", Vec2::new(300.0, 300.0), 5)]);
        game.merge_state(&state).unwrap();

        let winner = game.resolve_winner("other").unwrap();
        assert_eq!(winner.score, 5);
        assert_eq!(game.winner.as_deref(), Some("other"));
    }

    #[test]
    fn test_unresolvable_winner_is_error() {
        let mut game = new_game();
        assert!(matches!(
            game.resolve_winner("nobody"),
            Err(ProtocolError::BadWinner(_))
        ));
        assert_eq!(game.winner, None);
    }

    #[test]
    fn test_prediction_moves_player_only() {
        let mut game = new_game();
        let ghost_before = game.ghost.pos;
        game.predict(Vec2::new(1.0, 0.0), 1.0 / 60.0);
        game.predict(Vec2::new(1.0, 0.0), 1.0 / 60.0);
        assert!(game.player.pos.x > 100.0);
        assert_eq!(game.ghost.pos, ghost_before);
    }
}
