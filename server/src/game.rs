//! Authoritative per-session simulation.

use log::{debug, info};
use shared::{Character, ControlMode, Gem, ProtocolError, Registry, SpriteData};
use uuid::Uuid;

/// Outcome of one simulation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The report referenced an unregistered sprite and was dropped.
    Ignored,
    /// Normal tick.
    Running,
    /// The last gem is gone; the session is over.
    Won { winner: String },
}

/// The authoritative game state for one session.
#[derive(Debug, Default)]
pub struct GameState {
    pub registry: Registry,
}

impl GameState {
    /// A fresh session with `gem_count` gems at random positions.
    pub fn new(gem_count: usize) -> Self {
        let mut registry = Registry::new();
        let mut rng = rand::thread_rng();
        for _ in 0..gem_count {
            let gem = Gem::new(Uuid::new_v4().to_string(), Gem::random_spawn(&mut rng));
            registry.insert_gem(gem);
        }
        Self { registry }
    }

    /// Joins a player: assigns an id, picks a spawn, registers the
    /// character, and returns its record for the handshake reply.
    pub fn add_player(&mut self, username: &str) -> SpriteData {
        let mut rng = rand::thread_rng();
        let character = Character::new(
            Uuid::new_v4().to_string(),
            username.to_string(),
            Character::random_spawn(&mut rng),
            ControlMode::RemoteOther,
        );
        info!("Added player {} ({})", username, character.sprite_id);
        let state = character.report();
        self.registry.insert_character(character);
        state
    }

    /// Runs one authoritative tick for an inbound report.
    ///
    /// `now` is wall-clock seconds, `dt` the (already capped) integration
    /// step. A report for an id that is not a registered character is
    /// dropped without touching the simulation — late packets from departed
    /// or not-yet-joined clients are expected, not fatal.
    pub fn step(
        &mut self,
        report: &SpriteData,
        now: f64,
        dt: f32,
    ) -> Result<StepResult, ProtocolError> {
        let report_id = report.sprite_id();
        if !self.registry.characters.contains_key(report_id) {
            debug!("Dropping report for unknown sprite {}", report_id);
            return Ok(StepResult::Ignored);
        }

        // deterministic iteration order for claims and tie-breaks
        let character_ids = self.registry.character_ids_sorted();

        for character in self.registry.characters.values_mut() {
            let thrust = character.thrust;
            character.integrate(thrust, dt);
        }

        let Registry { characters, gems } = &mut self.registry;
        for gem in gems.values_mut() {
            let overlapping: Vec<&str> = character_ids
                .iter()
                .filter(|id| characters[id.as_str()].overlaps_gem(gem))
                .map(String::as_str)
                .collect();

            if let Some(owner_id) = gem.advance(&overlapping, now) {
                if let Some(owner) = characters.get_mut(&owner_id) {
                    owner.increment_score();
                    info!("{} picked up a gem (score {})", owner.username, owner.score);
                }
            }
        }
        gems.retain(|_, gem| !gem.expired(now));

        // the report contributes intent only; position, velocity, and score
        // stay server-computed
        if let SpriteData::Character { thrust, .. } = report {
            if let Some(character) = characters.get_mut(report_id) {
                character.thrust = *thrust;
            }
        }

        if gems.is_empty() {
            let mut winner: Option<&Character> = None;
            for id in &character_ids {
                let candidate = &characters[id.as_str()];
                if winner.map_or(true, |best| candidate.score > best.score) {
                    winner = Some(candidate);
                }
            }
            return match winner {
                Some(character) => Ok(StepResult::Won {
                    winner: character.sprite_id.clone(),
                }),
                // gems ran out with nobody registered: a server logic bug
                None => Err(ProtocolError::BadWinner("<no characters>".to_string())),
            };
        }

        Ok(StepResult::Running)
    }
}
