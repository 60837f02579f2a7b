//! Entity model: characters, gems, and the per-session registry.
//!
//! The server owns the authoritative registry for each session; the client
//! rebuilds a mirror of it from snapshots. Characters and gems both expose
//! the same wire contract: `report()` serializes current state into a
//! [`SpriteData`] record, `apply()` mutates state from one, and `from_data()`
//! constructs a fresh entity from one (the discovery path for entities first
//! seen in a snapshot).

use crate::protocol::{SpriteData, SpriteDataGroup};
use crate::vec::Vec2;
use crate::{
    CHARACTER_SIZE, CHARACTER_THRUST, GEM_LINGER, GEM_SIZE, PICKUP_TIME, WORLD_HEIGHT, WORLD_WIDTH,
};
use rand::Rng;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised when wire records are applied to entities.
///
/// Both variants indicate state corruption and must never be papered over:
/// a mismatched id or a wrong-family record means the snapshot and the local
/// registry disagree about what exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntityError {
    #[error("mismatched sprite id (expected {expected}, got {got})")]
    IdentityMismatch { expected: String, got: String },
    #[error("sprite data does not describe this kind of entity")]
    InvalidSpriteData,
}

/// How a character is driven on this side of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Driven by local input and prediction; snapshots only update its score.
    LocalControlled,
    /// The ghost: a server echo of the local player. Accepts records carrying
    /// the player's id rather than enforcing an identity match.
    RemoteEcho,
    /// Driven entirely by reported state (server-side characters and mirrors
    /// of other players).
    RemoteOther,
}

/// A character controlled by a player.
#[derive(Debug, Clone)]
pub struct Character {
    pub sprite_id: String,
    pub username: String,
    pub pos: Vec2,
    /// Pixels per second.
    pub velocity: Vec2,
    /// Most recent raw thrust input. Direction only; magnitude is normalized
    /// away in [`Character::integrate`].
    pub thrust: Vec2,
    pub score: u32,
    pub control: ControlMode,
}

impl Character {
    pub fn new(sprite_id: String, username: String, pos: Vec2, control: ControlMode) -> Self {
        Self {
            sprite_id,
            username,
            pos,
            velocity: Vec2::ZERO,
            thrust: Vec2::ZERO,
            score: 0,
            control,
        }
    }

    /// A random position with the whole sprite on screen.
    pub fn random_spawn<R: Rng>(rng: &mut R) -> Vec2 {
        let half = CHARACTER_SIZE / 2.0;
        Vec2::new(
            rng.gen_range(half..=WORLD_WIDTH - half),
            rng.gen_range(half..=WORLD_HEIGHT - half),
        )
    }

    /// Axis-aligned bounds as (left, top, right, bottom). `pos` is the center.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        let half = CHARACTER_SIZE / 2.0;
        (
            self.pos.x - half,
            self.pos.y - half,
            self.pos.x + half,
            self.pos.y + half,
        )
    }

    /// AABB overlap test against a gem. Exact edge contact does not count.
    pub fn overlaps_gem(&self, gem: &Gem) -> bool {
        let (x1, y1, x2, y2) = self.bounds();
        let (x3, y3, x4, y4) = gem.bounds();
        !(x2 <= x3 || x4 <= x1 || y2 <= y3 || y4 <= y1)
    }

    /// Advances this character by one step of `dt` wall-clock seconds.
    ///
    /// `thrust` is normalized to a unit direction (the zero vector stays
    /// zero), scaled to the fixed acceleration, and integrated into velocity
    /// and position. Position is then clamped so no part of the sprite
    /// leaves the screen; any axis that was clamped has its velocity zeroed
    /// so momentum does not accumulate into a wall.
    pub fn integrate(&mut self, thrust: Vec2, dt: f32) {
        self.thrust = thrust;

        // normalize the direction so that moving diagonally is not faster
        let accel = thrust.normalize().scale(CHARACTER_THRUST);
        self.velocity = self.velocity.add(&accel.scale(dt));
        self.pos = self.pos.add(&self.velocity.scale(dt));

        let half = CHARACTER_SIZE / 2.0;
        let clamped_x = self.pos.x.clamp(half, WORLD_WIDTH - half);
        if clamped_x != self.pos.x {
            self.pos.x = clamped_x;
            self.velocity.x = 0.0;
        }
        let clamped_y = self.pos.y.clamp(half, WORLD_HEIGHT - half);
        if clamped_y != self.pos.y {
            self.pos.y = clamped_y;
            self.velocity.y = 0.0;
        }
    }

    /// Increase this character's score by 1. Only the authoritative side
    /// calls this; mirrors receive score through snapshots.
    pub fn increment_score(&mut self) {
        self.score += 1;
    }

    /// Full state record, as emitted in authoritative snapshots.
    pub fn report(&self) -> SpriteData {
        SpriteData::Character {
            sprite_id: self.sprite_id.clone(),
            pos: self.pos,
            username: self.username.clone(),
            velocity: self.velocity,
            thrust: self.thrust,
            score: Some(self.score),
        }
    }

    /// Intent record for the client's per-tick report: thrust and predicted
    /// velocity, never score.
    pub fn report_intent(&self) -> SpriteData {
        SpriteData::Character {
            sprite_id: self.sprite_id.clone(),
            pos: self.pos,
            username: self.username.clone(),
            velocity: self.velocity,
            thrust: self.thrust,
            score: None,
        }
    }

    /// Mutates this character from a wire record.
    ///
    /// What is applied depends on the control mode: a locally-controlled
    /// character takes only the score (its position belongs to prediction),
    /// while remote characters take the full reported state. The ghost skips
    /// the identity check; everyone else fails on a mismatched id.
    pub fn apply(&mut self, data: &SpriteData) -> Result<(), EntityError> {
        let SpriteData::Character {
            sprite_id,
            pos,
            velocity,
            thrust,
            score,
            ..
        } = data
        else {
            return Err(EntityError::InvalidSpriteData);
        };

        if self.control != ControlMode::RemoteEcho && *sprite_id != self.sprite_id {
            return Err(EntityError::IdentityMismatch {
                expected: self.sprite_id.clone(),
                got: sprite_id.clone(),
            });
        }

        match self.control {
            ControlMode::LocalControlled => {
                if let Some(score) = score {
                    self.score = *score;
                }
            }
            ControlMode::RemoteEcho | ControlMode::RemoteOther => {
                self.pos = *pos;
                self.velocity = *velocity;
                self.thrust = *thrust;
                if let Some(score) = score {
                    self.score = *score;
                }
            }
        }
        Ok(())
    }

    /// Construct a character from a wire record (entity discovery).
    pub fn from_data(data: &SpriteData, control: ControlMode) -> Result<Character, EntityError> {
        let SpriteData::Character {
            sprite_id,
            pos,
            username,
            ..
        } = data
        else {
            return Err(EntityError::InvalidSpriteData);
        };
        let mut character = Character::new(sprite_id.clone(), username.clone(), *pos, control);
        character.apply(data)?;
        Ok(character)
    }
}

/// Pickup state of a gem.
///
/// `Unclaimed -> Claiming -> Dead`, with `Claiming -> Unclaimed` when the
/// owner leaves before the pickup completes. At most one owner at a time;
/// the owner is a weak reference by id, never a pointer into the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum GemPhase {
    Unclaimed,
    Claiming { owner_id: String, since: f64 },
    Dead { since: f64 },
}

/// A gem for a character to pick up.
#[derive(Debug, Clone)]
pub struct Gem {
    pub sprite_id: String,
    pub pos: Vec2,
    pub phase: GemPhase,
}

impl Gem {
    pub fn new(sprite_id: String, pos: Vec2) -> Self {
        Self {
            sprite_id,
            pos,
            phase: GemPhase::Unclaimed,
        }
    }

    /// A random position with the whole sprite on screen.
    pub fn random_spawn<R: Rng>(rng: &mut R) -> Vec2 {
        let half = GEM_SIZE / 2.0;
        Vec2::new(
            rng.gen_range(half..=WORLD_WIDTH - half),
            rng.gen_range(half..=WORLD_HEIGHT - half),
        )
    }

    /// Axis-aligned bounds as (left, top, right, bottom). `pos` is the center.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        let half = GEM_SIZE / 2.0;
        (
            self.pos.x - half,
            self.pos.y - half,
            self.pos.x + half,
            self.pos.y + half,
        )
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.phase, GemPhase::Dead { .. })
    }

    pub fn owner_id(&self) -> Option<&str> {
        match &self.phase {
            GemPhase::Claiming { owner_id, .. } => Some(owner_id),
            _ => None,
        }
    }

    pub fn collision_time(&self) -> Option<f64> {
        match self.phase {
            GemPhase::Claiming { since, .. } => Some(since),
            _ => None,
        }
    }

    /// Advances the pickup state machine by one tick.
    ///
    /// `overlapping` holds the ids of every character currently touching
    /// this gem, in iteration order; the first entry wins a fresh claim.
    /// Returns the owner's id exactly when the pickup completes this tick,
    /// so the caller can award the point.
    pub fn advance(&mut self, overlapping: &[&str], now: f64) -> Option<String> {
        match &self.phase {
            GemPhase::Dead { .. } => None,
            GemPhase::Claiming { owner_id, since } => {
                if overlapping.contains(&owner_id.as_str()) {
                    if now - since >= PICKUP_TIME {
                        let owner = owner_id.clone();
                        self.phase = GemPhase::Dead { since: now };
                        return Some(owner);
                    }
                    None
                } else {
                    // owner left before the pickup finished
                    self.phase = GemPhase::Unclaimed;
                    None
                }
            }
            GemPhase::Unclaimed => {
                if let Some(first) = overlapping.first() {
                    self.phase = GemPhase::Claiming {
                        owner_id: (*first).to_string(),
                        since: now,
                    };
                }
                None
            }
        }
    }

    /// True once the death flash has played out and the gem can be removed.
    pub fn expired(&self, now: f64) -> bool {
        matches!(self.phase, GemPhase::Dead { since } if now - since >= GEM_LINGER)
    }

    pub fn report(&self) -> SpriteData {
        SpriteData::Gem {
            sprite_id: self.sprite_id.clone(),
            pos: self.pos,
            owner_id: self.owner_id().map(str::to_string),
            collision_time: self.collision_time(),
            dead: self.is_dead(),
        }
    }

    /// Mutates this gem from a wire record.
    ///
    /// `now` is the receiver's clock: when a record first arrives dead, the
    /// death-flash timer starts counting from the local time of receipt.
    pub fn apply(&mut self, data: &SpriteData, now: f64) -> Result<(), EntityError> {
        let SpriteData::Gem {
            sprite_id,
            pos,
            owner_id,
            collision_time,
            dead,
        } = data
        else {
            return Err(EntityError::InvalidSpriteData);
        };

        if *sprite_id != self.sprite_id {
            return Err(EntityError::IdentityMismatch {
                expected: self.sprite_id.clone(),
                got: sprite_id.clone(),
            });
        }

        self.pos = *pos;
        self.phase = if *dead {
            // keep the local flash clock across repeated dead reports
            match self.phase {
                GemPhase::Dead { since } => GemPhase::Dead { since },
                _ => GemPhase::Dead { since: now },
            }
        } else {
            match (owner_id, collision_time) {
                (Some(owner), Some(since)) => GemPhase::Claiming {
                    owner_id: owner.clone(),
                    since: *since,
                },
                (None, None) => GemPhase::Unclaimed,
                // a claim needs both an owner and a start time
                _ => return Err(EntityError::InvalidSpriteData),
            }
        };
        Ok(())
    }

    /// Construct a gem from a wire record (entity discovery).
    pub fn from_data(data: &SpriteData, now: f64) -> Result<Gem, EntityError> {
        let SpriteData::Gem { sprite_id, pos, .. } = data else {
            return Err(EntityError::InvalidSpriteData);
        };
        let mut gem = Gem::new(sprite_id.clone(), *pos);
        gem.apply(data, now)?;
        Ok(gem)
    }
}

/// Per-session record of every live entity, keyed by sprite id.
///
/// Constructed at session start and dropped at session end; there is no
/// global sprite state anywhere in the program.
#[derive(Debug, Default)]
pub struct Registry {
    pub characters: HashMap<String, Character>,
    pub gems: HashMap<String, Gem>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, sprite_id: &str) -> bool {
        self.characters.contains_key(sprite_id) || self.gems.contains_key(sprite_id)
    }

    pub fn insert_character(&mut self, character: Character) {
        self.characters
            .insert(character.sprite_id.clone(), character);
    }

    pub fn insert_gem(&mut self, gem: Gem) {
        self.gems.insert(gem.sprite_id.clone(), gem);
    }

    /// Character ids in sorted order: the documented deterministic iteration
    /// order for gem claiming and winner selection.
    pub fn character_ids_sorted(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.characters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.characters.len() + self.gems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty() && self.gems.is_empty()
    }

    /// One full snapshot: every live entity exactly once.
    pub fn report_all(&self) -> SpriteDataGroup {
        let mut data: Vec<SpriteData> = Vec::with_capacity(self.len());
        data.extend(self.characters.values().map(Character::report));
        data.extend(self.gems.values().map(Gem::report));
        SpriteDataGroup { data }
    }
}
