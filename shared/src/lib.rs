//! Shared simulation and protocol code for the gemgrab client and server.
//!
//! Both binaries run the same movement integration and speak the same
//! JSON wire protocol, so everything either side needs to agree on lives
//! here: world constants, the entity model, and the snapshot codec.

pub mod entity;
pub mod protocol;
pub mod vec;

pub use entity::{Character, ControlMode, EntityError, Gem, GemPhase, Registry};
pub use protocol::{
    decode_state, encode_state, ClientEnvelope, ProtocolError, ServerEnvelope, SpriteData,
    SpriteDataGroup, VERSION,
};
pub use vec::Vec2;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Playfield size in pixels.
pub const WORLD_WIDTH: f32 = 640.0;
pub const WORLD_HEIGHT: f32 = 480.0;

/// Target simulation rate in ticks per second.
pub const TICK_RATE: u32 = 60;

/// Characters are square sprites of this side length.
pub const CHARACTER_SIZE: f32 = 25.0;
/// Character acceleration in pixels per second per second.
pub const CHARACTER_THRUST: f32 = 50.0;

/// Gems are square sprites of this side length.
pub const GEM_SIZE: f32 = 10.0;
/// How many gems a session starts with.
pub const GEM_COUNT: usize = 10;

/// How long a character must keep touching a gem to pick it up, in seconds.
pub const PICKUP_TIME: f64 = 0.5;
/// How long a dead gem lingers (for the death flash) before removal, in seconds.
pub const GEM_LINGER: f64 = 0.5;
/// Length of one on/off death flash, in seconds.
pub const GEM_FLASH_TIME: f64 = 0.15;

/// Upper bound on a single integration step, in seconds.
pub const MAX_DELTA: f32 = 1.0 / 20.0;

/// How many inbound reports the server buffers before authoritative ticking
/// begins. One second's worth at the target rate.
pub const WARMUP_REPORTS: usize = TICK_RATE as usize;

/// Wall-clock seconds since the UNIX epoch.
pub fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_monotonic() {
        let t1 = timestamp();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = timestamp();
        assert!(t2 > t1);
    }

    #[test]
    fn test_warmup_matches_tick_rate() {
        assert_eq!(WARMUP_REPORTS, TICK_RATE as usize);
    }
}
