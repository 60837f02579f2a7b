//! Input sampling: directional keys into a thrust vector.

use macroquad::prelude::*;
use shared::Vec2;

/// One tick's worth of player input.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSample {
    pub quit: bool,
    /// Direction only; magnitude is normalized away at integration time.
    pub thrust: Vec2,
}

/// Samples the keyboard once per tick.
pub struct InputManager;

impl InputManager {
    pub fn new() -> Self {
        InputManager
    }

    /// Reads the four directional keys (arrows or WASD) into a thrust
    /// direction. Screen coordinates: up is negative y.
    pub fn sample(&mut self) -> InputSample {
        let mut thrust = Vec2::ZERO;

        if is_key_down(KeyCode::Left) || is_key_down(KeyCode::A) {
            thrust.x -= 1.0;
        }
        if is_key_down(KeyCode::Right) || is_key_down(KeyCode::D) {
            thrust.x += 1.0;
        }
        if is_key_down(KeyCode::Up) || is_key_down(KeyCode::W) {
            thrust.y -= 1.0;
        }
        if is_key_down(KeyCode::Down) || is_key_down(KeyCode::S) {
            thrust.y += 1.0;
        }

        InputSample {
            quit: is_key_down(KeyCode::Escape),
            thrust,
        }
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
