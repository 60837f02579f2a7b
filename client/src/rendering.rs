//! Drawing the playfield with macroquad.

use crate::game::ClientGame;
use macroquad::prelude::*;
use shared::{
    Character, ControlMode, Gem, GemPhase, Vec2, CHARACTER_SIZE, GEM_FLASH_TIME, GEM_SIZE,
    PICKUP_TIME,
};

pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Renderer
    }

    pub fn render(&mut self, game: &ClientGame, now: f64) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        for gem in game.registry.gems.values() {
            self.draw_gem(gem, now);
        }

        // ghost under the player so prediction error reads as a shadow
        self.draw_character(&game.ghost, game.ghost.pos);
        self.draw_character(&game.player, game.player.pos);

        for (id, character) in &game.registry.characters {
            let pos = game.interpolated_pos(id, now).unwrap_or(character.pos);
            self.draw_character(character, pos);
        }

        self.draw_hud(game);
    }

    fn draw_character(&self, character: &Character, pos: Vec2) {
        let color = match character.control {
            ControlMode::LocalControlled => Color::from_rgba(0, 255, 255, 255),
            ControlMode::RemoteEcho => Color::from_rgba(0, 255, 255, 127),
            ControlMode::RemoteOther => Color::from_rgba(255, 0, 255, 255),
        };
        let half = CHARACTER_SIZE / 2.0;
        draw_rectangle(
            pos.x - half,
            pos.y - half,
            CHARACTER_SIZE,
            CHARACTER_SIZE,
            color,
        );
        draw_text(&character.username, pos.x - half, pos.y - half - 6.0, 16.0, WHITE);
    }

    fn draw_gem(&self, gem: &Gem, now: f64) {
        let half = GEM_SIZE / 2.0;
        let color = match &gem.phase {
            GemPhase::Unclaimed => Color::from_rgba(0, 255, 0, 255),
            GemPhase::Claiming { since, .. } => {
                // fade out as the pickup completes
                let progress = ((now - since) / PICKUP_TIME).clamp(0.0, 1.0) as f32;
                Color::new(0.0, 1.0, 0.0, 1.0 - progress)
            }
            GemPhase::Dead { since } => {
                // death flash: toggle visibility every flash interval
                let visible = (((now - since) / GEM_FLASH_TIME) as i64) % 2 == 0;
                if !visible {
                    return;
                }
                Color::from_rgba(255, 0, 0, 255)
            }
        };
        draw_rectangle(gem.pos.x - half, gem.pos.y - half, GEM_SIZE, GEM_SIZE, color);
    }

    fn draw_hud(&self, game: &ClientGame) {
        let mut scores = format!("{}: {}", game.player.username, game.player.score);
        for character in game.registry.characters.values() {
            scores.push_str(&format!("   {}: {}", character.username, character.score));
        }
        draw_text(&scores, 8.0, 18.0, 20.0, WHITE);

        if let Some(winner_id) = &game.winner {
            let name = if *winner_id == game.player.sprite_id {
                "You"
            } else {
                game.registry
                    .characters
                    .get(winner_id)
                    .map(|c| c.username.as_str())
                    .unwrap_or("?")
            };
            let banner = format!("{} won!", name);
            draw_text(&banner, 240.0, 240.0, 40.0, YELLOW);
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
