//! # Game Client Library
//!
//! Client-side implementation of gemgrab: input capture, local prediction,
//! server reconciliation, and rendering.
//!
//! The client never waits for the server to show the result of input — the
//! player's character is simulated locally with the same integration the
//! server runs. Authoritative state arrives once per tick as a full
//! snapshot; the record for the local player is routed to a ghost sprite
//! (so prediction error is visible but never yanks the player around),
//! remote entities are updated in place or discovered, and gems play their
//! pickup and death animations from the reported phase.
//!
//! Module map:
//! - `game` — predicted player, ghost, entity mirror, snapshot merge
//! - `input` — directional keys into a thrust vector
//! - `network` — handshake and the lock-step tick loop
//! - `rendering` — macroquad drawing

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
