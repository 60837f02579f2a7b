//! Per-connection session lifecycle: handshake, warm-up buffering, and the
//! one-snapshot-per-report pacing.
//!
//! The warm-up buffer smooths out connection jitter: the first second's
//! worth of inbound reports is queued and answered with empty-state
//! snapshots, and only once the queue is full does the session start
//! popping the oldest report per inbound message and simulating it. The
//! queue depth then stays constant, so the client experiences a fixed
//! (one second) report-to-snapshot delay instead of a jittery one.

use crate::game::{GameState, StepResult};
use log::{debug, info};
use shared::{
    encode_state, timestamp, ClientEnvelope, ProtocolError, ServerEnvelope, MAX_DELTA,
    WARMUP_REPORTS,
};
use std::collections::VecDeque;
use std::time::Instant;

/// Reply produced for one inbound message.
#[derive(Debug)]
pub enum Reply {
    /// Send and keep the session running.
    Message(ServerEnvelope),
    /// Send and end the session (the terminal snapshot carrying the winner).
    Terminal(ServerEnvelope),
}

/// One client's game session.
pub struct Session {
    game: GameState,
    pending: VecDeque<String>,
    last_step: Instant,
}

impl Session {
    /// Validates the handshake line and joins the player.
    ///
    /// Rejections (missing or incompatible version, missing username) happen
    /// before any game state exists; the caller closes the connection
    /// without sending state.
    pub fn open(hello_line: &str, gem_count: usize) -> Result<(Session, ServerEnvelope), ProtocolError> {
        let hello: ClientEnvelope = serde_json::from_str(hello_line)?;
        hello.check()?;
        let username = hello
            .username
            .as_deref()
            .ok_or(ProtocolError::MissingField("username"))?;

        let mut game = GameState::new(gem_count);
        let player_state = game.add_player(username);

        let reply = ServerEnvelope::snapshot(encode_state(&game.registry)?)
            .with_player_state(player_state);
        let session = Session {
            game,
            pending: VecDeque::with_capacity(WARMUP_REPORTS),
            last_step: Instant::now(),
        };
        Ok((session, reply))
    }

    /// Handles one inbound report line, producing exactly one reply.
    pub fn handle_report(&mut self, line: String) -> Result<Reply, ProtocolError> {
        self.pending.push_back(line);
        if self.pending.len() < WARMUP_REPORTS {
            // not enough reports buffered yet
            return Ok(Reply::Message(ServerEnvelope::warmup()));
        }
        let Some(oldest) = self.pending.pop_front() else {
            return Ok(Reply::Message(ServerEnvelope::warmup()));
        };

        let envelope: ClientEnvelope = serde_json::from_str(&oldest)?;
        envelope.check()?;
        let report = envelope
            .player_state
            .ok_or(ProtocolError::MissingField("player_state"))?;

        let now = timestamp();
        let dt = self.last_step.elapsed().as_secs_f32().min(MAX_DELTA);
        self.last_step = Instant::now();

        match self.game.step(&report, now, dt)? {
            StepResult::Won { winner } => {
                info!("Session won by {}", winner);
                let state = encode_state(&self.game.registry)?;
                Ok(Reply::Terminal(
                    ServerEnvelope::snapshot(state).with_winner(winner),
                ))
            }
            result => {
                if result == StepResult::Ignored {
                    debug!("Report ignored; echoing current state");
                }
                let state = encode_state(&self.game.registry)?;
                Ok(Reply::Message(ServerEnvelope::snapshot(state)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{SpriteData, VERSION};

    fn hello_line(username: &str) -> String {
        serde_json::to_string(&ClientEnvelope::hello(username)).unwrap()
    }

    fn report_line(player_state: SpriteData) -> String {
        serde_json::to_string(&ClientEnvelope::report(player_state)).unwrap()
    }

    #[test]
    fn test_open_returns_state_and_player() {
        let (_, reply) = Session::open(&hello_line("tester"), 10).unwrap();
        assert_eq!(reply.version, Some(VERSION));
        let player_state = reply.player_state.unwrap();
        assert!(player_state.is_character());

        let group = shared::decode_state(reply.state.as_deref().unwrap()).unwrap();
        // 10 gems plus the joining character
        assert_eq!(group.data.len(), 11);
    }

    #[test]
    fn test_open_rejects_old_version() {
        let mut hello = ClientEnvelope::hello("tester");
        hello.version = Some(0.5);
        let line = serde_json::to_string(&hello).unwrap();
        assert!(matches!(
            Session::open(&line, 10),
            Err(ProtocolError::IncompatibleVersion(_))
        ));
    }

    #[test]
    fn test_open_rejects_missing_version() {
        let line = r#"{"username": "tester"}"#;
        assert!(matches!(
            Session::open(line, 10),
            Err(ProtocolError::MissingVersion)
        ));
    }

    #[test]
    fn test_open_rejects_missing_username() {
        let line = format!(r#"{{"version": {VERSION}}}"#);
        assert!(matches!(
            Session::open(&line, 10),
            Err(ProtocolError::MissingField("username"))
        ));
    }

    #[test]
    fn test_warmup_replies_are_empty_state() {
        let (mut session, reply) = Session::open(&hello_line("tester"), 1).unwrap();
        let player_state = reply.player_state.unwrap();

        for _ in 0..WARMUP_REPORTS - 1 {
            let reply = session
                .handle_report(report_line(player_state.clone()))
                .unwrap();
            match reply {
                Reply::Message(envelope) => assert_eq!(envelope.state.as_deref(), Some("")),
                Reply::Terminal(_) => panic!("session ended during warm-up"),
            }
        }

        // the next report fills the buffer and real snapshots begin
        let reply = session
            .handle_report(report_line(player_state))
            .unwrap();
        match reply {
            Reply::Message(envelope) => {
                let state = envelope.state.unwrap();
                assert!(!state.is_empty());
                assert!(shared::decode_state(&state).is_ok());
            }
            Reply::Terminal(_) => panic!("session ended on first simulated tick"),
        }
    }

    #[test]
    fn test_malformed_report_is_fatal() {
        let (mut session, _) = Session::open(&hello_line("tester"), 1).unwrap();
        for _ in 0..WARMUP_REPORTS {
            // fill the buffer with garbage; the first pop fails the session
            match session.handle_report("not json".to_string()) {
                Ok(Reply::Message(envelope)) => {
                    assert_eq!(envelope.state.as_deref(), Some(""))
                }
                Ok(Reply::Terminal(_)) => panic!("unexpected terminal reply"),
                Err(ProtocolError::MalformedSnapshot(_)) => return,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        panic!("malformed report was never processed");
    }
}
