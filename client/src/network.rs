//! Client connection and the lock-step tick loop.

use crate::game::ClientGame;
use crate::input::InputManager;
use crate::rendering::Renderer;
use log::{info, warn};
use shared::{
    timestamp, ClientEnvelope, ProtocolError, ServerEnvelope, MAX_DELTA, TICK_RATE,
};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::interval;

pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write_half: OwnedWriteHalf,
    game: ClientGame,
    input_manager: InputManager,
    renderer: Renderer,
    last_predict: Instant,
}

impl Client {
    /// Connects, performs the version handshake, and builds the initial
    /// entity mirror from the server's first snapshot.
    pub async fn connect(server_addr: &str, username: &str) -> Result<Self, ProtocolError> {
        info!("Connecting to {}...", server_addr);
        let stream = TcpStream::connect(server_addr).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        send(&mut write_half, &ClientEnvelope::hello(username)).await?;

        let Some(reply) = lines.next_line().await? else {
            // rejected: the server closes without sending state
            return Err(ProtocolError::ConnectionClosed);
        };
        let hello: ServerEnvelope = serde_json::from_str(&reply)?;
        hello.check()?;
        let player_state = hello
            .player_state
            .ok_or(ProtocolError::MissingField("player_state"))?;
        let state = hello.state.ok_or(ProtocolError::MissingField("state"))?;

        let mut game = ClientGame::new(&player_state)?;
        game.merge_state(&state)?;
        info!("Joined as {} ({})", username, player_state.sprite_id());

        Ok(Client {
            lines,
            write_half,
            game,
            input_manager: InputManager::new(),
            renderer: Renderer::new(),
            last_predict: Instant::now(),
        })
    }

    /// The per-tick loop: sample input, predict, report, await the
    /// snapshot, merge, render. One snapshot arrives per report, so the
    /// loop is naturally paced by the tick interval and the server.
    pub async fn run(&mut self) -> Result<(), ProtocolError> {
        let mut tick = interval(Duration::from_secs_f32(1.0 / TICK_RATE as f32));

        loop {
            tick.tick().await;

            let input = self.input_manager.sample();
            if input.quit {
                info!("Quit requested");
                break;
            }

            let dt = self.last_predict.elapsed().as_secs_f32().min(MAX_DELTA);
            self.last_predict = Instant::now();
            self.game.predict(input.thrust, dt);

            send(&mut self.write_half, &ClientEnvelope::report(self.game.report())).await?;

            let Some(line) = self.lines.next_line().await? else {
                warn!("Server closed the connection");
                break;
            };
            let envelope: ServerEnvelope = serde_json::from_str(&line)?;
            envelope.check()?;

            let state = envelope.state.ok_or(ProtocolError::MissingField("state"))?;
            self.game.merge_state(&state)?;
            let now = timestamp();
            self.game.prune(now);

            if let Some(winner_id) = &envelope.winner {
                let winner = self.game.resolve_winner(winner_id)?.clone();
                if winner.sprite_id == self.game.player.sprite_id {
                    info!("You won with a score of {}!", winner.score);
                } else {
                    info!("{} won with a score of {}!", winner.username, winner.score);
                }
                self.renderer.render(&self.game, now);
                break;
            }

            self.renderer.render(&self.game, now);
        }

        Ok(())
    }
}

async fn send(
    write_half: &mut OwnedWriteHalf,
    envelope: &ClientEnvelope,
) -> Result<(), ProtocolError> {
    let mut frame = serde_json::to_string(envelope)?;
    frame.push('\n');
    write_half.write_all(frame.as_bytes()).await?;
    Ok(())
}
