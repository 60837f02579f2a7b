//! TCP listener and per-connection framing.
//!
//! Transport is a reliable ordered byte stream carrying newline-delimited
//! JSON messages, so reports are processed in exactly the order the client
//! sent them. Each accepted connection gets its own task and its own
//! [`Session`]; nothing is shared between connections.

use crate::session::{Reply, Session};
use log::{error, info, warn};
use shared::{ProtocolError, ServerEnvelope, VERSION};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

/// The accept loop and the per-session configuration.
pub struct Server {
    listener: TcpListener,
    gem_count: usize,
}

impl Server {
    pub async fn bind(addr: &str, gem_count: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server {
            listener,
            gem_count,
        })
    }

    /// The bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one independent game session per client.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let gem_count = self.gem_count;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, gem_count).await {
                    warn!("Session {} ended with error: {}", addr, e);
                }
            });
        }
    }
}

/// Runs one connection from handshake to termination.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    gem_count: usize,
) -> Result<(), ProtocolError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let Some(hello) = lines.next_line().await? else {
        return Err(ProtocolError::ConnectionClosed);
    };

    let (mut session, reply) = match Session::open(&hello, gem_count) {
        Ok(open) => open,
        Err(e) => {
            // rejected before any game state exists; close without state
            info!("Connection {} rejected: {}", addr, e);
            return Ok(());
        }
    };
    info!("Connection established: {}", addr);
    send(&mut write_half, &reply).await?;

    while let Some(line) = lines.next_line().await? {
        match session.handle_report(line) {
            Ok(Reply::Message(envelope)) => send(&mut write_half, &envelope).await?,
            Ok(Reply::Terminal(envelope)) => {
                send(&mut write_half, &envelope).await?;
                break;
            }
            Err(e) => {
                error!("Session {} aborted: {}", addr, e);
                let envelope = ServerEnvelope {
                    version: Some(VERSION),
                    error: Some(e.to_string()),
                    ..ServerEnvelope::default()
                };
                // best effort; the connection is going away either way
                let _ = send(&mut write_half, &envelope).await;
                return Err(e);
            }
        }
    }

    info!("Connection terminated: {}", addr);
    Ok(())
}

async fn send(write_half: &mut OwnedWriteHalf, envelope: &ServerEnvelope) -> Result<(), ProtocolError> {
    let mut frame = serde_json::to_string(envelope)?;
    frame.push('\n');
    write_half.write_all(frame.as_bytes()).await?;
    Ok(())
}
