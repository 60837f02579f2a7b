use clap::Parser;
use client::network::Client;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:7890")]
    server: String,

    /// Username shown to other players
    #[arg(short, long, default_value = "player")]
    username: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Controls: arrows/WASD to move, Esc to quit");

    let mut client = Client::connect(&args.server, &args.username).await?;
    client.run().await?;

    Ok(())
}
