use clap::Parser;
use log::info;
use peer::input::HELP;
use peer::network::Peer;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Local frames per second
    #[arg(short = 'f', long, default_value = "60")]
    fps: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting peer...");
    info!("Connecting to: {}", args.server);
    println!("{}", HELP);

    let frame_duration = Duration::from_nanos(1_000_000_000 / args.fps.max(1) as u64);
    let mut peer = Peer::new(&args.server, frame_duration).await?;

    peer.run().await?;

    Ok(())
}
