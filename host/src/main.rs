use clap::Parser;
use host::network::Host;
use log::info;
use shared::SessionConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the host socket to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// UDP port to listen on
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Session ticks per second
    #[arg(short = 't', long, default_value = "60")]
    tick_rate: u32,

    /// Number of peers that must join before the session starts
    #[arg(short = 'n', long, default_value = "5")]
    peers: usize,

    /// Shortest round length in seconds
    #[arg(long, default_value = "20")]
    round_min: f32,

    /// Longest round length in seconds
    #[arg(long, default_value = "40")]
    round_max: f32,

    /// Briefing length after start and after each rotation, 0 to skip
    #[arg(long, default_value = "16")]
    briefing: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = SessionConfig {
        round_duration_min: args.round_min,
        round_duration_max: args.round_max,
        briefing_duration: args.briefing,
        ..SessionConfig::default()
    };
    config.validate()?;

    let bind_addr = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_nanos(1_000_000_000 / args.tick_rate.max(1) as u64);

    info!("Starting host on {}", bind_addr);
    info!("Tick rate: {}Hz, waiting for {} peers", args.tick_rate, args.peers);

    let mut host = Host::new(&bind_addr, tick_duration, config, args.peers).await?;
    host.run().await?;

    Ok(())
}
