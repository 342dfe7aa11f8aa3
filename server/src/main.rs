use clap::Parser;
use log::{error, info};
use pong_server::config::{PolicyKind, ServerConfig};
use pong_server::connections::ConnectionRegistry;
use pong_server::driver::{DriverHandle, SimulationDriver};
use pong_server::network::WebSocketServer;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative Pong server over WebSockets")]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8765")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Send a snapshot every N ticks
    #[arg(short, long, default_value = "2")]
    broadcast_interval: u64,

    /// Score that ends the match
    #[arg(long, default_value = "20")]
    top_score: u32,

    /// Seed for serves and the policy's exploration
    #[arg(long)]
    seed: Option<u64>,

    /// Automated policy: "tracking" or "none"
    #[arg(long, default_value = "tracking")]
    policy: PolicyKind,

    /// Outbound messages queued per connection before snapshots are skipped
    #[arg(long, default_value = "4")]
    outbound_capacity: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::new(self.host, self.port),
            tick_rate: self.tick_rate,
            broadcast_interval: self.broadcast_interval,
            top_score: self.top_score,
            outbound_capacity: self.outbound_capacity,
            seed: self.seed,
            policy: self.policy,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    config.validate()?;
    info!(
        "Starting Pong server: {} Hz, snapshot every {} ticks, top score {}, policy {:?}",
        config.tick_rate, config.broadcast_interval, config.top_score, config.policy
    );

    let registry = Arc::new(ConnectionRegistry::new());
    let driver = SimulationDriver::from_config(&config, Arc::clone(&registry));
    let handle = DriverHandle::spawn(driver, config.command_capacity);

    let server = WebSocketServer::bind(config.bind_addr).await?;
    let server_task = tokio::spawn(server.run(
        Arc::clone(&registry),
        handle.commands(),
        config.outbound_capacity,
    ));

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server stopped: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    match handle.shutdown().await {
        Ok(driver) => {
            let stats = driver.stats();
            info!(
                "Shut down after {} ticks ({} steps, {} resets, {} broadcasts)",
                stats.ticks,
                stats.steps,
                stats.resets,
                stats.broadcasts + stats.reset_broadcasts
            );
        }
        Err(e) => error!("Driver task panicked: {}", e),
    }

    Ok(())
}
