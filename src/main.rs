use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use garden::commands::{self, GardenerParams, ServeParams};
use garden::coordinator::config::{DEFAULT_PORT, DEFAULT_UNIT_COUNT};

#[derive(Parser)]
#[command(
    name = "garden",
    version,
    about = "Coordination server for shared garden units, repair agents and observers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordination server
    Serve {
        /// IPv4 address to bind [default: 0.0.0.0]
        address: Option<Ipv4Addr>,

        /// Port to bind [default: 11111]
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Connect as a repair agent and keep polling every unit
    Gardener {
        /// Server IPv4 address
        #[arg(default_value_t = Ipv4Addr::LOCALHOST)]
        address: Ipv4Addr,

        /// Server port
        #[arg(default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// Number of units to poll
        #[arg(short, long, default_value_t = DEFAULT_UNIT_COUNT)]
        units: usize,

        /// Maximum random pause between polls, in milliseconds
        #[arg(long, default_value = "1000")]
        max_delay_ms: u64,
    },

    /// Connect as an observer and print the event log
    Display {
        /// Server IPv4 address
        #[arg(default_value_t = Ipv4Addr::LOCALHOST)]
        address: Ipv4Addr,

        /// Server port
        #[arg(default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            address,
            port,
            config,
        } => {
            tracing::info!(
                address = ?address,
                port = ?port,
                config = ?config,
                "Starting serve command"
            );
            commands::serve(ServeParams {
                address: address.map(IpAddr::V4),
                port,
                config,
            })
            .await?;
        }

        Commands::Gardener {
            address,
            port,
            units,
            max_delay_ms,
        } => {
            let report = commands::gardener(GardenerParams {
                address: SocketAddr::from((address, port)),
                unit_count: units,
                max_delay: Duration::from_millis(max_delay_ms),
                rounds: None,
            })
            .await?;
            tracing::info!(
                polls = report.polls,
                repaired = report.repaired,
                "Gardener finished"
            );
        }

        Commands::Display { address, port } => {
            commands::display(SocketAddr::from((address, port))).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("garden=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new("garden=info,warn")
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        "text" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;
        }
        other => anyhow::bail!("Unknown log format '{other}' (expected text or json)"),
    }

    Ok(())
}
