use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parley::{DEFAULT_SWEEP_INTERVAL, ParleyServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley-server", about = "Signaling and relay server for paired game clients")]
#[command(version)]
struct Cli {
    /// Interface to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Seconds between liveness probes
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs())]
    sweep_interval: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            sweep_interval: Duration::from_secs(self.sweep_interval),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.server_config();
    let server = ParleyServer::builder()
        .config(config.clone())
        .build()
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, shutting down");
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["parley-server"]).unwrap();
        let config = cli.server_config();

        // PORT may be set in the environment running the tests.
        assert!(config.bind_addr.starts_with("0.0.0.0:"));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "parley-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9001",
            "--sweep-interval",
            "5",
            "-v",
        ])
        .unwrap();
        let config = cli.server_config();

        assert_eq!(config.bind_addr, "127.0.0.1:9001");
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_rejects_invalid_port() {
        assert!(Cli::try_parse_from(["parley-server", "--port", "70000"]).is_err());
    }
}
