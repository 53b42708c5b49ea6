//! Edgewatch CLI
//!
//! Queries a running edge agent for its alert ledger and health, and submits
//! telemetry records for evaluation.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{alerts, status};

/// Edgewatch CLI
#[derive(Parser)]
#[command(name = "ewctl")]
#[command(author, version, about = "CLI for the Edgewatch edge agent", long_about = None)]
pub struct Cli {
    /// Agent endpoint URL (can also be set via EWCTL_API_URL env var)
    #[arg(long, env = "EWCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query and evaluate anomaly alerts
    #[command(subcommand)]
    Alerts(AlertsCommands),

    /// Show agent status and component health
    Status,
}

#[derive(Subcommand)]
pub enum AlertsCommands {
    /// List recent alerts, newest first
    List {
        /// Maximum number of alerts to show
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Evaluate one telemetry record
    Evaluate {
        /// Device identifier
        #[arg(long)]
        device_id: String,

        /// Reported device status
        #[arg(long, value_enum, default_value = "online")]
        status: DeviceStatusArg,

        /// Numeric reading (temperature)
        #[arg(long, allow_negative_numbers = true)]
        reading: f64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeviceStatusArg {
    Online,
    Offline,
}

impl DeviceStatusArg {
    fn as_wire(&self) -> &'static str {
        match self {
            DeviceStatusArg::Online => "ONLINE",
            DeviceStatusArg::Offline => "OFFLINE",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Alerts(alerts_cmd) => match alerts_cmd {
            AlertsCommands::List { limit } => {
                alerts::list_alerts(&client, limit, cli.format).await?;
            }
            AlertsCommands::Evaluate {
                device_id,
                status,
                reading,
            } => {
                alerts::evaluate(&client, &device_id, status.as_wire(), reading, cli.format)
                    .await?;
            }
        },
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}
