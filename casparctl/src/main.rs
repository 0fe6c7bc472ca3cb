use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod client;
mod ui;
mod watch;

use client::{Client, DEFAULT_URL};

#[derive(Parser)]
#[command(name = "casparctl")]
#[command(about = "Control the CasparCG news clock", long_about = None)]
struct Cli {
    /// Base URL of the casparclock HTTP API
    #[arg(long, env = "CASPARCLOCK_URL", default_value = DEFAULT_URL, global = true)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the engine and load the template
    Connect,
    /// Send the current time now
    Update,
    /// Show the overlay
    Show,
    /// Hide the overlay
    Hide,
    /// Turn minute-aligned updates on or off
    Auto {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Print the connection status
    Status,
    /// Live status panel
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new(&cli.url);

    match cli.command {
        Commands::Connect => {
            let status = client.connect().await?;
            let state = if status.connected { "OK" } else { "FAILED" };
            println!("{state}: {}", status.message);
        }
        Commands::Update => {
            let result = client.update_clock().await?;
            println!("Clock set to {}", result.time);
        }
        Commands::Show => {
            client.toggle_overlay(true).await?;
            println!("Overlay shown");
        }
        Commands::Hide => {
            client.toggle_overlay(false).await?;
            println!("Overlay hidden");
        }
        Commands::Auto { state } => {
            let response = client.set_auto_update(matches!(state, Switch::On)).await?;
            let state = if response.auto_update_enabled { "on" } else { "off" };
            println!("Auto-update {state}");
        }
        Commands::Status => {
            let status = client.status().await?;
            let dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
            println!("Connected: {}", status.is_connected);
            println!("Mode: {:?}", status.mode);
            println!("Current time: {}", dash(status.current_time));
            println!("Visible: {}", status.is_visible);
            println!("Auto-update: {}", status.auto_update_enabled);
            println!("Next update: {}", dash(status.next_update_time));
            println!("Last command: {}", dash(status.last_command));
        }
        Commands::Watch => watch::run(&client).await?,
    }

    Ok(())
}
