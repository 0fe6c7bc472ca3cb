use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use casparclock::clock::SystemClock;
use casparclock::config::{self, Overrides, TransportKind};
use casparclock::session::{Session, SessionOptions};
use casparclock::transport::{TcpTransport, Transport};
use casparclock::{api, shutdown};

#[derive(Parser, Debug)]
#[command(
    name = "casparclock",
    version,
    about = "Keeps a CasparCG news clock overlay in sync over AMCP"
)]
struct Cli {
    /// TOML config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "CASPAR_HOST")]
    caspar_host: Option<String>,

    #[arg(long, env = "CASPAR_PORT")]
    caspar_port: Option<u16>,

    /// Address the HTTP API binds to
    #[arg(long, env = "CASPARCLOCK_BIND")]
    bind: Option<String>,

    /// Never open sockets; every command succeeds without reaching an engine
    #[arg(long)]
    mock: bool,

    /// Connect to the engine before serving requests
    #[arg(long)]
    connect_on_start: bool,

    #[arg(long)]
    no_auto_update: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casparclock=info,tower_http=info".into()),
        )
        .with_target(true)
        .init();

    let config = config::load_config(cli.config.as_deref())?.apply(Overrides {
        host: cli.caspar_host,
        port: cli.caspar_port,
        bind: cli.bind,
        mock: cli.mock,
        no_auto_update: cli.no_auto_update,
    });

    let transport = match config.transport {
        TransportKind::Tcp => Transport::Tcp(TcpTransport {
            host: config.caspar.host.clone(),
            port: config.caspar.port,
            connect_timeout: config.caspar.connect_timeout(),
            write_timeout: config.caspar.write_timeout(),
        }),
        TransportKind::Mock => Transport::Null,
    };
    info!(
        "Starting casparclock v{} (engine: {})",
        env!("CARGO_PKG_VERSION"),
        transport.describe()
    );

    let session = Session::new(
        transport,
        Arc::new(SystemClock),
        SessionOptions {
            target: config.caspar.target(),
            auto_update: config.clock.auto_update,
        },
    );

    if cli.connect_on_start {
        let status = session.connect().await;
        info!(connected = status.connected, "{}", status.message);
    }

    let served = api::serve(&config.server.bind, session.clone(), shutdown::signal()).await;
    session.shutdown().await;
    served
}
