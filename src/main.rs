//! VIA bridge: serves camera or file frames to a remote inference client

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use via_bridge::capture::{DirectorySource, Encoding, FrameSource, PatternSource};
use via_bridge::server::SourceFactory;
use via_bridge::{
    Config, FramePump, LogActions, Rendezvous, Server, Shutdown, SourceConfig, SourceError,
};

#[derive(Parser, Debug)]
#[command(name = "via-bridge")]
#[command(about = "WebSocket frame server for remote vision inference")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Serve the images in this directory instead of a test pattern
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Frame wait timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Send file frames as JPEG
    #[arg(long)]
    jpeg: bool,

    /// Give every connection its own frame source
    #[arg(long)]
    per_connection: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(directory) = self.directory {
            config.source.directory = Some(directory);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.exchange.timeout_ms = timeout_ms;
        }
        if self.jpeg {
            config.source.encoding = Encoding::Jpeg;
        }
        if self.per_connection {
            config.source.per_connection = true;
        }
        if self.debug {
            config.logging.filter = "via_bridge=debug,tower_http=debug".into();
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(fmt::time::uptime()));

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    match &config.directory {
        Some(directory) => Ok(Box::new(DirectorySource::open(directory, config.encoding)?)),
        None => {
            info!(
                "Serving a {}x{} test pattern",
                config.pattern_width, config.pattern_height
            );
            Ok(Box::new(PatternSource::new(
                config.pattern_width,
                config.pattern_height,
            )))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    init_tracing(&config.logging.filter);
    info!("VIA bridge launching...");

    let shutdown = Shutdown::new();
    let actions = Arc::new(LogActions);

    let server = if config.source.per_connection {
        // Fail early on a bad directory rather than on the first connection.
        open_source(&config.source)?;
        let source = config.source.clone();
        let factory: SourceFactory = Arc::new(move || open_source(&source));
        Server::per_connection(
            factory,
            config.exchange.clone(),
            actions,
            config.session.clone(),
            shutdown.clone(),
        )
    } else {
        let rendezvous = Rendezvous::new(&config.exchange, shutdown.clone());
        let source = open_source(&config.source)?;
        FramePump::new(source, rendezvous.results().clone()).spawn();
        Server::shared(rendezvous, actions, config.session.clone())
    };

    let running = server
        .bind(&config.server.host, config.server.port)
        .await?;
    info!("Accepting connections on ws://{}/via", running.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    running.stop().await?;

    info!("VIA bridge shut down");
    Ok(())
}
