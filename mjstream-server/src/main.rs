//! Motion-JPEG latency test server — entry point.
//!
//! ```text
//! mjstream-server                    Listen with defaults
//! mjstream-server --config <path>    Use custom config TOML
//! mjstream-server --listen <addr>    Override the listen address
//! mjstream-server --gen-config       Dump default config and exit
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mjstream_core::{
    ClockRenderer, RenderSession, Renderer, StreamConnection, StreamError, load_background,
};

use crate::config::ServerConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mjstream-server", about = "Motion-JPEG latency test server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mjstream-server.toml")]
    config: PathBuf,

    /// Listen address (overrides config). Example: 0.0.0.0:7333
    #[arg(short, long)]
    listen: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(addr) = cli.listen {
        config.network.listen_addr = addr;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mjstream-server v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            ctrlc_cancel.cancel();
        }
    });

    // An invalid background falls back to the flat fill; the server
    // still streams.
    let background_renderer: Option<Arc<dyn Renderer>> = if config.video.background.is_empty() {
        None
    } else {
        let spec = config.session().spec;
        let loaded = load_background(Path::new(&config.video.background), &spec)
            .and_then(|frame| ClockRenderer::new(spec).with_background(frame));
        match loaded {
            Ok(renderer) => {
                info!(path = %config.video.background, "background image loaded");
                Some(Arc::new(renderer))
            }
            Err(e) => {
                warn!(path = %config.video.background, error = %e, "background unusable");
                None
            }
        }
    };

    let listener = TcpListener::bind(&config.network.listen_addr).await?;
    info!(
        addr = %config.network.listen_addr,
        width = config.video.width,
        height = config.video.height,
        workers = config.pipeline.worker_count,
        "listening"
    );

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            },
        };

        let session_config = config.session();
        let session_cancel = cancel.child_token();
        let renderer = background_renderer.clone();
        tokio::spawn(async move {
            info!(%peer, "viewer connected");
            let mut session = RenderSession::new(session_config);
            if let Some(renderer) = renderer {
                session = session.with_renderer(renderer);
            }
            let result = session
                .serve(StreamConnection::new(stream), session_cancel)
                .await;
            match result {
                Ok(()) | Err(StreamError::Cancelled) => info!(%peer, "viewer disconnected"),
                Err(e) => warn!(%peer, error = %e, "session ended"),
            }
        });
    }

    info!("shutting down");
    Ok(())
}
