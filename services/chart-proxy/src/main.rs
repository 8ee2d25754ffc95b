//! Chart proxy server
//!
//! Run with: cargo run -p chart-proxy --features cli -- --seed charts.toml

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chart_proxy::{RegistryBuilder, Seed, StaticSource};
use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

/// How often expired manifests are purged
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Serve Helm charts over the OCI distribution API from an in-memory cache.
///
/// Contents are only held in memory, and are lost when the process exits.
#[derive(Debug, Parser)]
#[command(name = "chart-proxy", version)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 9000)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, env = "DEBUG", value_parser = clap::builder::FalseyValueParser::new())]
    debug: bool,

    /// Minutes before a cached manifest is fetched again. 0 keeps manifests forever
    #[arg(long, env = "CACHE_TTL_MIN", default_value_t = 15)]
    cache_ttl_min: u64,

    /// TOML file declaring the charts to serve
    #[arg(long)]
    seed: Option<PathBuf>,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn load_seed(path: &Path) -> eyre::Result<Seed> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("reading seed file {}", path.display()))?;
    toml::from_str(&contents).wrap_err_with(|| format!("parsing seed file {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let seed = match &args.seed {
        Some(path) => load_seed(path).await?,
        None => {
            tracing::warn!("No seed file given, every chart request will miss");
            Seed::default()
        }
    };
    tracing::debug!(charts = seed.charts.len(), indexes = seed.indexes.len(), "Loaded seed");

    let mut builder = RegistryBuilder::new(StaticSource::from(seed));
    if args.cache_ttl_min > 0 {
        builder = builder.cache_ttl(Duration::from_secs(args.cache_ttl_min * 60));
    }
    let manifests = builder.build_store();
    let sweeper = manifests.spawn_sweeper(SWEEP_INTERVAL);

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    tracing::info!("Chart proxy listening on http://{}", listener.local_addr()?);

    axum::serve(listener, chart_proxy::router(manifests))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("serving")?;

    tracing::info!("shutting down...");
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(())
}
