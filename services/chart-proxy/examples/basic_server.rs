//! Basic chart proxy example
//!
//! Run with: cargo run -p chart-proxy --example basic_server

use std::time::Duration;

use chart_proxy::{ChartIndex, Manifest, OCI_MANIFEST, RegistryBuilder, StaticSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "config": {
            "mediaType": "application/vnd.cncf.helm.config.v1+json",
            "digest": "sha256:0000000000000000000000000000000000000000000000000000000000000000",
            "size": 0
        },
        "layers": []
    });

    let source = StaticSource::new()
        .with_chart(
            "charts.example.com/app",
            "1.0.0",
            Manifest::new(OCI_MANIFEST, serde_json::to_vec(&manifest)?),
        )
        .with_index(
            "charts.example.com",
            ChartIndex {
                entries: [("app".to_owned(), vec!["1.0.0".to_owned()])].into(),
            },
        );

    let app = RegistryBuilder::new(source)
        .cache_ttl(Duration::from_secs(15 * 60))
        .build();

    let addr = "127.0.0.1:9000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Chart proxy listening on http://{}", addr);
    tracing::info!(
        "Try: curl http://{}/v2/charts.example.com/app/tags/list",
        addr
    );

    axum::serve(listener, app).await?;

    Ok(())
}
