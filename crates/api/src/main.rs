use std::net::SocketAddr;

use anyhow::Context;

use casguard_api::{CasConfig, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    casguard_observability::init();

    let config = CasConfig::from_env().context("invalid CAS configuration")?;
    let bind_addr = config.bind_addr;

    let app = build_app(config).context("failed to build application")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    // Peer addresses feed the single-logout trust check.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
