use anyhow::{Context, Result};
use mathgate_api::{build_app, AppSettings};
use mathgate_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("mathgate_api");

    let settings = AppSettings::from_env();
    let bind = settings.server.bind.clone();

    let app = build_app(settings)?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(bind = %bind, "mathgate api started");

    axum::serve(listener, app).await?;
    Ok(())
}
