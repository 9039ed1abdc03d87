use anyhow::Result;
use cardassist_api::{build_app, ApiConfig};
use cardassist_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("cardassist_api");

    let config = ApiConfig::from_env();
    let bind = config.bind.clone();
    let kb_root = config.kb_root.display().to_string();

    let app = build_app(config)?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, kb_root = %kb_root, "cardassist api started");

    axum::serve(listener, app).await?;
    Ok(())
}
