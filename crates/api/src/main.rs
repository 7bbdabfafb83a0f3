use quickdrop_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quickdrop_observability::init();

    let config = ApiConfig::from_env()?;
    let bind_addr = config.bind_addr;
    let app = quickdrop_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
