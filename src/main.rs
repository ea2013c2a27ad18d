use assetway::{App, ConfigBuilder};

#[tokio::main]
async fn main() -> assetway::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    assetway::init_tracing_with_config(&config);

    tracing::info!(
        service = %config.service.name,
        port = config.server.port,
        "Starting registry dispatcher"
    );

    App::with_config(config)?.serve().await
}
