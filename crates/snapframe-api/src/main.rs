use snapframe_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    snapframe_api::telemetry::init_tracing();

    let state = snapframe_api::state::AppState::new(config.clone());
    let router = snapframe_api::setup::build_router(&config, state)?;

    // Start the server
    snapframe_api::setup::start_server(&config, router).await?;

    Ok(())
}
