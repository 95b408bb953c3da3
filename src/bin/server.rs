//! Binary entry point: load configuration, bootstrap the application, run
//! until shutdown. `anyhow` is used here only, for startup-time context
//! (SPEC_FULL §C), matching the teacher's `thiserror`-in-library /
//! `anyhow`-in-binary split.

use anyhow::Context;
use candidate_hybrid_search::config::AppConfig;
use candidate_hybrid_search::Application;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    candidate_hybrid_search::telemetry::init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let app = Application::bootstrap(config)
        .await
        .context("failed to bootstrap application")?;

    app.run().await.context("application run loop failed")?;

    Ok(())
}
