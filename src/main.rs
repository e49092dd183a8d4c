use anyhow::Context;
use friendchat::{app, store::{users, Store}, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("friendchat=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store = Store::connect(&config.database_url, config.db_max_connections, config.store_timeout)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    store.migrate().await.context("migrating schema")?;

    // sessions do not survive a restart, so neither may presence flags
    let stale = users::reset_presence(&mut *store.acquire().await?).await?;
    if stale > 0 {
        info!("cleared {stale} stale presence flags");
    }

    let app = app(AppState::new(store), &config);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
