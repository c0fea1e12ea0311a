use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::time::interval;

use scanmark::{
    api::{create_api_router, AppContext},
    config::Config,
    rate_limiter::RateLimiter,
    snapshot,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting scanmark attendance server");

    let config = Config::from_env()?;
    let state = AppState::new(&config.attendance);
    let rate_limiter = RateLimiter::new(config.server.requests_per_minute);

    if let Some(path) = &config.attendance.snapshot_path {
        match snapshot::load_from_path(&state.store, path) {
            Ok(()) => tracing::info!(path = %path.display(), "snapshot loaded"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "snapshot load failed, starting empty"),
        }
    }

    if let Some(path) = config.attendance.snapshot_path.clone() {
        let snapshot_state = state.clone();
        let every = config.attendance.snapshot_interval_secs.max(1);

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(every));

            loop {
                interval.tick().await;
                if let Err(e) = snapshot::save_to_path(&snapshot_state.store, &path) {
                    tracing::warn!(path = %path.display(), error = %e, "snapshot save failed");
                }
            }
        });
    }

    let context = AppContext {
        state: state.clone(),
        config: config.clone(),
        rate_limiter,
    };

    let app: Router = create_api_router(context);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!("scanmark listening on http://{}", addr);
    tracing::info!(
        "Token TTL default: {}s, late threshold: {}ms",
        config.attendance.default_ttl_seconds,
        config.attendance.late_threshold_ms
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
