use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{
    cancel_pledge, create_pledge, get_funding_status, health_check, list_server_withdrawals,
    preview_pledge, trigger_settlement_run, AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Pledge endpoints
                .route("/pledges", post(create_pledge))
                .route("/pledges/preview", post(preview_pledge))
                .route("/pledges/:pledge_id", delete(cancel_pledge))
                // Server funding endpoints
                .route("/servers/:server_id/funding", get(get_funding_status))
                .route(
                    "/servers/:server_id/withdrawals",
                    get(list_server_withdrawals),
                )
                // Manual settlement trigger
                .route("/settlement/run", post(trigger_settlement_run)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
