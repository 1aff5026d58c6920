use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Lots
        .route("/lots", get(handlers::list_lots))
        .route("/lots/:lot_id/prediction", get(handlers::get_prediction))
        .route("/lots/:lot_id/amenities", get(handlers::get_amenities))
        .route("/lots/:lot_id/report", post(handlers::report_spot))
        // Assistant
        .route("/advice", post(handlers::get_advice))
        .route("/alerts", get(handlers::get_alerts))
        // Rewards and profile
        .route("/rewards", get(handlers::list_rewards))
        .route("/rewards/:reward_id/redeem", post(handlers::redeem_reward))
        .route("/profile", get(handlers::get_profile))
        .route("/leaderboard", get(handlers::get_leaderboard))
        .route("/notifications", get(handlers::list_notifications))
        // Voice session control
        .route("/voice/toggle", post(handlers::toggle_voice))
        .route("/voice/stop", post(handlers::stop_voice))
        .route("/voice/status", get(handlers::voice_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
