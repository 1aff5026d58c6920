use super::state::AppState;
use crate::campus::{AvailabilityBand, ParkingLot, SpotStatus, MILESTONE_BADGE};
use crate::error::RewardError;
use crate::session::VoiceSessionHandle;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LotView {
    #[serde(flatten)]
    pub lot: ParkingLot,
    pub availability_percent: f64,
    pub band: AvailabilityBand,
}

impl From<ParkingLot> for LotView {
    fn from(lot: ParkingLot) -> Self {
        Self {
            availability_percent: lot.availability_percent(),
            band: lot.band(),
            lot,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub status: SpotStatus,
}

#[derive(Debug, Deserialize)]
pub struct AdviceRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct AdviceResponse {
    pub advice: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn lot_not_found(lot_id: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("Lot {} not found", lot_id))
}

// ============================================================================
// Lots
// ============================================================================

/// GET /lots
pub async fn list_lots(State(state): State<AppState>) -> impl IntoResponse {
    let lots: Vec<LotView> = state
        .campus
        .feed()
        .snapshot()
        .await
        .into_iter()
        .map(LotView::from)
        .collect();

    Json(lots)
}

/// GET /lots/:lot_id/prediction
pub async fn get_prediction(
    State(state): State<AppState>,
    Path(lot_id): Path<String>,
) -> impl IntoResponse {
    match state.campus.feed().get(&lot_id).await {
        Some(lot) => Json(state.assistant.predict(&lot).await).into_response(),
        None => lot_not_found(&lot_id),
    }
}

/// GET /lots/:lot_id/amenities
pub async fn get_amenities(
    State(state): State<AppState>,
    Path(lot_id): Path<String>,
) -> impl IntoResponse {
    match state.campus.feed().get(&lot_id).await {
        Some(lot) => Json(state.assistant.nearby_amenities(&lot).await).into_response(),
        None => lot_not_found(&lot_id),
    }
}

/// POST /lots/:lot_id/report
/// Announce that the caller is leaving a spot
pub async fn report_spot(
    State(state): State<AppState>,
    Path(lot_id): Path<String>,
    Json(req): Json<ReportRequest>,
) -> impl IntoResponse {
    let receipt = match state.campus.report_spot(&lot_id, req.status).await {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!("Rejected spot report: {}", e);
            return lot_not_found(&lot_id);
        }
    };

    if receipt.outcome.milestone_reached {
        // Artwork is generated in the background
        let campus = state.campus.clone();
        let assistant = state.assistant.clone();
        tokio::spawn(async move {
            if campus.unlock_badge(MILESTONE_BADGE, &assistant).await.is_none() {
                info!("No artwork for {}, badge not awarded", MILESTONE_BADGE);
            }
        });
    }

    Json(receipt).into_response()
}

// ============================================================================
// Assistant
// ============================================================================

/// POST /advice
pub async fn get_advice(
    State(state): State<AppState>,
    Json(req): Json<AdviceRequest>,
) -> impl IntoResponse {
    let lots = state.campus.feed().snapshot().await;
    let advice = state.assistant.advice(&lots, &req.query).await;

    Json(AdviceResponse { advice })
}

/// GET /alerts
pub async fn get_alerts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.assistant.campus_alerts().await)
}

// ============================================================================
// Rewards and profile
// ============================================================================

/// GET /rewards
pub async fn list_rewards() -> impl IntoResponse {
    Json(crate::campus::reward_catalog())
}

/// POST /rewards/:reward_id/redeem
pub async fn redeem_reward(
    State(state): State<AppState>,
    Path(reward_id): Path<String>,
) -> impl IntoResponse {
    match state.campus.redeem(&reward_id).await {
        Ok(reward) => Json(reward).into_response(),
        Err(e @ RewardError::UnknownReward(_)) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e @ RewardError::InsufficientPoints { .. }) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

/// GET /profile
pub async fn get_profile(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.campus.profile().await)
}

/// GET /leaderboard
pub async fn get_leaderboard(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.campus.leaderboard().await)
}

/// GET /notifications
pub async fn list_notifications(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.campus.tray().current().await)
}

// ============================================================================
// Voice session
// ============================================================================

fn voice_unavailable() -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "Voice session is not configured",
    )
}

async fn voice_stats(voice: &VoiceSessionHandle) -> Response {
    match voice.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!("Failed to get voice stats: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /voice/toggle
/// Start a voice session when idle, end it otherwise
pub async fn toggle_voice(State(state): State<AppState>) -> impl IntoResponse {
    let Some(voice) = state.voice.as_ref() else {
        return voice_unavailable();
    };

    match voice.toggle().await {
        Ok(phase) => {
            info!("Voice session toggled, now {:?}", phase);
            voice_stats(voice).await
        }
        Err(e) => {
            error!("Failed to toggle voice session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /voice/stop
pub async fn stop_voice(State(state): State<AppState>) -> impl IntoResponse {
    let Some(voice) = state.voice.as_ref() else {
        return voice_unavailable();
    };

    match voice.stop().await {
        Ok(_) => voice_stats(voice).await,
        Err(e) => {
            error!("Failed to stop voice session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /voice/status
pub async fn voice_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.voice.as_ref() {
        Some(voice) => voice_stats(voice).await,
        None => voice_unavailable(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
