//! HTTP API for the campus parking companion
//!
//! - GET /lots, /lots/:id/prediction, /lots/:id/amenities
//! - POST /lots/:id/report - Announce a spot that is about to open
//! - POST /advice, GET /alerts - Assistant queries
//! - GET /rewards, POST /rewards/:id/redeem, GET /profile, /leaderboard, /notifications
//! - POST /voice/toggle, /voice/stop, GET /voice/status - Voice session control
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
