//! Request/response advice services
//!
//! `ContentModel` is the seam to the hosted model; `ParkingAssistant` turns
//! campus state into prompts and model replies into typed values, falling
//! back to fixed values when the service fails.

pub mod client;
mod service;

pub use client::{ContentModel, GeminiClient, GenerateRequest, GenerateResponse};
pub use service::{
    Amenities, CampusAlert, GroundingSource, ParkingAssistant, Prediction, ADVICE_EMPTY,
    ADVICE_FAILED, ALERT_EMPTY, ALERT_FAILED_SUMMARY, ALERT_FAILED_TITLE, ALERT_TITLE,
    AMENITIES_FAILED, PREDICTION_DEFAULT_REASONING, PREDICTION_FAILED_REASONING,
};
