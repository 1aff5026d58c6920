use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::client::{
    ContentModel, GenerateRequest, GenerationConfig, GroundingChunk, ImageConfig, LatLng,
    RetrievalConfig, Tool, ToolConfig,
};
use crate::campus::ParkingLot;
use crate::config::AssistantConfig;
use crate::error::ServiceError;

pub const ADVICE_EMPTY: &str =
    "I'm unable to provide advice right now. Try checking Lot C, it usually has more space.";
pub const ADVICE_FAILED: &str = "Error connecting to AI assistant.";
pub const AMENITIES_FAILED: &str = "No nearby amenities found.";
pub const PREDICTION_DEFAULT_REASONING: &str = "Based on historical campus traffic patterns.";
pub const PREDICTION_FAILED_REASONING: &str = "Standard statistical model.";
pub const ALERT_TITLE: &str = "Live Campus Event Alert";
pub const ALERT_EMPTY: &str = "No major alerts found.";
pub const ALERT_FAILED_TITLE: &str = "Alert Service Unavailable";
pub const ALERT_FAILED_SUMMARY: &str = "Could not fetch real-time campus events.";

const ALERT_QUERY: &str = "Are there any major events, sports games, or road closures on the University of California Berkeley campus today or this week that would affect parking?";
const MAX_ALERT_SOURCES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub lot_id: String,
    pub predicted_available: f64,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amenities {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampusAlert {
    pub title: String,
    pub summary: String,
    pub sources: Vec<GroundingSource>,
}

/// Structured prediction as the model returns it
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionReply {
    predicted_available: Option<f64>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

/// Parking advice backed by a hosted content model
///
/// Every call makes a single attempt. Failures are logged and replaced by a
/// fixed fallback value so callers never see an error.
#[derive(Clone)]
pub struct ParkingAssistant {
    model: Arc<dyn ContentModel>,
    config: AssistantConfig,
}

impl ParkingAssistant {
    pub fn new(model: Arc<dyn ContentModel>, config: AssistantConfig) -> Self {
        Self { model, config }
    }

    pub async fn advice(&self, lots: &[ParkingLot], query: &str) -> String {
        let context = serde_json::to_string(lots).unwrap_or_default();
        let prompt = format!(
            "Context: Campus Parking Data: {}. User Query: {}. Task: Act as a helpful campus parking assistant. Provide concise, expert advice based on current occupancy and trends.",
            context, query
        );

        match self.try_advice(prompt).await {
            Ok(text) => text,
            Err(ServiceError::Empty) => {
                info!("Advice reply was empty, using fallback");
                ADVICE_EMPTY.to_string()
            }
            Err(e) => {
                warn!("Advice request failed: {}", e);
                ADVICE_FAILED.to_string()
            }
        }
    }

    async fn try_advice(&self, prompt: String) -> Result<String, ServiceError> {
        let text = self
            .model
            .generate(GenerateRequest::prompt(&self.config.text_model, prompt))
            .await?
            .text();
        if text.is_empty() {
            return Err(ServiceError::Empty);
        }
        Ok(text)
    }

    pub async fn predict(&self, lot: &ParkingLot) -> Prediction {
        match self.try_predict(lot).await {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!("Prediction for {} failed: {}", lot.id, e);
                Prediction {
                    lot_id: lot.id.clone(),
                    predicted_available: lot.available_spots as f64,
                    confidence: 0.5,
                    reasoning: PREDICTION_FAILED_REASONING.to_string(),
                }
            }
        }
    }

    async fn try_predict(&self, lot: &ParkingLot) -> Result<Prediction, ServiceError> {
        let prompt = format!(
            "Predict parking availability for {}. Current state: {}/{} available, trend: {}. Time: {}. Return reasoning and a prediction confidence (0-1).",
            lot.name,
            lot.available_spots,
            lot.total_spots,
            lot.trend,
            chrono::Local::now().format("%-I:%M:%S %p")
        );

        let request = GenerateRequest {
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(prediction_schema()),
                ..Default::default()
            }),
            ..GenerateRequest::prompt(&self.config.text_model, prompt)
        };

        let text = self.model.generate(request).await?.text();
        let reply: PredictionReply = if text.is_empty() {
            PredictionReply::default()
        } else {
            serde_json::from_str(&text).map_err(|e| ServiceError::Malformed(e.to_string()))?
        };

        Ok(Prediction {
            lot_id: lot.id.clone(),
            // Zero counts as unset, like an empty reasoning string
            predicted_available: reply
                .predicted_available
                .filter(|v| *v != 0.0)
                .unwrap_or(lot.available_spots as f64),
            confidence: reply.confidence.filter(|v| *v != 0.0).unwrap_or(0.7),
            reasoning: reply
                .reasoning
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| PREDICTION_DEFAULT_REASONING.to_string()),
        })
    }

    pub async fn nearby_amenities(&self, lot: &ParkingLot) -> Amenities {
        let prompt = format!(
            "What are the best study spots or cafes within a 5-minute walk of {} (located near {}, {})? Provide helpful links.",
            lot.name, lot.latitude, lot.longitude
        );

        let request = GenerateRequest {
            tools: vec![Tool::GoogleMaps {}],
            tool_config: Some(ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: lot.latitude,
                        longitude: lot.longitude,
                    },
                },
            }),
            ..GenerateRequest::prompt(&self.config.grounded_model, prompt)
        };

        match self.model.generate(request).await {
            Ok(response) => Amenities {
                text: response.text(),
                sources: response
                    .grounding_chunks()
                    .iter()
                    .filter_map(source_of)
                    .collect(),
            },
            Err(e) => {
                warn!("Amenity lookup for {} failed: {}", lot.id, e);
                Amenities {
                    text: AMENITIES_FAILED.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }

    pub async fn campus_alerts(&self) -> CampusAlert {
        let request = GenerateRequest {
            tools: vec![Tool::GoogleSearch {}],
            ..GenerateRequest::prompt(&self.config.text_model, ALERT_QUERY)
        };

        match self.model.generate(request).await {
            Ok(response) => {
                let text = response.text();
                let sources = response
                    .grounding_chunks()
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .map(|web| GroundingSource {
                        title: web.title.clone().unwrap_or_else(|| "Source".to_string()),
                        uri: web.uri.clone().unwrap_or_else(|| "#".to_string()),
                    })
                    .take(MAX_ALERT_SOURCES)
                    .collect();

                CampusAlert {
                    title: ALERT_TITLE.to_string(),
                    summary: if text.is_empty() {
                        ALERT_EMPTY.to_string()
                    } else {
                        text
                    },
                    sources,
                }
            }
            Err(e) => {
                warn!("Campus alert lookup failed: {}", e);
                CampusAlert {
                    title: ALERT_FAILED_TITLE.to_string(),
                    summary: ALERT_FAILED_SUMMARY.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }

    /// Generate badge artwork; `None` when the service returns no image
    pub async fn badge_image(&self, name: &str) -> Option<String> {
        let prompt = format!(
            "A vibrant, high-quality 3D digital achievement badge for a university student titled \"{}\". Minimalist, futuristic, isometric icon, university aesthetic, soft blue and emerald lighting, white background.",
            name
        );

        let request = GenerateRequest {
            generation_config: Some(GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: "1:1".to_string(),
                }),
                ..Default::default()
            }),
            ..GenerateRequest::prompt(&self.config.image_model, prompt)
        };

        match self.model.generate(request).await {
            Ok(response) => {
                let image = response
                    .inline_data()
                    .map(|blob| format!("data:image/png;base64,{}", blob.data));
                if image.is_none() {
                    info!("Badge reply for {:?} carried no image", name);
                }
                image
            }
            Err(e) => {
                warn!("Badge generation failed: {}", e);
                None
            }
        }
    }
}

fn source_of(chunk: &GroundingChunk) -> Option<GroundingSource> {
    let web = chunk.maps.as_ref().or(chunk.web.as_ref())?;
    Some(GroundingSource {
        title: web.title.clone().unwrap_or_else(|| "Source".to_string()),
        uri: web.uri.clone().unwrap_or_else(|| "#".to_string()),
    })
}

fn prediction_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "predictedAvailable": { "type": "NUMBER" },
            "confidence": { "type": "NUMBER" },
            "reasoning": { "type": "STRING" }
        },
        "required": ["predictedAvailable", "confidence", "reasoning"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::client::GenerateResponse;
    use crate::campus::campus_lots;
    use std::sync::Mutex;

    /// Replies with a fixed JSON body and records each request's model name
    struct CannedModel {
        reply: serde_json::Value,
        seen: Mutex<Vec<String>>,
    }

    impl CannedModel {
        fn new(reply: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ContentModel for CannedModel {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ServiceError> {
            self.seen.lock().unwrap().push(request.model.clone());
            serde_json::from_value(self.reply.clone()).map_err(|e| ServiceError::Malformed(e.to_string()))
        }
    }

    fn text_reply(text: &str) -> serde_json::Value {
        serde_json::json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    fn assistant(model: Arc<CannedModel>) -> ParkingAssistant {
        ParkingAssistant::new(model, AssistantConfig::default())
    }

    #[tokio::test]
    async fn test_advice_uses_text_model() {
        let model = CannedModel::new(text_reply("Head to Lot B."));
        let advice = assistant(model.clone()).advice(&campus_lots(), "Where?").await;

        assert_eq!(advice, "Head to Lot B.");
        assert_eq!(model.seen.lock().unwrap()[0], "gemini-3-flash-preview");
    }

    #[tokio::test]
    async fn test_empty_advice_falls_back() {
        let model = CannedModel::new(serde_json::json!({}));
        let advice = assistant(model).advice(&campus_lots(), "Where?").await;
        assert_eq!(advice, ADVICE_EMPTY);
    }

    #[tokio::test]
    async fn test_prediction_fills_missing_fields() {
        let model = CannedModel::new(text_reply(r#"{"confidence": 0.9}"#));
        let lot = &campus_lots()[0];

        let prediction = assistant(model).predict(lot).await;
        assert_eq!(prediction.lot_id, "lot-a");
        assert_eq!(prediction.predicted_available, 12.0);
        assert_eq!(prediction.confidence, 0.9);
        assert_eq!(prediction.reasoning, PREDICTION_DEFAULT_REASONING);
    }

    #[tokio::test]
    async fn test_zero_prediction_fields_are_unset() {
        let model = CannedModel::new(text_reply(
            r#"{"predictedAvailable": 0, "confidence": 0.0, "reasoning": ""}"#,
        ));
        let lot = &campus_lots()[1];

        let prediction = assistant(model).predict(lot).await;
        assert_eq!(prediction.predicted_available, 45.0);
        assert_eq!(prediction.confidence, 0.7);
        assert_eq!(prediction.reasoning, PREDICTION_DEFAULT_REASONING);
    }

    #[tokio::test]
    async fn test_empty_advice_reply_is_empty_error() {
        let model = CannedModel::new(text_reply(""));
        let result = assistant(model).try_advice("Where?".to_string()).await;
        assert!(matches!(result, Err(ServiceError::Empty)));
    }

    #[tokio::test]
    async fn test_unparseable_prediction_uses_failure_fallback() {
        let model = CannedModel::new(text_reply("not json"));
        let prediction = assistant(model).predict(&campus_lots()[2]).await;

        assert_eq!(prediction.predicted_available, 8.0);
        assert_eq!(prediction.confidence, 0.5);
        assert_eq!(prediction.reasoning, PREDICTION_FAILED_REASONING);
    }

    #[tokio::test]
    async fn test_alert_sources_are_capped() {
        let chunk = |i: u32| serde_json::json!({ "web": { "uri": format!("https://news.example/{}", i) } });
        let model = CannedModel::new(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Big game Saturday." }] },
                "groundingMetadata": { "groundingChunks": [chunk(1), chunk(2), {}, chunk(3), chunk(4)] }
            }]
        }));

        let alert = assistant(model).campus_alerts().await;
        assert_eq!(alert.title, ALERT_TITLE);
        assert_eq!(alert.summary, "Big game Saturday.");
        assert_eq!(alert.sources.len(), 3);
        assert_eq!(alert.sources[0].title, "Source");
        assert_eq!(alert.sources[2].uri, "https://news.example/3");
    }

    #[tokio::test]
    async fn test_badge_image_data_url() {
        let model = CannedModel::new(serde_json::json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
            ]}}]
        }));

        let url = assistant(model.clone()).badge_image("Campus Legend").await;
        assert_eq!(url.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(model.seen.lock().unwrap()[0], "gemini-2.5-flash-image");
    }

    #[tokio::test]
    async fn test_badge_without_image_is_none() {
        let model = CannedModel::new(text_reply("I cannot draw that."));
        assert!(assistant(model).badge_image("Campus Legend").await.is_none());
    }
}
