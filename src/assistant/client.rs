use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;
use crate::live::messages::{Content, InlineData};

/// One `generateContent` call
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Model name; part of the URL, not the body
    #[serde(skip)]
    pub model: String,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

impl GenerateRequest {
    pub fn prompt(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents: vec![Content::text(text)],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    GoogleMaps {},
    GoogleSearch {},
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub retrieval_config: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub lat_lng: LatLng,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub web: Option<WebChunk>,
    #[serde(default)]
    pub maps: Option<WebChunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebChunk {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate; empty when there is none
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// First inline blob of the first candidate
    pub fn inline_data(&self) -> Option<&InlineData> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.inline_data.as_ref())
    }

    pub fn grounding_chunks(&self) -> &[GroundingChunk] {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.as_slice())
            .unwrap_or(&[])
    }
}

/// Request/response access to a hosted content model
#[async_trait::async_trait]
pub trait ContentModel: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ServiceError>;
}

/// REST client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl ContentModel for GeminiClient {
    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ServiceError> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ServiceError::MissingCredential)?;

        let url = format!("{}/models/{}:generateContent", self.endpoint, request.model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        debug!("Received {} candidate(s)", parsed.candidates.len());

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = GenerateRequest {
            tools: vec![Tool::GoogleMaps {}],
            tool_config: Some(ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: 37.87,
                        longitude: -122.25,
                    },
                },
            }),
            ..GenerateRequest::prompt("gemini-2.5-flash", "cafes nearby?")
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "cafes nearby?");
        assert_eq!(json["tools"][0], serde_json::json!({ "googleMaps": {} }));
        assert_eq!(json["toolConfig"]["retrievalConfig"]["latLng"]["latitude"], 37.87);
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn test_response_accessors() {
        let json = r#"{
            "candidates": [{
                "content": { "parts": [
                    { "text": "Try " },
                    { "text": "Lot B." },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBOR" } }
                ]},
                "groundingMetadata": { "groundingChunks": [
                    { "web": { "uri": "https://example.edu", "title": "Events" } }
                ]}
            }]
        }"#;

        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), "Try Lot B.");
        assert_eq!(response.inline_data().unwrap().data, "iVBOR");
        assert_eq!(response.grounding_chunks().len(), 1);
    }

    #[test]
    fn test_empty_response() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), "");
        assert!(response.inline_data().is_none());
        assert!(response.grounding_chunks().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = GeminiClient::new("http://127.0.0.1:9", None);
        let result = client
            .generate(GenerateRequest::prompt("gemini-3-flash-preview", "hi"))
            .await;
        assert!(matches!(result, Err(ServiceError::MissingCredential)));
    }
}
