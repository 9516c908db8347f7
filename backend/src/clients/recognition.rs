use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use shared::Prediction;
use std::path::Path;

use crate::config::RecognitionConfig;

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Error analyzing image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error analyzing image: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Error analyzing image: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Clarifai API error: {status} - {body}")]
    Upstream { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct OutputsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_app_id: Option<UserAppId<'a>>,
    inputs: Vec<Input>,
}

#[derive(Debug, Serialize)]
struct UserAppId<'a> {
    user_id: &'a str,
    app_id: &'a str,
}

#[derive(Debug, Serialize)]
struct Input {
    data: InputData,
}

#[derive(Debug, Serialize)]
struct InputData {
    image: ImageData,
}

#[derive(Debug, Serialize)]
struct ImageData {
    base64: String,
}

#[derive(Debug, Deserialize)]
pub struct OutputsResponse {
    #[serde(default)]
    outputs: Vec<Output>,
}

#[derive(Debug, Deserialize)]
struct Output {
    #[serde(default)]
    data: Option<OutputData>,
}

#[derive(Debug, Deserialize)]
struct OutputData {
    #[serde(default)]
    concepts: Vec<Concept>,
}

#[derive(Debug, Deserialize)]
struct Concept {
    name: String,
    value: f64,
}

/// Client for the Clarifai food-item-recognition model.
#[derive(Clone)]
pub struct RecognitionClient {
    http_client: HttpClient,
    endpoint: String,
    api_key: String,
    user_id: Option<String>,
    app_id: Option<String>,
    max_predictions: usize,
}

impl RecognitionClient {
    pub fn new(http_client: HttpClient, config: &RecognitionConfig) -> Self {
        Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            user_id: config.user_id.clone(),
            app_id: config.app_id.clone(),
            max_predictions: config.max_predictions,
        }
    }

    pub async fn analyze_image(&self, image_path: &Path) -> Result<Vec<Prediction>, RecognitionError> {
        let image_bytes = tokio::fs::read(image_path).await?;
        let request = self.build_request(STANDARD.encode(&image_bytes));

        log::debug!(
            "Sending {} ({} bytes) to {}",
            image_path.display(),
            image_bytes.len(),
            self.endpoint
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await?;
            log::error!("Clarifai request failed with {}: {}", status, body);
            return Err(RecognitionError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let outputs: OutputsResponse = serde_json::from_slice(&body)?;
        let predictions = Self::top_predictions(outputs, self.max_predictions);

        log::info!(
            "Clarifai returned {} predictions for {}",
            predictions.len(),
            image_path.display()
        );
        Ok(predictions)
    }

    fn build_request(&self, image_base64: String) -> OutputsRequest<'_> {
        let user_app_id = match (&self.user_id, &self.app_id) {
            (Some(user_id), Some(app_id)) => Some(UserAppId { user_id, app_id }),
            _ => None,
        };

        OutputsRequest {
            user_app_id,
            inputs: vec![Input {
                data: InputData {
                    image: ImageData {
                        base64: image_base64,
                    },
                },
            }],
        }
    }

    /// First `limit` concepts of the first output, in the order Clarifai ranked them.
    pub fn top_predictions(response: OutputsResponse, limit: usize) -> Vec<Prediction> {
        response
            .outputs
            .into_iter()
            .next()
            .and_then(|output| output.data)
            .map(|data| data.concepts)
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .map(|concept| Prediction {
                name: concept.name,
                confidence: to_percentage(concept.value),
            })
            .collect()
    }
}

/// Scales a `[0, 1]` score to a percentage rounded to two decimals.
pub fn to_percentage(value: f64) -> f64 {
    (value * 100.0 * 100.0).round() / 100.0
}
