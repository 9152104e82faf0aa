//! HTTP client for a Custom Vision style prediction endpoint.
//!
//! Each frame is JPEG-encoded in memory and POSTed as the raw request body
//! with the subscription key in a `Prediction-Key` header. The response is a
//! JSON document with a `predictions` array.

use serde::Deserialize;
use url::Url;

use crate::config::{InferenceSettings, Secret};
use crate::detect::backend::{InferenceBackend, InferenceError};
use crate::detect::result::Prediction;
use crate::frame::Frame;

const KEY_HEADER: &str = "Prediction-Key";
const CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    predictions: Vec<Prediction>,
}

/// Blocking prediction client. One request per frame, no retries.
pub struct CustomVisionClient {
    agent: ureq::Agent,
    endpoint: Url,
    key: Secret,
}

impl CustomVisionClient {
    pub fn new(settings: &InferenceSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.timeout)
            .build();
        Self {
            agent,
            endpoint: settings.endpoint.clone(),
            key: settings.key.clone(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn post(&self, payload: &[u8]) -> Result<(u16, String), InferenceError> {
        let response = self
            .agent
            .post(self.endpoint.as_str())
            .set(KEY_HEADER, self.key.expose())
            .set("Content-Type", CONTENT_TYPE)
            .send_bytes(payload);
        match response {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|e| InferenceError::Transport(format!("read response body: {}", e)))?;
                Ok((status, body))
            }
            Err(ureq::Error::Status(status, response)) => {
                let raw = response.into_string().unwrap_or_default();
                Err(InferenceError::Backend {
                    status,
                    body: parse_error_body(raw),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(InferenceError::Transport(transport.to_string()))
            }
        }
    }
}

impl InferenceBackend for CustomVisionClient {
    fn name(&self) -> &'static str {
        "custom-vision"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Prediction>, InferenceError> {
        let payload = frame
            .encode_jpeg()
            .map_err(|e| InferenceError::Payload(format!("{:#}", e)))?;
        let (status, body) = self.post(&payload)?;
        if !(200..300).contains(&status) {
            return Err(InferenceError::Backend {
                status,
                body: parse_error_body(body),
            });
        }
        log::debug!("frame #{}: backend response {}", frame.index(), body);
        let parsed: PredictionResponse = serde_json::from_str(&body)
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
        Ok(parsed.predictions)
    }
}

fn parse_error_body(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}
