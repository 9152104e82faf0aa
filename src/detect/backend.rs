use thiserror::Error;

use crate::frame::Frame;

use super::result::Prediction;

/// Failure of a single inference call. Every variant aborts the run.
#[derive(Clone, Debug, Error)]
pub enum InferenceError {
    /// The request never produced an HTTP response (DNS, connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Backend {
        status: u16,
        /// Error document, or the raw text when it is not JSON.
        body: serde_json::Value,
    },

    /// The backend answered 2xx with something that is not a prediction list.
    #[error("malformed prediction response: {0}")]
    MalformedResponse(String),

    /// The frame could not be encoded for upload.
    #[error("frame payload could not be encoded: {0}")]
    Payload(String),
}

/// Object-detection backend.
///
/// One call per frame, blocking until the backend answers. Implementations
/// must not retry: a failed call is reported to the pipeline as-is.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Prediction>, InferenceError>;
}
