use std::collections::HashMap;

use crate::detect::backend::{InferenceBackend, InferenceError};
use crate::detect::result::Prediction;
use crate::frame::Frame;

/// Scripted backend for testing and dry runs.
///
/// Returns the same predictions for every frame unless a frame index has a
/// scripted failure. Records the index of every frame it was asked about.
#[derive(Default)]
pub struct StubBackend {
    predictions: Vec<Prediction>,
    failures: HashMap<u64, InferenceError>,
    seen: Vec<u64>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predictions returned for every frame.
    pub fn with_predictions(mut self, predictions: Vec<Prediction>) -> Self {
        self.predictions = predictions;
        self
    }

    /// Fail the call for `frame_index` with `error`.
    pub fn fail_at(mut self, frame_index: u64, error: InferenceError) -> Self {
        self.failures.insert(frame_index, error);
        self
    }

    /// Frame indices received so far, in call order.
    pub fn seen(&self) -> &[u64] {
        &self.seen
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Prediction>, InferenceError> {
        self.seen.push(frame.index());
        if let Some(error) = self.failures.get(&frame.index()) {
            return Err(error.clone());
        }
        Ok(self.predictions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn frame(index: u64) -> Frame {
        Frame::new(index, 1, 1, vec![0, 0, 0]).unwrap()
    }

    #[test]
    fn stub_backend_replays_script() {
        let prediction = Prediction {
            probability: 0.9,
            bounding_box: BoundingBox {
                left: 0.1,
                top: 0.1,
                width: 0.2,
                height: 0.2,
            },
            tag_name: "knife".to_string(),
            tag_id: None,
        };
        let mut backend = StubBackend::new()
            .with_predictions(vec![prediction.clone()])
            .fail_at(1, InferenceError::Transport("connection refused".to_string()));

        assert_eq!(backend.infer(&frame(0)).unwrap(), vec![prediction]);
        assert!(matches!(
            backend.infer(&frame(1)),
            Err(InferenceError::Transport(_))
        ));
        assert_eq!(backend.seen(), &[0, 1]);
    }
}
