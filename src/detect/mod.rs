mod backend;
mod backends;
mod filter;
mod result;

pub use backend::{InferenceBackend, InferenceError};
pub use backends::{CustomVisionClient, StubBackend};
pub use filter::filter_predictions;
pub use result::{BoundingBox, DetectionRecord, Prediction};
