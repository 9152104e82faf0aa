pub mod custom_vision;
pub mod stub;

pub use custom_vision::CustomVisionClient;
pub use stub::StubBackend;
