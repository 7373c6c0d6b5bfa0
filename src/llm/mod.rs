//! Language model backends

mod local;
mod openai;

pub use local::{SimilarityModel, preprocess};
pub use openai::OpenAiChat;
