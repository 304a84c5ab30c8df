//! Model client module for VLM inference.

mod client;

pub use client::{
    MessageBuilder, ModelBackend, ModelClient, ModelConfig, ModelError,
    DEFAULT_API_URL, DEFAULT_MODEL_NAME, DEFAULT_REQUEST_TIMEOUT_SECS,
};
