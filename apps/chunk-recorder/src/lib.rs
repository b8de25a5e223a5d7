pub mod config;
pub mod graph;
pub mod gst_utils;
pub mod recording;
pub mod signals;

// Re-export commonly used types
pub use config::Config;
pub use recording::{Session, SessionConfig, SessionHandle, SessionOutcome, SessionReport};

// Common error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkRecorderError {
    #[error("GStreamer error: {0}")]
    Gstreamer(#[from] gst::glib::Error),

    #[error("Graph error: {0}")]
    Graph(#[from] graph::GraphError),

    #[error("Recording gate error: {0}")]
    Gate(#[from] recording::GateError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing GStreamer elements: {0:?}")]
    MissingElements(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChunkRecorderError>;
