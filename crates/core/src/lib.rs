pub mod config;
pub mod embedder;
pub mod model;

pub use config::{ModelConfig, ServerConfig, ServiceConfig};
pub use embedder::{Embedder, TextEncoder};
pub use model::{ModelHandle, ModelState};
