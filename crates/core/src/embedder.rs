use std::path::Path;

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

pub const MODEL_NAME: &str = "all-MiniLM-L6-v2";
pub const MODEL_DESCRIPTION: &str =
    "Lightweight sentence transformer model optimized for speed and efficiency";
/// Token window of all-MiniLM-L6-v2; longer inputs are truncated by the tokenizer.
pub const MAX_SEQUENCE_LENGTH: usize = 256;

/// Anything that can turn texts into fixed-width vectors.
///
/// Implementations must return exactly one vector per input, in input order.
pub trait TextEncoder: Send + Sync {
    fn model_name(&self) -> &str;

    fn description(&self) -> &str;

    fn max_sequence_length(&self) -> usize;

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct Embedder {
    model: TextEmbedding,
}

impl Embedder {
    pub fn new(cache_dir: &Path, show_download_progress: bool) -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_max_length(MAX_SEQUENCE_LENGTH)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_download_progress),
        )
        .with_context(|| format!("failed to load {MODEL_NAME} from {}", cache_dir.display()))?;
        Ok(Self { model })
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.model.embed(vec![text], None)?;
        embeddings
            .into_iter()
            .next()
            .context("model returned no embedding for a single input")
    }
}

impl TextEncoder for Embedder {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn description(&self) -> &str {
        MODEL_DESCRIPTION
    }

    fn max_sequence_length(&self) -> usize {
        MAX_SEQUENCE_LENGTH
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self.model.embed(inputs, None)?;
        anyhow::ensure!(
            embeddings.len() == texts.len(),
            "model returned {} embeddings for {} inputs",
            embeddings.len(),
            texts.len()
        );
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load() -> Result<Embedder> {
        let cache = dirs::cache_dir()
            .unwrap_or_else(|| ".".into())
            .join("embedding-service")
            .join("models");
        Embedder::new(&cache, false)
    }

    // Downloads the model on first run.
    #[test]
    #[ignore]
    fn test_embed_produces_384_dims() -> Result<()> {
        let embedder = load()?;
        let emb = embedder.embed("hello world")?;
        assert_eq!(emb.len(), 384);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_encode_is_deterministic_and_ordered() -> Result<()> {
        let embedder = load()?;
        let texts = vec!["Hello world".to_string(), "This is a test".to_string()];
        let first = embedder.encode(&texts)?;
        let second = embedder.encode(&texts)?;
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(first[0], embedder.embed("Hello world")?);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_encode_empty_slice() -> Result<()> {
        let embedder = load()?;
        assert!(embedder.encode(&[])?.is_empty());
        Ok(())
    }
}
