//! Process-wide handle to the loaded embedding model.
//!
//! The handle is created empty, initialized once at startup, and is read-only
//! afterwards. Clones share the same slot, so the HTTP layer can hold one
//! without any locking.

use std::fmt;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result, bail, ensure};

use crate::embedder::TextEncoder;

const PROBE_TEXT: &str = "dimension probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Uninitialized,
    Ready,
    Failed,
}

struct LoadedModel {
    encoder: Arc<dyn TextEncoder>,
    dimension: usize,
}

#[derive(Clone, Default)]
pub struct ModelHandle {
    slot: Arc<OnceLock<Result<LoadedModel, String>>>,
}

impl ModelHandle {
    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// Build a handle that is already `Ready` with the given encoder.
    pub fn ready(encoder: Arc<dyn TextEncoder>) -> Result<Self> {
        let handle = Self::uninitialized();
        handle.initialize(move || Ok(encoder))?;
        Ok(handle)
    }

    /// Run `loader` and move to `Ready`, or to `Failed` if loading or the
    /// dimension probe errors. Only the first call may initialize.
    pub fn initialize<F>(&self, loader: F) -> Result<()>
    where
        F: FnOnce() -> Result<Arc<dyn TextEncoder>>,
    {
        if self.slot.get().is_some() {
            bail!("model handle is already initialized");
        }

        let outcome = loader().and_then(|encoder| {
            let dimension = probe_dimension(encoder.as_ref())?;
            Ok(LoadedModel { encoder, dimension })
        });

        match outcome {
            Ok(loaded) => {
                tracing::info!(
                    model = loaded.encoder.model_name(),
                    dimension = loaded.dimension,
                    "model loaded"
                );
                if self.slot.set(Ok(loaded)).is_err() {
                    bail!("model handle is already initialized");
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!("failed to load model: {err:#}");
                // A concurrent winner keeps its state; the error is still reported.
                let _ = self.slot.set(Err(format!("{err:#}")));
                Err(err)
            }
        }
    }

    pub fn state(&self) -> ModelState {
        match self.slot.get() {
            None => ModelState::Uninitialized,
            Some(Ok(_)) => ModelState::Ready,
            Some(Err(_)) => ModelState::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    pub fn dimension(&self) -> Option<usize> {
        self.loaded().map(|m| m.dimension)
    }

    /// Maximum token length the model considers. Not enforced here.
    pub fn max_input_length(&self) -> Option<usize> {
        self.loaded().map(|m| m.encoder.max_sequence_length())
    }

    pub fn model_name(&self) -> Option<&str> {
        self.loaded().map(|m| m.encoder.model_name())
    }

    pub fn encoder(&self) -> Option<Arc<dyn TextEncoder>> {
        self.loaded().map(|m| Arc::clone(&m.encoder))
    }

    /// The load error, if initialization failed.
    pub fn failure(&self) -> Option<&str> {
        match self.slot.get() {
            Some(Err(msg)) => Some(msg),
            _ => None,
        }
    }

    fn loaded(&self) -> Option<&LoadedModel> {
        self.slot.get().and_then(|r| r.as_ref().ok())
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("state", &self.state())
            .field("dimension", &self.dimension())
            .finish()
    }
}

fn probe_dimension(encoder: &dyn TextEncoder) -> Result<usize> {
    let vectors = encoder
        .encode(&[PROBE_TEXT.to_string()])
        .context("dimension probe failed")?;
    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    ensure!(dimension > 0, "model produced an empty embedding");
    Ok(dimension)
}
