use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No model file found (tried: {})", display_paths(.tried))]
    NoCandidate { tried: Vec<PathBuf> },

    #[error("Failed to load model from {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether the weights came from our own training run or a generic checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    FineTuned,
    Fallback,
}

impl ModelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSource::FineTuned => "fine-tuned",
            ModelSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug)]
pub struct LoadedModel<B> {
    pub backend: B,
    pub path: PathBuf,
    pub source: ModelSource,
}

/// Resolves the model file from an ordered list of candidates.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    candidates: Vec<PathBuf>,
    finetuned_marker: String,
}

impl ModelLoader {
    pub fn new<I, P>(candidates: I, finetuned_marker: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            finetuned_marker: finetuned_marker.into(),
        }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists on disk.
    pub fn resolve(&self) -> Option<&Path> {
        self.candidates
            .iter()
            .find(|path| {
                let exists = path.is_file();
                if !exists {
                    tracing::debug!(path = %path.display(), "Model candidate not found");
                }
                exists
            })
            .map(PathBuf::as_path)
    }

    pub fn source_of(&self, path: &Path) -> ModelSource {
        if !self.finetuned_marker.is_empty()
            && path.to_string_lossy().contains(&self.finetuned_marker)
        {
            ModelSource::FineTuned
        } else {
            ModelSource::Fallback
        }
    }

    /// Load the first existing candidate with `load`.
    ///
    /// Missing files are skipped; a file that exists but fails to load ends
    /// the search.
    pub fn load_with<B, F>(&self, load: F) -> Result<LoadedModel<B>, LoadError>
    where
        F: FnOnce(&Path) -> anyhow::Result<B>,
    {
        let Some(path) = self.resolve() else {
            tracing::error!(candidates = %display_paths(&self.candidates), "No model file found");
            return Err(LoadError::NoCandidate {
                tried: self.candidates.clone(),
            });
        };

        tracing::info!(path = %path.display(), "Loading model");
        let backend = load(path).map_err(|e| LoadError::Load {
            path: path.to_path_buf(),
            source: e.into(),
        })?;

        let source = self.source_of(path);
        match source {
            ModelSource::FineTuned => {
                tracing::info!(path = %path.display(), "Using fine-tuned detection model");
            }
            ModelSource::Fallback => {
                tracing::warn!(
                    path = %path.display(),
                    "Using generic pretrained weights, not trained on the target classes"
                );
            }
        }

        Ok(LoadedModel {
            backend,
            path: path.to_path_buf(),
            source,
        })
    }
}
