//! Locating the file a finished fetch produced and exposing it safely.
//!
//! The engine's reported filename is only a hint: post-processing may have
//! changed the container, or the media may be a still image. Resolution
//! tries a fixed, ordered list of extensions against the reported base
//! name, falls back to the reported name itself, and otherwise fails.

use std::path::{Path, PathBuf};

use reelfetch_core::naming::sanitize_filename;

/// Message of a job whose artifact could not be found.
pub const ARTIFACT_MISSING_MESSAGE: &str = "Download finished but file not found";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Neither any tried candidate nor the reported file exists.
    #[error("Download finished but file not found")]
    Missing { reported: PathBuf },

    /// The filesystem could not be queried.
    #[error("failed to inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The located artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Where the file lives now.
    pub path: PathBuf,
    /// `path` relative to the output root, as exposed to clients.
    pub relative: String,
}

/// Output root plus the ordered extensions tried during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPolicy {
    output_root: PathBuf,
    extensions: Vec<String>,
}

impl ArtifactPolicy {
    /// Extensions may be given with or without the leading dot.
    pub fn new<I, S>(output_root: impl Into<PathBuf>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            output_root: output_root.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Locate, sanitize and relocate the artifact for `reported`.
    pub async fn resolve(&self, reported: &Path) -> Result<ResolvedArtifact, ArtifactError> {
        let found = self.locate(reported).await?;
        let path = self.relocate(&found).await;
        let relative = self.relative_path(&path);
        Ok(ResolvedArtifact { path, relative })
    }

    /// First existing `<base>.<ext>` in priority order, else `reported`
    /// itself if it exists.
    pub async fn locate(&self, reported: &Path) -> Result<PathBuf, ArtifactError> {
        for ext in &self.extensions {
            let candidate = reported.with_extension(ext);
            if exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        if exists(reported).await? {
            return Ok(reported.to_path_buf());
        }

        Err(ArtifactError::Missing {
            reported: reported.to_path_buf(),
        })
    }

    /// Move `found` to `<output root>/<sanitized name>`.
    ///
    /// A failed rename is not an error: the file stays where it is and the
    /// original path is returned.
    pub async fn relocate(&self, found: &Path) -> PathBuf {
        let Some(name) = found.file_name() else {
            return found.to_path_buf();
        };
        let safe_path = self
            .output_root
            .join(sanitize_filename(&name.to_string_lossy()));

        if safe_path == found {
            return safe_path;
        }

        match tokio::fs::rename(found, &safe_path).await {
            Ok(()) => {
                tracing::debug!(
                    from = %found.display(),
                    to = %safe_path.display(),
                    "Artifact renamed to safe name",
                );
                safe_path
            }
            Err(e) => {
                tracing::warn!(
                    path = %found.display(),
                    target = %safe_path.display(),
                    error = %e,
                    "Failed to rename artifact, keeping original name",
                );
                found.to_path_buf()
            }
        }
    }

    /// `path` relative to the output root. Paths outside the root are
    /// reduced to their file name so the result is never absolute.
    pub fn relative_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.output_root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
            _ => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

async fn exists(path: &Path) -> Result<bool, ArtifactError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })
}
