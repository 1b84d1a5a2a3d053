//! Named artifacts produced and consumed by the steps of a build.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::fs;

use crate::error::{ExecError, Result};

/// A tree of files a step produced (a fetched resource, a task output).
#[async_trait]
pub trait Artifact: Send + Sync {
    /// Read a file relative to the artifact root.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
}

/// An artifact backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    root: PathBuf,
}

impl LocalArtifact {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Artifact for LocalArtifact {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ExecError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path escapes artifact: {}", path),
            )));
        }
        Ok(fs::read(self.root.join(relative)).await?)
    }
}

/// An artifact held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifact {
    files: BTreeMap<String, Vec<u8>>,
}

impl InMemoryArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

#[async_trait]
impl Artifact for InMemoryArtifact {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            ExecError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path),
            ))
        })
    }
}

/// Name-indexed artifacts of one scope, falling back to the enclosing scope.
///
/// Registration only ever writes to this scope.
#[derive(Default)]
pub struct ArtifactRepository {
    parent: Option<Arc<ArtifactRepository>>,
    artifacts: RwLock<BTreeMap<String, Arc<dyn Artifact>>>,
}

impl ArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child repository whose lookups fall back to `parent`.
    pub fn new_local_scope(parent: &Arc<ArtifactRepository>) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            artifacts: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn parent(&self) -> Option<&Arc<ArtifactRepository>> {
        self.parent.as_ref()
    }

    pub fn register_artifact(&self, name: impl Into<String>, artifact: Arc<dyn Artifact>) {
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), artifact);
    }

    pub fn artifact_for(&self, name: &str) -> Option<Arc<dyn Artifact>> {
        let local = self
            .artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match local {
            Some(artifact) => Some(artifact),
            None => self.parent.as_ref().and_then(|p| p.artifact_for(name)),
        }
    }

    /// Every visible artifact; entries of inner scopes shadow outer ones.
    pub fn as_map(&self) -> BTreeMap<String, Arc<dyn Artifact>> {
        let mut all = match &self.parent {
            Some(parent) => parent.as_map(),
            None => BTreeMap::new(),
        };
        let local = self
            .artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (name, artifact) in local.iter() {
            all.insert(name.clone(), Arc::clone(artifact));
        }
        all
    }
}

impl std::fmt::Debug for ArtifactRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactRepository")
            .field("artifacts", &self.as_map().keys().collect::<Vec<_>>())
            .finish()
    }
}
