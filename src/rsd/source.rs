//! Read-only byte source for RSD logs.
//!
//! The input is memory-mapped so multi-gigabyte logs are never copied; tests and
//! benchmarks wrap in-memory buffers instead. Clones share the same bytes, which
//! lets the cascade hand one mapping to both the strict worker and the
//! heuristic pass.

use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::{Result, RsdError};

/// Shared, immutable view over an RSD file's bytes.
#[derive(Clone, Debug)]
pub struct RsdSource {
    path: PathBuf,
    inner: SourceInner,
}

#[derive(Clone, Debug)]
enum SourceInner {
    Mmap(Arc<Mmap>),
    Owned(Arc<[u8]>),
}

impl RsdSource {
    /// Map the file at `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| RsdError::file_error(path.clone(), e))?;
        let len = file.metadata().map_err(|e| RsdError::file_error(path.clone(), e))?.len();

        // Zero-length files cannot be mapped on every platform.
        if len == 0 {
            debug!("{} is empty", path.display());
            return Ok(Self { path, inner: SourceInner::Owned(Arc::from(Vec::new())) });
        }

        // SAFETY: the mapping is read-only. Concurrent truncation by another process
        // is outside what this crate can guard against, as with any mmap reader.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| RsdError::file_error(path.clone(), e))?;
        debug!("Mapped {} ({} bytes)", path.display(), len);
        Ok(Self { path, inner: SourceInner::Mmap(Arc::new(mmap)) })
    }

    /// Wrap in-memory bytes under a display path.
    pub fn from_vec(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self { path: path.into(), inner: SourceInner::Owned(Arc::from(bytes)) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without its extension, used to name outputs.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rsd".to_string())
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        match &self.inner {
            SourceInner::Mmap(mmap) => mmap.as_ref(),
            SourceInner::Owned(bytes) => bytes.as_ref(),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl AsRef<[u8]> for RsdSource {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
