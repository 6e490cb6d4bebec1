//! Host collaborators for the convergence engine
//!
//! [`HostStateQuerier`] reads the package database, the filesystem and
//! guard exit codes; [`HostExecutor`] changes them. Both accept an optional
//! root prefix that every absolute file path is rebased onto, which lets a
//! run stage files into a directory instead of `/`.

pub mod executor;
pub mod packages;
pub mod querier;
pub mod sys;

#[cfg(test)]
pub mod testing;

pub use executor::HostExecutor;
pub use querier::HostStateQuerier;

use std::path::{Path, PathBuf};

/// Maps declared absolute paths onto the host filesystem
#[derive(Debug, Clone, Default)]
pub struct HostRoot {
    prefix: Option<PathBuf>,
}

impl HostRoot {
    pub fn new(prefix: Option<PathBuf>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&Path> {
        self.prefix.as_deref()
    }

    /// Where a declared path lives on this host
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.prefix {
            Some(prefix) => prefix.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }
}
