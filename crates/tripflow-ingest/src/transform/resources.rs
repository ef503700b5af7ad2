//! Loading of statement text kept outside the binary

use std::path::{Component, Path, PathBuf};

use crate::error::{IngestError, Result};

/// Source of named statement resources
pub trait ResourceLoader: Send + Sync {
    fn load(&self, resource: &str) -> Result<String>;
}

/// Reads resources as files under a root directory
#[derive(Debug, Clone)]
pub struct FsResourceLoader {
    root: PathBuf,
}

impl FsResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, resource: &str) -> Result<PathBuf> {
        let relative = Path::new(resource);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(IngestError::Resource(format!(
                "{} must be a relative path inside {}",
                resource,
                self.root.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceLoader for FsResourceLoader {
    fn load(&self, resource: &str) -> Result<String> {
        let path = self.resolve(resource)?;
        std::fs::read_to_string(&path)
            .map_err(|e| IngestError::Resource(format!("cannot read {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_resource_under_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.sql"), "SELECT 1;").unwrap();

        let loader = FsResourceLoader::new(dir.path());
        assert_eq!(loader.load("a.sql").unwrap(), "SELECT 1;");
    }

    #[test]
    fn test_missing_resource_is_resource_error() {
        let dir = TempDir::new().unwrap();
        let err = FsResourceLoader::new(dir.path()).load("missing.sql").unwrap_err();
        assert!(matches!(err, IngestError::Resource(_)));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let loader = FsResourceLoader::new("/srv/sql");
        assert!(loader.load("../etc/passwd").is_err());
        assert!(loader.load("/etc/passwd").is_err());
    }
}
