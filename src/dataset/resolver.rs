//! Image resolution across several candidate source directories.
//!
//! HAM10000 ships its images in more than one folder. The resolver searches
//! its roots in priority order and the first existing `<image_id>.jpg` wins.

use std::path::{Path, PathBuf};

use crate::utils::error::{DermError, Result};

/// File extension of source images
pub const IMAGE_EXTENSION: &str = "jpg";

/// Existence check used by the resolver, swappable for tests
pub trait PathProbe: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;
}

/// Probe backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl PathProbe for LocalFs {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Ordered list of candidate roots
#[derive(Debug, Clone)]
pub struct ImageResolver<P: PathProbe = LocalFs> {
    roots: Vec<PathBuf>,
    probe: P,
}

impl ImageResolver<LocalFs> {
    /// Resolver over the local filesystem
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self::with_probe(roots, LocalFs)
    }
}

impl<P: PathProbe> ImageResolver<P> {
    pub fn with_probe(roots: Vec<PathBuf>, probe: P) -> Self {
        Self { roots, probe }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// First root containing the image, if any
    pub fn resolve(&self, image_id: &str) -> Option<PathBuf> {
        let file_name = format!("{}.{}", image_id, IMAGE_EXTENSION);
        self.roots
            .iter()
            .map(|root| root.join(&file_name))
            .find(|candidate| self.probe.is_file(candidate))
    }

    /// Like [`resolve`](Self::resolve) but fails with `ImageNotFound`
    pub fn require(&self, image_id: &str) -> Result<PathBuf> {
        self.resolve(image_id).ok_or_else(|| DermError::ImageNotFound {
            image_id: image_id.to_string(),
            searched: self.roots.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FakeFs(HashSet<PathBuf>);

    impl PathProbe for FakeFs {
        fn is_file(&self, path: &Path) -> bool {
            self.0.contains(path)
        }
    }

    fn fake(paths: &[&str]) -> FakeFs {
        FakeFs(paths.iter().map(PathBuf::from).collect())
    }

    #[test]
    fn test_first_root_wins() {
        let resolver = ImageResolver::with_probe(
            vec![PathBuf::from("part_1"), PathBuf::from("part_2")],
            fake(&["part_1/ISIC_1.jpg", "part_2/ISIC_1.jpg", "part_2/ISIC_2.jpg"]),
        );

        assert_eq!(resolver.resolve("ISIC_1"), Some(PathBuf::from("part_1/ISIC_1.jpg")));
        assert_eq!(resolver.resolve("ISIC_2"), Some(PathBuf::from("part_2/ISIC_2.jpg")));
    }

    #[test]
    fn test_missing_image() {
        let resolver = ImageResolver::with_probe(vec![PathBuf::from("part_1")], fake(&[]));

        assert_eq!(resolver.resolve("ISIC_3"), None);
        let err = resolver.require("ISIC_3").unwrap_err();
        assert!(matches!(err, DermError::ImageNotFound { image_id, searched }
            if image_id == "ISIC_3" && searched == vec![PathBuf::from("part_1")]));
    }

    #[test]
    fn test_local_fs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ISIC_9.jpg"), b"x").unwrap();

        let resolver = ImageResolver::new(vec![dir.path().to_path_buf()]);
        assert_eq!(resolver.resolve("ISIC_9"), Some(dir.path().join("ISIC_9.jpg")));
        assert_eq!(resolver.resolve("ISIC_8"), None);
    }
}
