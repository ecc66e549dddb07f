//! File discovery and the location split handed to the loaders.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::source::LocationSource;
use crate::config::ProcessingConfig;

/// Discovers image files in directories.
pub struct FileDiscovery {
    config: ProcessingConfig,
}

impl FileDiscovery {
    /// Create a new file discovery instance.
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Discover all supported image files at a path.
    ///
    /// If path is a file, returns it if supported.
    /// If path is a directory, recursively finds all supported files.
    pub fn discover(&self, path: &Path) -> Vec<PathBuf> {
        if path.is_file() {
            if self.is_supported(path) {
                return vec![path.to_path_buf()];
            }
            return vec![];
        }

        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_supported(e.path()))
            .map(|e| e.into_path())
            .collect();

        // Sort by path for deterministic ordering
        files.sort();
        files
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// An ordered list of sample locations, optionally shuffled once.
///
/// Every call to [`LocationSplit::source`] replays the same order, which is
/// what makes a reset followed by a second pass reproducible.
#[derive(Debug, Clone, Default)]
pub struct LocationSplit {
    root: Option<PathBuf>,
    locations: Vec<PathBuf>,
}

impl LocationSplit {
    pub fn new(locations: Vec<PathBuf>) -> Self {
        Self {
            root: None,
            locations,
        }
    }

    /// Walk `root` and keep supported files, shuffled when the config
    /// carries a seed.
    pub fn discover(root: &Path, config: &ProcessingConfig) -> Self {
        let files = FileDiscovery::new(config.clone()).discover(root);
        tracing::info!(root = %root.display(), count = files.len(), "Discovered locations");
        let split = Self {
            root: Some(root.to_path_buf()),
            locations: files,
        };
        match config.shuffle_seed {
            Some(seed) => split.shuffled(seed),
            None => split,
        }
    }

    /// Deterministically permute the locations.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.locations.shuffle(&mut StdRng::seed_from_u64(seed));
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// A fresh pull iterator over the split.
    pub fn source(&self) -> LocationSource {
        LocationSource::new(self.locations.clone())
    }
}
