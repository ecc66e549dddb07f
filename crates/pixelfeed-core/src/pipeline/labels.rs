//! Label derivation and the sorted label universe.

use std::path::Path;

use crate::config::LabelConfig;

/// Maps a location to its label string.
pub trait LabelGenerator: Send + Sync {
    fn label_for(&self, location: &Path) -> Option<String>;
}

/// Label is the name of the directory containing the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentDirLabel;

impl LabelGenerator for ParentDirLabel {
    fn label_for(&self, location: &Path) -> Option<String> {
        location
            .parent()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Label is one segment of the file stem split on `delimiter`.
///
/// `cat_0001.png` with delimiter `_` and position 0 is labelled `cat`.
#[derive(Debug, Clone)]
pub struct FileNamePatternLabel {
    delimiter: String,
    position: usize,
}

impl FileNamePatternLabel {
    pub fn new(delimiter: impl Into<String>, position: usize) -> Self {
        Self {
            delimiter: delimiter.into(),
            position,
        }
    }
}

impl LabelGenerator for FileNamePatternLabel {
    fn label_for(&self, location: &Path) -> Option<String> {
        let stem = location.file_stem()?.to_string_lossy();
        stem.split(self.delimiter.as_str())
            .nth(self.position)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    }
}

/// Generator selected by the `[labels]` config section.
pub fn generator_from_config(config: &LabelConfig) -> Box<dyn LabelGenerator> {
    match &config.delimiter {
        Some(delimiter) => Box::new(FileNamePatternLabel::new(delimiter.clone(), config.position)),
        None => Box::new(ParentDirLabel),
    }
}

/// Sorted, deduplicated label strings. A label's index is its sorted
/// position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: impl IntoIterator<Item = String>) -> Self {
        let mut labels: Vec<String> = labels.into_iter().collect();
        labels.sort();
        labels.dedup();
        Self { labels }
    }

    /// Collect the labels of every location.
    ///
    /// A label equal to the name of `root` itself is dropped, so files lying
    /// directly in the split root do not form a class of their own.
    pub fn from_locations<'a>(
        locations: impl IntoIterator<Item = &'a Path>,
        generator: &dyn LabelGenerator,
        root: Option<&Path>,
    ) -> Self {
        let root_name = root
            .and_then(|r| r.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        let set = Self::new(
            locations
                .into_iter()
                .filter_map(|location| generator.label_for(location))
                .filter(|label| Some(label) != root_name.as_ref()),
        );
        tracing::debug!(count = set.len(), "Label set built");
        set
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels
            .binary_search_by(|candidate| candidate.as_str().cmp(label))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parent_dir_label() {
        assert_eq!(
            ParentDirLabel.label_for(Path::new("/data/train/dog/1.png")),
            Some("dog".to_string())
        );
        assert_eq!(ParentDirLabel.label_for(Path::new("1.png")), None);
    }

    #[test]
    fn test_file_name_pattern_label() {
        let generator = FileNamePatternLabel::new("_", 1);
        assert_eq!(
            generator.label_for(Path::new("/x/img_cat_01.jpg")),
            Some("cat".to_string())
        );
        assert_eq!(generator.label_for(Path::new("/x/plain.jpg")), None);
    }

    #[test]
    fn test_labels_sorted_regardless_of_discovery_order() {
        let locations: Vec<PathBuf> = ["d/dog/2.png", "d/cat/1.png", "d/dog/1.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let set = LabelSet::from_locations(
            locations.iter().map(PathBuf::as_path),
            &ParentDirLabel,
            None,
        );
        assert_eq!(set.labels(), ["cat", "dog"]);
        assert_eq!(set.index_of("dog"), Some(1));
        assert_eq!(set.index_of("bird"), None);
    }

    #[test]
    fn test_root_name_is_not_a_label() {
        let locations = [PathBuf::from("data/stray.png"), PathBuf::from("data/cat/1.png")];
        let set = LabelSet::from_locations(
            locations.iter().map(PathBuf::as_path),
            &ParentDirLabel,
            Some(Path::new("data")),
        );
        assert_eq!(set.labels(), ["cat"]);
    }

    #[test]
    fn test_generator_from_config() {
        let config = LabelConfig {
            enabled: true,
            delimiter: Some("-".into()),
            position: 0,
        };
        let generator = generator_from_config(&config);
        assert_eq!(
            generator.label_for(Path::new("a/b/zebra-7.png")),
            Some("zebra".to_string())
        );
    }
}
