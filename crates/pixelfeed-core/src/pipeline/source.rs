//! Pull iterator over sample locations.

use std::iter::Peekable;
use std::path::PathBuf;

type Locations = Box<dyn Iterator<Item = PathBuf> + Send>;

/// The location sequence handed to the record pipeline.
///
/// `has_next` peeks without consuming, so it can be asked repeatedly.
pub struct LocationSource {
    inner: Peekable<Locations>,
}

impl LocationSource {
    pub fn new<I>(locations: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
        I::IntoIter: Send + 'static,
    {
        let boxed: Locations = Box::new(locations.into_iter());
        Self {
            inner: boxed.peekable(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn has_next(&mut self) -> bool {
        self.inner.peek().is_some()
    }

    pub fn next_location(&mut self) -> Option<PathBuf> {
        self.inner.next()
    }
}

impl Iterator for LocationSource {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.next_location()
    }
}

impl std::fmt::Debug for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSource").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_next_does_not_consume() {
        let mut source = LocationSource::new(vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(source.has_next());
        assert!(source.has_next());
        assert_eq!(source.next_location(), Some(PathBuf::from("a")));
        assert_eq!(source.next_location(), Some(PathBuf::from("b")));
        assert!(!source.has_next());
        assert_eq!(source.next_location(), None);
    }

    #[test]
    fn test_empty() {
        assert!(!LocationSource::empty().has_next());
    }
}
