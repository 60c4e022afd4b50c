//! First-seen-wins suppression over merged entity streams.
//!
//! Resolvers build one stream by concatenating several sources and then
//! apply a single [`Uniquify`] adapter over the whole concatenation. One
//! seen-set spanning every source means an entity reported by an earlier
//! source is suppressed when a later source reports it again, and the output
//! keeps the order of first appearance.

use std::collections::HashSet;

use crate::{EntityStream, Keyed, StoreError};

/// Whether a resolver suppresses repeated entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dedup {
    /// Yield each identity once, at its first appearance.
    #[default]
    Unique,
    /// Yield every match, including repeats from overlapping sources.
    KeepDuplicates,
}

/// Iterator adapter that drops entities whose key was already yielded.
///
/// Errors pass through untouched and do not enter the seen-set.
pub struct Uniquify<I, T: Keyed> {
    inner: I,
    seen: Option<HashSet<T::Key>>,
}

impl<I, T: Keyed> Uniquify<I, T> {
    /// Wrap `inner`; [`Dedup::KeepDuplicates`] makes the adapter a passthrough.
    pub fn new(inner: I, dedup: Dedup) -> Self {
        let seen = match dedup {
            Dedup::Unique => Some(HashSet::new()),
            Dedup::KeepDuplicates => None,
        };
        Self { inner, seen }
    }
}

impl<I, T> Iterator for Uniquify<I, T>
where
    I: Iterator<Item = Result<T, StoreError>>,
    T: Keyed,
{
    type Item = Result<T, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(seen) = self.seen.as_mut() else {
            return self.inner.next();
        };
        self.inner.find(|item| match item {
            Ok(entity) => seen.insert(entity.key()),
            Err(_) => true,
        })
    }
}

/// Box a stream behind a [`Uniquify`] adapter.
pub fn uniquify<'a, T>(stream: EntityStream<'a, T>, dedup: Dedup) -> EntityStream<'a, T>
where
    T: Keyed + 'a,
    T::Key: 'a,
{
    match dedup {
        Dedup::KeepDuplicates => stream,
        Dedup::Unique => Box::new(Uniquify::new(stream, dedup)),
    }
}

/// Defer building a stream until it is first polled.
///
/// Later stages of a resolver are wrapped in this so that a caller who stops
/// early never issues their queries.
pub fn lazily<'a, T, F>(build: F) -> EntityStream<'a, T>
where
    T: 'a,
    F: FnOnce() -> EntityStream<'a, T> + 'a,
{
    Box::new(std::iter::once_with(build).flatten())
}

/// Single-error stream.
pub(crate) fn failed<'a, T: 'a>(error: StoreError) -> EntityStream<'a, T> {
    Box::new(std::iter::once(Err(error)))
}

/// Stream that yields nothing.
pub(crate) fn empty<'a, T: 'a>() -> EntityStream<'a, T> {
    Box::new(std::iter::empty())
}
