//! Ordered iteration over a column family.

use crate::batch::ColumnFamily;
use crate::engine::{Direction, Engine};
use crate::error::StorageResult;
use std::ops::Bound;

/// A bidirectional cursor over one column family.
///
/// Each movement re-reads the engine, so writes made while a cursor is open
/// become visible to its next step. Values come back resolved.
///
/// A new cursor is not positioned; call one of the `seek` methods first.
///
/// # Example
///
/// ```rust
/// use mergedb_storage::{ColumnFamily, Engine, EngineOptions};
///
/// let engine = Engine::open_in_memory(EngineOptions::default()).unwrap();
/// engine.put(ColumnFamily::DEFAULT, b"a", b"1").unwrap();
/// engine.put(ColumnFamily::DEFAULT, b"b", b"2").unwrap();
///
/// let mut cursor = engine.cursor(ColumnFamily::DEFAULT).unwrap();
/// cursor.seek_to_first().unwrap();
/// assert_eq!(cursor.key(), Some(&b"a"[..]));
/// cursor.next().unwrap();
/// assert_eq!(cursor.value(), Some(&b"2"[..]));
/// cursor.next().unwrap();
/// assert!(!cursor.valid());
/// ```
pub struct Cursor<'a> {
    engine: &'a Engine,
    cf: ColumnFamily,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(engine: &'a Engine, cf: ColumnFamily) -> Self {
        Self {
            engine,
            cf,
            current: None,
        }
    }

    /// Positions at the first key `>= target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the value cannot be resolved.
    pub fn seek(&mut self, target: &[u8]) -> StorageResult<()> {
        self.position(Bound::Included(target), Direction::Forward)
    }

    /// Positions at the last key `<= target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the value cannot be resolved.
    pub fn seek_for_prev(&mut self, target: &[u8]) -> StorageResult<()> {
        self.position(Bound::Included(target), Direction::Backward)
    }

    /// Positions at the first key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the value cannot be resolved.
    pub fn seek_to_first(&mut self) -> StorageResult<()> {
        self.position(Bound::Unbounded, Direction::Forward)
    }

    /// Positions at the last key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the value cannot be resolved.
    pub fn seek_to_last(&mut self) -> StorageResult<()> {
        self.position(Bound::Unbounded, Direction::Backward)
    }

    /// Moves to the next key. Does nothing on an invalid cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the value cannot be resolved.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> StorageResult<()> {
        match self.current.take() {
            Some((key, _)) => self.position(Bound::Excluded(key.as_slice()), Direction::Forward),
            None => Ok(()),
        }
    }

    /// Moves to the previous key. Does nothing on an invalid cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or the value cannot be resolved.
    pub fn prev(&mut self) -> StorageResult<()> {
        match self.current.take() {
            Some((key, _)) => self.position(Bound::Excluded(key.as_slice()), Direction::Backward),
            None => Ok(()),
        }
    }

    /// Returns true if the cursor points at an entry.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Returns the current key.
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    /// Returns the current entry, leaving the cursor where it is.
    #[must_use]
    pub fn entry(&self) -> Option<(&[u8], &[u8])> {
        self.current
            .as_ref()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    fn position(&mut self, bound: Bound<&[u8]>, direction: Direction) -> StorageResult<()> {
        self.current = None;
        self.current = self.engine.entry_from(self.cf, bound, direction)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::batch::ColumnFamily;
    use crate::engine::{Engine, EngineOptions};

    fn filled() -> Engine {
        let engine = Engine::open_in_memory(EngineOptions::default().sync_writes(false)).unwrap();
        for key in [b"b", b"d", b"f"] {
            engine.put(ColumnFamily::DEFAULT, key, key).unwrap();
        }
        engine
    }

    #[test]
    fn seek_lands_on_next_key() {
        let engine = filled();
        let mut cursor = engine.cursor(ColumnFamily::DEFAULT).unwrap();

        cursor.seek(b"c").unwrap();
        assert_eq!(cursor.key(), Some(&b"d"[..]));

        cursor.seek(b"d").unwrap();
        assert_eq!(cursor.key(), Some(&b"d"[..]));

        cursor.seek(b"g").unwrap();
        assert!(!cursor.valid());
    }

    #[test]
    fn seek_for_prev_lands_on_previous_key() {
        let engine = filled();
        let mut cursor = engine.cursor(ColumnFamily::DEFAULT).unwrap();

        cursor.seek_for_prev(b"e").unwrap();
        assert_eq!(cursor.key(), Some(&b"d"[..]));

        cursor.seek_for_prev(b"a").unwrap();
        assert!(!cursor.valid());
    }

    #[test]
    fn walk_forward_and_back() {
        let engine = filled();
        let mut cursor = engine.cursor(ColumnFamily::DEFAULT).unwrap();

        let mut forward = Vec::new();
        cursor.seek_to_first().unwrap();
        while let Some(key) = cursor.key() {
            forward.push(key.to_vec());
            cursor.next().unwrap();
        }
        assert_eq!(forward, vec![b"b".to_vec(), b"d".to_vec(), b"f".to_vec()]);

        let mut backward = Vec::new();
        cursor.seek_to_last().unwrap();
        while let Some((key, value)) = cursor.entry() {
            assert_eq!(key, value);
            backward.push(key.to_vec());
            cursor.prev().unwrap();
        }
        forward.reverse();
        assert_eq!(backward, forward);
    }

    #[test]
    fn cursor_sees_later_writes() {
        let engine = filled();
        let mut cursor = engine.cursor(ColumnFamily::DEFAULT).unwrap();
        cursor.seek(b"b").unwrap();

        engine.put(ColumnFamily::DEFAULT, b"c", b"c").unwrap();
        cursor.next().unwrap();
        assert_eq!(cursor.key(), Some(&b"c"[..]));
    }

    #[test]
    fn empty_family_is_never_valid() {
        let engine = Engine::open_in_memory(EngineOptions::default()).unwrap();
        let mut cursor = engine.cursor(ColumnFamily::DEFAULT).unwrap();
        cursor.seek_to_first().unwrap();
        assert!(!cursor.valid());
        cursor.next().unwrap();
        cursor.seek_to_last().unwrap();
        assert!(cursor.value().is_none());
    }
}
