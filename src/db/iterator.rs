use std::collections::BTreeMap;

/// Sorted, single-pass iterator over a memtable snapshot. The snapshot is
/// taken at construction: later writes are invisible and on-disk tables are
/// not consulted.
pub struct DbIterator {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl DbIterator {
    pub(crate) fn new(snapshot: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        // BTreeMap iteration is already in lexicographic key order
        let entries: Vec<_> = snapshot.into_iter().collect();
        Self {
            entries: entries.into_iter(),
        }
    }

    pub(crate) fn with_prefix(snapshot: BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Self {
        let entries: Vec<_> = snapshot
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect();
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for DbIterator {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}
