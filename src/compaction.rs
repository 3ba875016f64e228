// overlap-based compaction: pick a group of range-intersecting tables and
// fold them into one, newest input winning on duplicate keys

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::DbResult;
use crate::manifest::SstMeta;
use crate::sst::SstReader;

/// Seeds the group with the first live table, then admits each later table
/// iff its range intersects any table already selected. Manifest order is
/// preserved inside the group.
pub(crate) fn select_group(tables: &[SstMeta]) -> Vec<SstMeta> {
    let mut group: Vec<SstMeta> = Vec::new();
    let Some(first) = tables.first() else {
        return group;
    };
    group.push(first.clone());

    for table in &tables[1..] {
        if group.iter().any(|member| member.overlaps(table)) {
            group.push(table.clone());
        }
    }
    group
}

/// Reads every group member in manifest order into one map; later inserts
/// overwrite, so the newest table wins on shared keys.
pub(crate) fn merge_group(
    base: &Path,
    group: &[SstMeta],
    cipher_key: Option<&[u8]>,
) -> DbResult<BTreeMap<Vec<u8>, Vec<u8>>> {
    let mut merged = BTreeMap::new();
    for meta in group {
        let mut reader = SstReader::open(base.join(&meta.filename), cipher_key)?;
        for (key, value) in reader.read_all()? {
            merged.insert(key, value);
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, min: &[u8], max: &[u8]) -> SstMeta {
        SstMeta {
            filename: name.into(),
            min_key: min.to_vec(),
            max_key: max.to_vec(),
        }
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert!(select_group(&[]).is_empty());
    }

    #[test]
    fn disjoint_tables_stay_out_of_the_group() {
        let tables = vec![
            meta("a", b"a", b"f"),
            meta("b", b"m", b"p"),
            meta("c", b"b", b"d"),
        ];
        let group = select_group(&tables);
        let names: Vec<&str> = group.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn overlap_is_transitive_through_the_group() {
        // b only overlaps a, c only overlaps b; both join because the group
        // range grows as members are admitted
        let tables = vec![
            meta("a", b"a", b"f"),
            meta("b", b"e", b"k"),
            meta("c", b"j", b"z"),
        ];
        assert_eq!(select_group(&tables).len(), 3);
    }

    #[test]
    fn later_tables_are_not_compared_against_unselected_ones() {
        // d overlaps only b, which was never admitted, so d stays out too
        let tables = vec![
            meta("a", b"a", b"c"),
            meta("b", b"m", b"p"),
            meta("d", b"n", b"o"),
        ];
        let group = select_group(&tables);
        let names: Vec<&str> = group.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, ["a"]);
    }
}
