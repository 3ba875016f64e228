use quilldb::{Db, Options};

fn test_path(test_name: &str) -> String {
    let path = format!("test_data/{}", test_name);
    let _ = std::fs::remove_dir_all(&path);
    path
}

fn cleanup(path: &str) {
    let _ = std::fs::remove_dir_all(path);
}

fn open_with_limit(path: &str, compact_limit: usize) -> Db {
    let opts = Options {
        compact_limit,
        ..Options::default()
    };
    Db::open(path, opts).unwrap()
}

fn table_files(path: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.starts_with("sss-") && n.ends_with(".qldb"))
        .collect();
    names.sort();
    names
}

#[test]
fn test_compact_merges_overlapping_tables() {
    let path = test_path("compact_merge");
    let db = open_with_limit(&path, 2);

    // table 0 covers [a, b]
    db.put(b"a", b"1").unwrap();
    db.put(b"b", b"2").unwrap();
    db.flush().unwrap();

    // table 1 covers [b, c] and is newer, so its b wins
    db.delete(b"a").unwrap();
    db.put(b"b", b"3").unwrap();
    db.put(b"c", b"4").unwrap();
    db.flush().unwrap();

    assert_eq!(table_files(&path).len(), 2);
    db.compact().unwrap();
    assert_eq!(table_files(&path).len(), 1);

    assert_eq!(db.get(b"a").unwrap(), b"1".to_vec());
    assert_eq!(db.get(b"b").unwrap(), b"3".to_vec());
    assert_eq!(db.get(b"c").unwrap(), b"4".to_vec());

    db.close().unwrap();
    cleanup(&path);
}

#[test]
fn test_compact_below_limit_is_a_noop() {
    let path = test_path("compact_below_limit");
    let db = open_with_limit(&path, 10);

    db.put(b"a", b"1").unwrap();
    db.flush().unwrap();
    db.put(b"b", b"2").unwrap();
    db.flush().unwrap();

    let before = table_files(&path);
    db.compact().unwrap();
    assert_eq!(table_files(&path), before);

    db.close().unwrap();
    cleanup(&path);
}

#[test]
fn test_compact_is_idempotent() {
    let path = test_path("compact_idempotent");
    let db = open_with_limit(&path, 2);

    for round in 0..3 {
        db.put(format!("key_{round}").as_bytes(), b"v").unwrap();
        db.put(b"shared", format!("round_{round}").as_bytes()).unwrap();
        db.flush().unwrap();
    }

    db.compact().unwrap();
    let after_first = table_files(&path);

    db.compact().unwrap();
    assert_eq!(table_files(&path), after_first);

    assert_eq!(db.get(b"shared").unwrap(), b"round_2".to_vec());

    db.close().unwrap();
    cleanup(&path);
}

#[test]
fn test_compacted_state_survives_reopen() {
    let path = test_path("compact_reopen");

    {
        let db = open_with_limit(&path, 2);
        db.put(b"a", b"old").unwrap();
        db.flush().unwrap();
        db.put(b"a", b"new").unwrap();
        db.put(b"z", b"tail").unwrap();
        db.flush().unwrap();
        db.compact().unwrap();
        db.close().unwrap();
    }

    {
        let db = open_with_limit(&path, 2);
        assert_eq!(db.get(b"a").unwrap(), b"new".to_vec());
        assert_eq!(db.get(b"z").unwrap(), b"tail".to_vec());
        db.close().unwrap();
    }

    cleanup(&path);
}

#[test]
fn test_compact_removes_sidecar_filters() {
    let path = test_path("compact_sidecars");
    let db = open_with_limit(&path, 2);

    db.put(b"a", b"1").unwrap();
    db.flush().unwrap();
    db.put(b"a", b"2").unwrap();
    db.flush().unwrap();
    db.compact().unwrap();

    let filters: Vec<String> = std::fs::read_dir(&path)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.ends_with(".filter"))
        .collect();
    assert_eq!(filters.len(), 1, "only the merged table keeps a sidecar");

    db.close().unwrap();
    cleanup(&path);
}
