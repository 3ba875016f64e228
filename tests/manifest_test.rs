use std::fs;
use std::path::PathBuf;

use quilldb::manifest::{self, SstMeta};
use quilldb::DbError;

fn test_dir(test_name: &str) -> PathBuf {
    let path = PathBuf::from(format!("test_data/{}", test_name));
    let _ = fs::remove_dir_all(&path);
    fs::create_dir_all(&path).unwrap();
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_dir_all(path);
}

fn meta(name: &str, min: &[u8], max: &[u8]) -> SstMeta {
    SstMeta {
        filename: name.into(),
        min_key: min.to_vec(),
        max_key: max.to_vec(),
    }
}

fn manifest_files(dir: &PathBuf) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n.starts_with("MANIFEST-"))
        .collect();
    names.sort();
    names
}

#[test]
fn test_save_then_load() {
    let dir = test_dir("manifest_save_load");
    let tables = vec![
        meta("sss-00000.qldb", b"a", b"m"),
        meta("sss-00001.qldb", b"n", b"z"),
    ];

    manifest::save(&dir, &tables, None).unwrap();
    assert_eq!(manifest::load(&dir, None).unwrap(), tables);

    let current = fs::read_to_string(dir.join("CURRENT")).unwrap();
    assert_eq!(current, "MANIFEST-00001.qmf");

    cleanup(&dir);
}

#[test]
fn test_missing_current_is_a_fresh_store() {
    let dir = test_dir("manifest_fresh");
    assert!(manifest::load(&dir, None).unwrap().is_empty());
    cleanup(&dir);
}

#[test]
fn test_save_removes_older_generations() {
    let dir = test_dir("manifest_gc");

    manifest::save(&dir, &[meta("sss-00000.qldb", b"a", b"b")], None).unwrap();
    manifest::save(&dir, &[meta("sss-00001.qldb", b"c", b"d")], None).unwrap();
    manifest::save(&dir, &[meta("sss-00002.qldb", b"e", b"f")], None).unwrap();

    assert_eq!(manifest_files(&dir), ["MANIFEST-00003.qmf"]);
    assert_eq!(
        manifest::load(&dir, None).unwrap(),
        [meta("sss-00002.qldb", b"e", b"f")]
    );

    cleanup(&dir);
}

#[test]
fn test_current_is_the_sole_source_of_truth() {
    let dir = test_dir("manifest_atomicity");
    let committed = vec![meta("sss-00000.qldb", b"a", b"m")];
    manifest::save(&dir, &committed, None).unwrap();

    // a crash between writing the next generation and updating CURRENT
    // leaves the new file on disk but must not change what load() sees
    let abandoned = manifest::encode(&[meta("sss-00001.qldb", b"x", b"z")], None).unwrap();
    fs::write(dir.join("MANIFEST-00009.qmf"), abandoned).unwrap();

    assert_eq!(manifest::load(&dir, None).unwrap(), committed);

    cleanup(&dir);
}

#[test]
fn test_encrypted_save_then_load() {
    let dir = test_dir("manifest_encrypted");
    let key = [42u8; 32];
    let tables = vec![meta("sss-00000.qldb", b"a", b"z")];

    manifest::save(&dir, &tables, Some(&key)).unwrap();
    assert_eq!(manifest::load(&dir, Some(&key)).unwrap(), tables);

    // plaintext read of an encrypted manifest cannot decode
    assert!(manifest::load(&dir, None).is_err());

    cleanup(&dir);
}

#[test]
fn test_corrupt_manifest_is_a_manifest_error() {
    let dir = test_dir("manifest_corrupt");
    manifest::save(&dir, &[meta("sss-00000.qldb", b"a", b"b")], None).unwrap();

    let current = fs::read_to_string(dir.join("CURRENT")).unwrap();
    fs::write(dir.join(current.trim()), b"garbage").unwrap();

    assert!(matches!(
        manifest::load(&dir, None),
        Err(DbError::Manifest(_))
    ));

    cleanup(&dir);
}

#[test]
fn test_missing_named_manifest_is_a_manifest_error() {
    let dir = test_dir("manifest_dangling_current");
    fs::write(dir.join("CURRENT"), b"MANIFEST-00042.qmf").unwrap();

    assert!(matches!(
        manifest::load(&dir, None),
        Err(DbError::Manifest(_))
    ));

    cleanup(&dir);
}
