use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use watchmove::{DirLister, EntryFilter, FileHandle, FsError};

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let src = temp_dir.path().join("incoming");
    let dst = temp_dir.path().join("done");
    fs::create_dir(&src).expect("Failed to create source dir");
    fs::create_dir(&dst).expect("Failed to create destination dir");
    (temp_dir, src, dst)
}

#[test]
fn test_listing_returns_exactly_matching_regular_files() {
    let (_temp, src, _dst) = setup();
    let names = ["one.mkv", "two.MKV", "three.mp4", "four.txt", "five"];
    for name in names {
        fs::write(src.join(name), name).unwrap();
    }
    fs::create_dir(src.join("subdir.mkv")).unwrap();

    let lister = DirLister::with_filter(
        &src,
        EntryFilter::regular_files_with_extensions(vec!["mkv".into(), "mp4".into()]),
    );
    let files = lister.read().unwrap();

    let listed: Vec<String> = files.iter().map(|f| f.name()).collect();
    let unique: HashSet<&String> = listed.iter().collect();
    assert_eq!(listed.len(), unique.len(), "no duplicates");

    let expected: HashSet<String> = ["one.mkv", "two.MKV", "three.mp4"].iter().map(|s| s.to_string()).collect();
    let listed: HashSet<String> = listed.into_iter().collect();
    assert_eq!(listed, expected);
}

#[test]
fn test_listing_missing_or_non_directory_path() {
    let (temp, src, _dst) = setup();

    let err = DirLister::new(temp.path().join("absent")).read().unwrap_err();
    assert!(matches!(err, FsError::NotExists { .. }));

    fs::write(src.join("plain"), "").unwrap();
    let err = DirLister::new(src.join("plain")).read().unwrap_err();
    assert!(matches!(err, FsError::NotDirectory { .. }));
}

#[test]
fn test_copy_is_byte_identical() {
    let (_temp, src, dst) = setup();
    let small: Vec<u8> = b"a short clip".to_vec();
    let large: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i * 31 % 256) as u8).collect();

    for (name, data) in [("empty.bin", Vec::new()), ("small.bin", small), ("large.bin", large)] {
        fs::write(src.join(name), &data).unwrap();
        let copy = FileHandle::new(src.join(name)).copy_to(&dst).unwrap();

        assert_eq!(copy.absolute_path(), dst.join(name));
        assert_eq!(fs::read(copy.absolute_path()).unwrap(), data, "{name}");
        assert!(src.join(name).exists(), "copy keeps the source");
    }
}

#[test]
fn test_copy_never_overwrites() {
    let (_temp, src, dst) = setup();
    fs::write(src.join("clip.mkv"), "new bytes").unwrap();
    fs::write(dst.join("clip.mkv"), "existing bytes").unwrap();

    let err = FileHandle::new(src.join("clip.mkv")).copy_to(&dst).unwrap_err();

    assert!(matches!(err, FsError::AlreadyExists { .. }));
    assert_eq!(fs::read_to_string(dst.join("clip.mkv")).unwrap(), "existing bytes");
    assert_eq!(fs::read_to_string(src.join("clip.mkv")).unwrap(), "new bytes");
}

#[test]
fn test_move_relocates_file_and_handle() {
    let (_temp, src, dst) = setup();
    fs::write(src.join("report.pdf"), "contents of the report").unwrap();

    let mut file = FileHandle::new(src.join("report.pdf"));
    file.move_to(&dst).unwrap();

    assert!(!src.join("report.pdf").exists());
    assert!(dst.join("report.pdf").exists());
    assert_eq!(fs::read_to_string(dst.join("report.pdf")).unwrap(), "contents of the report");
    assert_eq!(file.absolute_path(), dst.join("report.pdf"));
    assert_eq!(file.name(), "report.pdf");
}

#[test]
fn test_failed_move_leaves_original_in_place() {
    let (_temp, src, dst) = setup();
    fs::write(src.join("dup.txt"), "source").unwrap();
    fs::write(dst.join("dup.txt"), "already here").unwrap();

    let mut file = FileHandle::new(src.join("dup.txt"));
    let err = file.move_to(&dst).unwrap_err();

    assert!(matches!(err, FsError::AlreadyExists { .. }));
    assert_eq!(file.absolute_path(), src.join("dup.txt"));
    assert_eq!(fs::read_to_string(src.join("dup.txt")).unwrap(), "source");
}

#[test]
fn test_operations_on_deleted_file() {
    let (_temp, src, dst) = setup();
    fs::write(src.join("temp.log"), "x").unwrap();
    let file = FileHandle::new(src.join("temp.log"));

    assert!(file.mod_time().is_ok());
    file.delete().unwrap();

    assert!(matches!(file.delete(), Err(FsError::NotExists { .. })));
    assert!(matches!(file.copy_to(&dst), Err(FsError::NotExists { .. })));
    assert!(!dst.join("temp.log").exists());
}
