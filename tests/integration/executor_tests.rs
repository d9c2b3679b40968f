use crosslink::relink::{action_for, ActionOutcome, RelinkExecutor, RunMode};
use crosslink::scanner::{FileRecord, VolumeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn setup() -> (TempDir, TempDir, VolumeSet) {
    let v1 = TempDir::new().unwrap();
    let v2 = TempDir::new().unwrap();
    let volumes =
        VolumeSet::resolve(&[v1.path().to_path_buf(), v2.path().to_path_buf()], &[]).unwrap();
    (v1, v2, volumes)
}

fn record(volumes: &VolumeSet, path: &Path) -> FileRecord {
    let size = fs::metadata(path).unwrap().len();
    FileRecord::classify(path.to_path_buf(), size, volumes).unwrap()
}

fn write(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_creates_nested_destination_directories() {
    let (_v1, _v2, volumes) = setup();
    let roots = volumes.roots().to_vec();
    let source = write(&roots[0], "a/b/c/d/file.bin", b"payload");
    let canonical = write(&roots[1], "torrents/file.bin", b"payload");

    let action = action_for(&record(&volumes, &source), &record(&volumes, &canonical)).unwrap();
    assert_eq!(action.destination, roots[1].join("a/b/c/d/file.bin"));

    let outcome = RelinkExecutor::new(RunMode::Execute).execute(&action);

    assert_eq!(outcome, ActionOutcome::Applied { simulated: false });
    assert!(roots[1].join("a/b/c/d").is_dir());
    assert!(!source.exists());
    assert_eq!(fs::read(&action.destination).unwrap(), b"payload");
}

#[test]
fn test_missing_canonical_fails_without_mutation() {
    let (_v1, _v2, volumes) = setup();
    let roots = volumes.roots().to_vec();
    let source = write(&roots[0], "movies/x.mkv", b"data");
    let canonical = write(&roots[1], "torrents/x.mkv", b"data");
    let action = action_for(&record(&volumes, &source), &record(&volumes, &canonical)).unwrap();

    fs::remove_file(&canonical).unwrap();

    for mode in [RunMode::Simulate, RunMode::Execute] {
        match RelinkExecutor::new(mode).execute(&action) {
            ActionOutcome::Failed {
                reason,
                source_removed,
            } => {
                assert!(reason.contains("canonical file is missing"));
                assert!(!source_removed);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
    assert!(source.exists());
    assert!(!roots[1].join("movies").exists());
}

#[test]
fn test_missing_source_fails() {
    let (_v1, _v2, volumes) = setup();
    let roots = volumes.roots().to_vec();
    let source = write(&roots[0], "movies/x.mkv", b"data");
    let canonical = write(&roots[1], "torrents/x.mkv", b"data");
    let action = action_for(&record(&volumes, &source), &record(&volumes, &canonical)).unwrap();

    fs::remove_file(&source).unwrap();

    let outcome = RelinkExecutor::new(RunMode::Execute).execute(&action);
    assert_eq!(outcome.status(), "failed");
    assert!(!action.destination.exists());
}

#[test]
fn test_destination_directory_is_a_file() {
    let (_v1, _v2, volumes) = setup();
    let roots = volumes.roots().to_vec();
    let source = write(&roots[0], "movies/x.mkv", b"data");
    let canonical = write(&roots[1], "torrents/x.mkv", b"data");
    write(&roots[1], "movies", b"not a directory");
    let action = action_for(&record(&volumes, &source), &record(&volumes, &canonical)).unwrap();

    let outcome = RelinkExecutor::new(RunMode::Execute).execute(&action);

    assert_eq!(outcome.status(), "failed");
    assert_eq!(fs::read(&source).unwrap(), b"data");
}

#[test]
fn test_execute_all_counts_outcomes() {
    let (_v1, _v2, volumes) = setup();
    let roots = volumes.roots().to_vec();
    let canonical = write(&roots[1], "torrents/x.mkv", b"data");
    let canonical_record = record(&volumes, &canonical);

    let ok = write(&roots[0], "movies/x.mkv", b"data");
    let conflicting = write(&roots[0], "shows/x.mkv", b"data");
    write(&roots[1], "shows/x.mkv", b"in the way");

    let actions = vec![
        action_for(&record(&volumes, &ok), &canonical_record).unwrap(),
        action_for(&record(&volumes, &conflicting), &canonical_record).unwrap(),
    ];

    let summary = RelinkExecutor::new(RunMode::Execute).execute_all(actions);

    assert_eq!(summary.applied, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.data_loss, 0);
    assert_eq!(summary.bytes_relinked, 4);
    assert!(!summary.all_succeeded());
    assert!(conflicting.exists());
    assert!(!ok.exists());
}
