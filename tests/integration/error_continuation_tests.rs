use clap::Parser;
use crosslink::cli::Cli;
use crosslink::config::Config;
use crosslink::engine::Engine;
use crosslink::error::ExitCode;
use crosslink::events::RecordingSink;
use crosslink::relink::RunMode;
use crosslink::scanner::{ContentHasher, Hash, HashError, Hasher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn volumes(count: usize) -> (Vec<TempDir>, Vec<PathBuf>) {
    let dirs: Vec<TempDir> = (0..count).map(|_| TempDir::new().unwrap()).collect();
    let roots = dirs
        .iter()
        .map(|d| fs::canonicalize(d.path()).unwrap())
        .collect();
    (dirs, roots)
}

fn write(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Real hashing, except for paths containing `poison`.
struct PoisonedHasher(Hasher);

impl ContentHasher for PoisonedHasher {
    fn digest(&self, path: &Path) -> Result<Hash, HashError> {
        if path.to_string_lossy().contains("poison") {
            return Err(HashError::PermissionDenied(path.to_path_buf()));
        }
        self.0.full_hash(path)
    }
}

#[test]
fn test_hash_failure_drops_only_that_file() {
    let (_dirs, roots) = volumes(2);
    write(&roots[0], "movies/x.mkv", b"data");
    write(&roots[1], "torrents/x.mkv", b"data");
    write(&roots[0], "poison/y.mkv", b"other");
    write(&roots[1], "torrents/y.mkv", b"other");

    let sink = Arc::new(RecordingSink::new());
    let config = Config {
        volumes: roots.clone(),
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate)
        .with_event_sink(sink.clone())
        .with_hasher(Arc::new(PoisonedHasher(Hasher::new())))
        .run()
        .unwrap();

    assert_eq!(report.discovery.content.failed_files, 1);
    assert_eq!(sink.count("hash_failed"), 1);
    assert_eq!(report.execution.results.len(), 1);
    assert!(report.execution.results[0]
        .action
        .source
        .ends_with("movies/x.mkv"));
    assert_eq!(report.exit_code(), ExitCode::PartialSuccess);
}

#[test]
fn test_empty_files_are_never_candidates() {
    let (_dirs, roots) = volumes(2);
    write(&roots[0], "movies/empty.nfo", b"");
    write(&roots[1], "torrents/empty.nfo", b"");

    let config = Config {
        volumes: roots.clone(),
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run().unwrap();

    assert_eq!(report.discovery.total_files, 0);
    assert!(report.execution.results.is_empty());
}

#[test]
fn test_special_characters_in_names() {
    let (_dirs, roots) = volumes(2);
    for name in ["file with spaces.mkv", "caf\u{e9}_\u{1f980}.mkv", "special_!@#$%^&()_+.mkv"] {
        write(&roots[0], &format!("movies/{name}"), name.as_bytes());
        write(&roots[1], &format!("torrents/{name}"), name.as_bytes());
    }

    let config = Config {
        volumes: roots.clone(),
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run().unwrap();

    assert_eq!(report.discovery.duplicate_groups, 3);
    assert_eq!(report.execution.applied, 3);
}

#[cfg(unix)]
#[test]
fn test_unreadable_subtree_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let (_dirs, roots) = volumes(2);
    write(&roots[0], "movies/x.mkv", b"data");
    write(&roots[1], "torrents/x.mkv", b"data");
    let locked = roots[0].join("locked");
    write(&roots[0], "locked/z.mkv", b"hidden");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    let enforced = fs::read_dir(&locked).is_err();

    let config = Config {
        volumes: roots.clone(),
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run();

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let report = report.unwrap();
    assert_eq!(report.execution.results.len(), 1);
    if enforced {
        assert!(report.discovery.scan_errors >= 1);
        assert_eq!(report.exit_code(), ExitCode::PartialSuccess);
    }
}

#[test]
fn test_run_app_plan_exit_codes() {
    let (_dirs, roots) = volumes(2);
    let config_file = roots[0].join("absent-dir").join("config.toml");
    let v0 = roots[0].to_string_lossy().to_string();
    let v1 = roots[1].to_string_lossy().to_string();

    // An explicit config path that does not exist is fatal.
    let cli = Cli::try_parse_from([
        "crosslink",
        "-q",
        "--config",
        config_file.to_str().unwrap(),
        "plan",
        &v0,
        &v1,
    ])
    .unwrap();
    assert!(crosslink::run_app(cli).is_err());

    let config_file = write(&roots[0], "conf/config.toml", b"io_threads = 1\n");
    let cli = Cli::try_parse_from([
        "crosslink",
        "-q",
        "--config",
        config_file.to_str().unwrap(),
        "plan",
        &v0,
        &v1,
    ])
    .unwrap();
    assert_eq!(crosslink::run_app(cli).unwrap(), ExitCode::NothingToDo);

    write(&roots[0], "movies/x.mkv", b"data");
    write(&roots[1], "torrents/x.mkv", b"data");
    let report_path = roots[0].join("report.csv");
    let cli = Cli::try_parse_from([
        "crosslink",
        "-q",
        "--config",
        config_file.to_str().unwrap(),
        "plan",
        &v0,
        &v1,
        "--report",
        "csv",
        "--report-file",
        report_path.to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(crosslink::run_app(cli).unwrap(), ExitCode::Success);

    let csv = fs::read_to_string(&report_path).unwrap();
    assert!(csv.contains("applied"));
    assert!(roots[0].join("movies/x.mkv").exists());
}
