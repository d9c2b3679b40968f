use crosslink::config::Config;
use crosslink::engine::Engine;
use crosslink::relink::RunMode;
use crosslink::scanner::ExclusionRule;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn volumes(count: usize) -> (Vec<TempDir>, Vec<PathBuf>) {
    let dirs: Vec<TempDir> = (0..count).map(|_| TempDir::new().unwrap()).collect();
    let roots = dirs
        .iter()
        .map(|d| fs::canonicalize(d.path()).unwrap())
        .collect();
    (dirs, roots)
}

fn write(root: &std::path::Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_volume_token_excludes_on_every_volume() {
    let (_dirs, roots) = volumes(2);
    write(&roots[0], "appdata/x.db", b"db");
    write(&roots[1], "torrents/x.db", b"db");
    write(&roots[0], "movies/y.mkv", b"movie");
    write(&roots[1], "torrents/y.mkv", b"movie");

    let config = Config {
        volumes: roots.clone(),
        exclusions: vec![ExclusionRule::new("{volume}/appdata")],
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run().unwrap();

    assert_eq!(report.discovery.excluded_dirs, 1);
    assert_eq!(report.execution.results.len(), 1);
    assert!(report.execution.results[0]
        .action
        .source
        .ends_with("movies/y.mkv"));
}

#[test]
fn test_absolute_exclusion_applies_to_its_volume_only() {
    let (_dirs, roots) = volumes(3);
    write(&roots[0], "private/x.bin", b"data");
    write(&roots[1], "torrents/x.bin", b"data");
    write(&roots[2], "private/x.bin", b"data");

    let config = Config {
        volumes: roots.clone(),
        exclusions: vec![ExclusionRule::new(
            roots[0].join("private").to_string_lossy().to_string(),
        )],
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run().unwrap();

    assert_eq!(report.execution.results.len(), 1);
    assert_eq!(
        report.execution.results[0].action.source,
        roots[2].join("private/x.bin")
    );
}

#[test]
fn test_missing_exclusion_directory_is_dropped() {
    let (_dirs, roots) = volumes(2);
    write(&roots[0], "movies/x.mkv", b"data");
    write(&roots[1], "torrents/x.mkv", b"data");

    let config = Config {
        volumes: roots.clone(),
        exclusions: vec![ExclusionRule::new("{volume}/does-not-exist")],
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run().unwrap();

    assert_eq!(report.discovery.excluded_dirs, 0);
    assert_eq!(report.execution.results.len(), 1);
}

#[test]
fn test_nested_volume_files_counted_once() {
    let outer = TempDir::new().unwrap();
    let outer_root = fs::canonicalize(outer.path()).unwrap();
    let inner_root = outer_root.join("inner");
    fs::create_dir_all(&inner_root).unwrap();
    write(&outer_root, "movies/x.mkv", b"data");
    write(&inner_root, "torrents/x.mkv", b"data");

    let config = Config {
        volumes: vec![outer_root.clone(), inner_root.clone()],
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run().unwrap();

    assert_eq!(report.discovery.total_files, 2);
    assert_eq!(report.execution.results.len(), 1);
    assert_eq!(
        report.execution.results[0].action.destination,
        inner_root.join("movies/x.mkv")
    );
}

#[test]
fn test_outer_volume_exclusion_does_not_reach_nested_volume() {
    let outer = TempDir::new().unwrap();
    let outer_root = fs::canonicalize(outer.path()).unwrap();
    let inner_root = outer_root.join("disk1");
    let (_dirs, roots) = volumes(1);
    write(&inner_root, "appdata/x.mkv", b"data");
    write(&roots[0], "torrents/x.mkv", b"data");

    let config = Config {
        volumes: vec![outer_root, inner_root.clone(), roots[0].clone()],
        exclusions: vec![ExclusionRule::new("{volume}/disk1/appdata")],
        ..Default::default()
    };
    let report = Engine::new(config, RunMode::Simulate).run().unwrap();

    assert_eq!(report.discovery.excluded_dirs, 0);
    assert_eq!(report.discovery.total_files, 2);
    assert_eq!(report.execution.results.len(), 1);
    assert_eq!(
        report.execution.results[0].action.source,
        inner_root.join("appdata/x.mkv")
    );
}
