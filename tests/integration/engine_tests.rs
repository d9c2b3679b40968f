use crosslink::config::Config;
use crosslink::engine::{Engine, RunReport};
use crosslink::error::ExitCode;
use crosslink::events::{RecordingSink, RunEvent};
use crosslink::relink::{ActionOutcome, RunMode};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

struct Volumes {
    _dirs: Vec<TempDir>,
    roots: Vec<PathBuf>,
}

impl Volumes {
    fn new(count: usize) -> Self {
        let dirs: Vec<TempDir> = (0..count).map(|_| TempDir::new().unwrap()).collect();
        let roots = dirs
            .iter()
            .map(|d| fs::canonicalize(d.path()).unwrap())
            .collect();
        Self { _dirs: dirs, roots }
    }

    fn write(&self, volume: usize, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.roots[volume].join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn path(&self, volume: usize, rel: &str) -> PathBuf {
        self.roots[volume].join(rel)
    }

    fn config(&self) -> Config {
        Config {
            volumes: self.roots.clone(),
            io_threads: 2,
            ..Default::default()
        }
    }

    /// Every file and directory under every root, with file contents.
    fn snapshot(&self) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        let mut out = BTreeMap::new();
        for root in &self.roots {
            collect(root, &mut out);
        }
        out
    }
}

fn collect(dir: &Path, out: &mut BTreeMap<PathBuf, Option<Vec<u8>>>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.insert(path.clone(), None);
            collect(&path, out);
        } else {
            out.insert(path.clone(), Some(fs::read(&path).unwrap()));
        }
    }
}

fn run(config: Config, mode: RunMode) -> (RunReport, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let report = Engine::new(config, mode)
        .with_event_sink(sink.clone())
        .run()
        .unwrap();
    (report, sink)
}

#[cfg(unix)]
fn inode(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).unwrap().ino()
}

#[test]
fn test_concrete_scenario_plan() {
    let vols = Volumes::new(2);
    let source = vols.write(0, "movies/x.mkv", b"movie data");
    let canonical = vols.write(1, "torrents/x.mkv", b"movie data");

    let (report, sink) = run(vols.config(), RunMode::Simulate);

    assert_eq!(report.discovery.duplicate_groups, 1);
    assert_eq!(report.execution.results.len(), 1);
    let result = &report.execution.results[0];
    assert_eq!(result.action.source, source);
    assert_eq!(result.action.canonical, canonical);
    assert_eq!(result.action.destination_dir, vols.path(1, "movies"));
    assert_eq!(result.action.destination, vols.path(1, "movies/x.mkv"));
    assert_eq!(result.outcome, ActionOutcome::Applied { simulated: true });
    assert_eq!(report.exit_code(), ExitCode::Success);

    assert_eq!(sink.count("group_discovered"), 1);
    assert_eq!(sink.count("canonical_selected"), 1);
    assert_eq!(sink.count("action_planned"), 1);
    assert_eq!(sink.count("action_applied"), 1);

    assert!(source.exists());
    assert!(!vols.path(1, "movies").exists());
}

#[cfg(unix)]
#[test]
fn test_concrete_scenario_apply() {
    let vols = Volumes::new(2);
    let source = vols.write(0, "movies/x.mkv", b"movie data");
    let canonical = vols.write(1, "torrents/x.mkv", b"movie data");

    let (report, _) = run(vols.config(), RunMode::Execute);

    assert_eq!(report.execution.applied, 1);
    assert_eq!(report.execution.bytes_relinked, 10);
    assert_eq!(report.exit_code(), ExitCode::Success);

    let destination = vols.path(1, "movies/x.mkv");
    assert!(!source.exists());
    assert_eq!(inode(&destination), inode(&canonical));
    assert_eq!(fs::read(&destination).unwrap(), b"movie data");
}

#[cfg(unix)]
#[test]
fn test_relinked_file_follows_canonical_changes() {
    let vols = Volumes::new(2);
    vols.write(0, "movies/x.mkv", b"original");
    let canonical = vols.write(1, "torrents/x.mkv", b"original");

    run(vols.config(), RunMode::Execute);

    fs::write(&canonical, b"updated content").unwrap();
    assert_eq!(
        fs::read(vols.path(1, "movies/x.mkv")).unwrap(),
        b"updated content"
    );
}

#[test]
fn test_different_content_yields_no_actions() {
    let vols = Volumes::new(2);
    vols.write(0, "movies/x.mkv", b"first cut");
    vols.write(1, "torrents/x.mkv", b"director's cut");

    let (report, sink) = run(vols.config(), RunMode::Simulate);

    assert_eq!(report.discovery.names.candidate_groups, 1);
    assert_eq!(report.discovery.content.hashed_files, 2);
    assert_eq!(report.discovery.content.single_volume_groups, 2);
    assert_eq!(report.discovery.duplicate_groups, 0);
    assert!(report.execution.results.is_empty());
    assert_eq!(sink.count("group_discovered"), 0);
    assert_eq!(report.exit_code(), ExitCode::NothingToDo);
}

#[test]
fn test_single_volume_names_never_hashed() {
    let vols = Volumes::new(2);
    vols.write(0, "a/x.mkv", b"same");
    vols.write(0, "b/x.mkv", b"same");
    vols.write(1, "torrents/y.mkv", b"same");

    let (report, _) = run(vols.config(), RunMode::Simulate);

    assert_eq!(report.discovery.names.candidate_files, 0);
    assert_eq!(report.discovery.content.input_files, 0);
    assert!(report.execution.results.is_empty());
}

#[test]
fn test_no_canonical_group_is_reported_not_acted_on() {
    let vols = Volumes::new(2);
    vols.write(0, "movies/x.mkv", b"data");
    vols.write(1, "tv/x.mkv", b"data");

    let (report, sink) = run(vols.config(), RunMode::Execute);

    assert_eq!(report.discovery.duplicate_groups, 1);
    assert_eq!(report.plan.groups_without_canonical, 1);
    assert!(report.execution.results.is_empty());
    assert_eq!(sink.count("no_canonical"), 1);
    assert_eq!(report.exit_code(), ExitCode::NothingToDo);

    match sink
        .events()
        .into_iter()
        .find(|e| e.kind() == "no_canonical")
        .unwrap()
    {
        RunEvent::NoCanonical { members, .. } => assert_eq!(members.len(), 2),
        other => panic!("unexpected event {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn test_existing_link_is_skipped() {
    let vols = Volumes::new(2);
    let source = vols.write(0, "movies/x.mkv", b"data");
    let canonical = vols.write(1, "torrents/x.mkv", b"data");
    let destination = vols.path(1, "movies/x.mkv");
    fs::create_dir_all(destination.parent().unwrap()).unwrap();
    fs::hard_link(&canonical, &destination).unwrap();

    let (report, _) = run(vols.config(), RunMode::Execute);

    assert_eq!(report.execution.results.len(), 1);
    assert!(matches!(
        report.execution.results[0].outcome,
        ActionOutcome::Skipped { .. }
    ));
    assert_eq!(report.execution.failed, 0);
    assert!(source.exists());
    assert_eq!(report.exit_code(), ExitCode::NothingToDo);
}

#[test]
fn test_unrelated_destination_is_a_conflict() {
    let vols = Volumes::new(2);
    let source = vols.write(0, "movies/x.mkv", b"data");
    vols.write(1, "torrents/x.mkv", b"data");
    let destination = vols.write(1, "movies/x.mkv", b"something else entirely");

    let (report, sink) = run(vols.config(), RunMode::Execute);

    assert_eq!(report.execution.failed, 1);
    match &report.execution.results[0].outcome {
        ActionOutcome::Failed {
            reason,
            source_removed,
        } => {
            assert!(reason.contains("conflict"));
            assert!(!source_removed);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(fs::read(&source).unwrap(), b"data");
    assert_eq!(fs::read(&destination).unwrap(), b"something else entirely");
    assert_eq!(sink.count("action_failed"), 1);
    assert_eq!(report.exit_code(), ExitCode::PartialSuccess);
}

#[test]
fn test_simulation_predicts_conflicts() {
    let vols = Volumes::new(2);
    vols.write(0, "movies/x.mkv", b"data");
    vols.write(1, "torrents/x.mkv", b"data");
    vols.write(1, "movies/x.mkv", b"unrelated");

    let (report, _) = run(vols.config(), RunMode::Simulate);

    assert_eq!(report.execution.failed, 1);
    assert_eq!(report.execution.applied, 0);
}

#[cfg(unix)]
#[test]
fn test_simulation_matches_execution_for_shared_destination() {
    let vols = Volumes::new(3);
    vols.write(0, "torrents/x.mkv", b"data");
    vols.write(1, "movies/x.mkv", b"data");
    vols.write(2, "movies/x.mkv", b"data");

    let statuses = |report: &RunReport| -> Vec<&'static str> {
        report
            .execution
            .results
            .iter()
            .map(|r| r.outcome.status())
            .collect()
    };

    let (simulated, sink) = run(vols.config(), RunMode::Simulate);
    let (executed, _) = run(vols.config(), RunMode::Execute);

    assert_eq!(statuses(&simulated), vec!["applied", "skipped"]);
    assert_eq!(statuses(&simulated), statuses(&executed));
    assert_eq!(simulated.execution.applied, executed.execution.applied);
    assert_eq!(sink.count("step_simulated"), 3);

    let destination = vols.path(0, "movies/x.mkv");
    assert_eq!(inode(&destination), inode(&vols.path(0, "torrents/x.mkv")));
}

#[test]
fn test_interrupted_discovery_reports_without_acting() {
    let vols = Volumes::new(2);
    vols.write(0, "movies/x.mkv", b"data");
    vols.write(1, "torrents/x.mkv", b"data");

    let flag = Arc::new(AtomicBool::new(true));
    let sink = Arc::new(RecordingSink::new());
    let before = vols.snapshot();
    let report = Engine::new(vols.config(), RunMode::Execute)
        .with_event_sink(sink.clone())
        .with_shutdown_flag(flag)
        .run()
        .unwrap();

    assert!(report.discovery.interrupted);
    assert!(report.execution.results.is_empty());
    assert_eq!(report.plan.actions, 0);
    assert_eq!(report.exit_code(), ExitCode::Interrupted);
    assert_eq!(sink.count("action_planned"), 0);
    assert_eq!(before, vols.snapshot());
}

#[test]
fn test_simulation_never_mutates() {
    let vols = Volumes::new(3);
    vols.write(0, "movies/x.mkv", b"data");
    vols.write(1, "torrents/x.mkv", b"data");
    vols.write(2, "deep/nested/tree/x.mkv", b"data");
    vols.write(2, "shows/y.mkv", b"other");
    vols.write(0, "shows/y.mkv", b"other");
    vols.write(1, "torrents/shows/y.mkv", b"other");

    let before = vols.snapshot();
    let (report, _) = run(vols.config(), RunMode::Simulate);
    let after = vols.snapshot();

    assert!(report.execution.applied >= 2);
    assert_eq!(before, after);
}

#[cfg(unix)]
#[test]
fn test_second_run_is_idempotent() {
    let vols = Volumes::new(3);
    vols.write(0, "movies/x.mkv", b"data");
    vols.write(1, "torrents/x.mkv", b"data");
    vols.write(2, "archive/movies/x.mkv", b"data");

    let (first, _) = run(vols.config(), RunMode::Execute);
    assert_eq!(first.execution.applied, 2);
    assert_eq!(first.execution.failed, 0);
    let after_first = vols.snapshot();

    let (second, _) = run(vols.config(), RunMode::Execute);
    let after_second = vols.snapshot();

    assert_eq!(second.execution.applied, 0);
    assert_eq!(second.execution.failed, 0);
    assert_eq!(after_first, after_second);
}

#[cfg(unix)]
#[test]
fn test_second_priority_copy_is_protected() {
    let vols = Volumes::new(3);
    let first = vols.write(0, "torrents/x.mkv", b"data");
    let second = vols.write(1, "Torrent/x.mkv", b"data");
    let duplicate = vols.write(2, "movies/x.mkv", b"data");

    let (report, sink) = run(vols.config(), RunMode::Execute);

    let canonical = if first < second { &first } else { &second };
    let protected = if first < second { &second } else { &first };

    assert_eq!(report.plan.protected, 1);
    assert_eq!(sink.count("member_protected"), 1);
    assert_eq!(report.execution.applied, 1);
    assert_eq!(&report.execution.results[0].action.canonical, canonical);
    assert!(protected.exists());
    assert!(!duplicate.exists());
}

#[test]
fn test_same_volume_duplicates_are_left_alone() {
    let vols = Volumes::new(2);
    let same_volume = vols.write(1, "movies/x.mkv", b"data");
    vols.write(1, "torrents/x.mkv", b"data");
    vols.write(0, "movies/x.mkv", b"data");

    let (report, _) = run(vols.config(), RunMode::Simulate);

    assert_eq!(report.plan.same_volume, 1);
    assert_eq!(report.execution.results.len(), 1);
    assert_ne!(report.execution.results[0].action.source, same_volume);
}

#[test]
fn test_canonical_is_never_a_source() {
    let vols = Volumes::new(3);
    vols.write(0, "torrents/a.bin", b"aaaa");
    vols.write(1, "a.bin", b"aaaa");
    vols.write(2, "x/a.bin", b"aaaa");
    vols.write(1, "torrents/b.bin", b"bbbb");
    vols.write(2, "b.bin", b"bbbb");

    let (report, _) = run(vols.config(), RunMode::Simulate);

    assert_eq!(report.execution.results.len(), 3);
    for result in &report.execution.results {
        assert_ne!(result.action.source, result.action.canonical);
        assert!(!result.action.source.to_string_lossy().contains("torrents"));
    }
}

#[test]
fn test_nfc_and_nfd_names_group_together() {
    let vols = Volumes::new(2);
    vols.write(0, "movies/Am\u{e9}lie.mkv", b"data");
    vols.write(1, "torrents/Ame\u{301}lie.mkv", b"data");

    let (report, _) = run(vols.config(), RunMode::Simulate);

    assert_eq!(report.discovery.duplicate_groups, 1);
    assert_eq!(report.execution.results.len(), 1);
}

#[test]
fn test_custom_priority_segment() {
    let vols = Volumes::new(2);
    vols.write(0, "torrents/x.mkv", b"data");
    let seed = vols.write(1, "Seeding/x.mkv", b"data");

    let config = Config {
        priority_segment: "^seeding$".to_string(),
        ..vols.config()
    };
    let (report, _) = run(config, RunMode::Simulate);

    assert_eq!(report.execution.results.len(), 1);
    assert_eq!(report.execution.results[0].action.canonical, seed);
}

#[test]
fn test_report_serializes_with_timestamp() {
    let vols = Volumes::new(2);
    vols.write(0, "movies/x.mkv", b"data");
    vols.write(1, "torrents/x.mkv", b"data");

    let (report, _) = run(vols.config(), RunMode::Simulate);
    let mut buf = Vec::new();
    crosslink::output::write_report(&report, crosslink::output::ReportFormat::Json, &mut buf)
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();

    assert!(value["generated_at"].is_string());
    assert_eq!(value["actions"].as_array().unwrap().len(), 1);
    assert_eq!(value["summary"]["applied"], 1);
}
